//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use kheyma_session::api::{PackageType, ProfileUpdate};
use kheyma_session::config::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "kheyma")]
#[command(version)]
#[command(about = "Kheyma campsite API client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,

        /// Password (prompted on stdin when omitted)
        #[arg(long, env = "KHEYMA_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account and log in
    Register {
        #[arg(long)]
        email: String,

        /// Password (prompted on stdin when omitted)
        #[arg(long, env = "KHEYMA_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Display name, kept on this machine only
        #[arg(long)]
        name: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show who is logged in
    Whoami,

    /// Show or update the profile of the logged-in user
    Profile {
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        dob: Option<String>,

        #[arg(long)]
        address: Option<String>,

        /// Package (BASIC, ADVANCED, FULL)
        #[arg(long, value_name = "PACKAGE")]
        package: Option<PackageType>,
    },

    /// Request a password reset email
    ForgotPassword {
        #[arg(long)]
        email: String,
    },

    /// Set a new password using a reset token
    ResetPassword {
        #[arg(long)]
        token: String,

        /// New password (prompted on stdin when omitted)
        #[arg(long, env = "KHEYMA_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Save the backend base URL to the config file
    SetBaseUrl {
        #[arg(value_name = "URL")]
        url: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_tracing();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

/// Logs to stderr through a non-blocking writer; `RUST_LOG` overrides the
/// default `warn` level. The guard flushes pending lines on drop.
fn init_tracing() -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .try_init()
    {
        // keep running with whatever subscriber is already installed
        eprintln!("Warning: logging not initialized: {err}");
    }

    guard
}

fn load_config() -> Result<Config> {
    Config::load().context("load config")
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Login { email, password } => {
            commands::auth::login(&load_config()?, &email, password).await
        }
        Commands::Register {
            email,
            password,
            name,
        } => commands::auth::register(&load_config()?, &email, password, name.as_deref()).await,
        Commands::Logout => commands::auth::logout(&load_config()?),
        Commands::Whoami => commands::auth::whoami(&load_config()?).await,
        Commands::Profile {
            dob,
            address,
            package,
        } => {
            let update = ProfileUpdate {
                dob,
                address,
                package_type: package,
            };
            commands::profile::run(&load_config()?, &update).await
        }
        Commands::ForgotPassword { email } => {
            commands::auth::forgot_password(&load_config()?, &email).await
        }
        Commands::ResetPassword { token, password } => {
            commands::auth::reset_password(&load_config()?, &token, password).await
        }

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::SetBaseUrl { url } => commands::config::set_base_url(&url),
        },
    }
}
