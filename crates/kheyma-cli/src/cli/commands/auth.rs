//! Auth command handlers.

use anyhow::Result;
use kheyma_session::config::Config;
use serde_json::Value;

use super::{HostSession, value_or_prompt};

pub async fn login(config: &Config, email: &str, password: Option<String>) -> Result<()> {
    let password = value_or_prompt(password, "Password")?;
    let mut session = HostSession::open(config).await?;

    let result = session.store.login(email, &password).await;
    if result.is_ok()
        && let Some(identity) = session.store.identity()
    {
        println!("Logged in as {} ({})", identity.display_name(), identity.role);
    }

    session.finish();
    result?;
    Ok(())
}

pub async fn register(
    config: &Config,
    email: &str,
    password: Option<String>,
    name: Option<&str>,
) -> Result<()> {
    let password = value_or_prompt(password, "Password")?;
    let mut session = HostSession::open(config).await?;

    let result = session.store.register(email, &password, name).await;
    if result.is_ok()
        && let Some(identity) = session.store.identity()
    {
        println!("Registered and logged in as {}", identity.display_name());
    }

    session.finish();
    result?;
    Ok(())
}

pub fn logout(config: &Config) -> Result<()> {
    let mut session = HostSession::connect(config)?;
    session.store.logout();
    println!("Logged out.");
    Ok(())
}

pub async fn whoami(config: &Config) -> Result<()> {
    let session = HostSession::open(config).await?;

    match session.store.identity() {
        Some(identity) if session.store.is_authenticated() => {
            println!("{}", identity.email);
            println!("Role: {}", identity.role);
            if let Some(name) = &identity.name {
                println!("Name: {name}");
            }
        }
        _ => println!("Not logged in"),
    }

    session.finish();
    Ok(())
}

pub async fn forgot_password(config: &Config, email: &str) -> Result<()> {
    let session = HostSession::connect(config)?;

    let result = session.store.api().forgot_password(email).await;
    if let Ok(body) = &result {
        println!(
            "{}",
            reply_message(body, "If the account exists, a reset link has been sent.")
        );
    }

    session.finish();
    result?;
    Ok(())
}

pub async fn reset_password(config: &Config, token: &str, password: Option<String>) -> Result<()> {
    let password = value_or_prompt(password, "New password")?;
    let session = HostSession::connect(config)?;

    let result = session.store.api().reset_password(token, &password).await;
    if let Ok(body) = &result {
        println!("{}", reply_message(body, "Password has been reset."));
    }

    session.finish();
    result?;
    Ok(())
}

/// A plain-text or `{message}` reply from the backend, else `fallback`.
fn reply_message(body: &Value, fallback: &str) -> String {
    let message = match body {
        Value::String(text) => Some(text.as_str()),
        Value::Object(map) => map.get("message").and_then(Value::as_str),
        _ => None,
    };

    message
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
