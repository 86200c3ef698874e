//! Configuration management for Kheyma.
//!
//! Loads configuration from ${`KHEYMA_HOME`}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default config template with comments, embedded at compile time.
const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("default_config.toml");

/// Environment variable that overrides the backend base URL.
pub const BASE_URL_ENV: &str = "KHEYMA_API_BASE_URL";

pub mod paths {
    //! Path resolution for Kheyma configuration and session data.
    //!
    //! `KHEYMA_HOME` resolution order:
    //! 1. `KHEYMA_HOME` environment variable (if set)
    //! 2. ~/.config/kheyma (default)

    use std::path::PathBuf;

    /// Returns the Kheyma home directory.
    ///
    /// Checks `KHEYMA_HOME` env var first, falls back to ~/.config/kheyma.
    /// Uses the current directory when no home directory can be determined.
    pub fn kheyma_home() -> PathBuf {
        if let Ok(home) = std::env::var("KHEYMA_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".kheyma"),
            |h| h.join(".config").join("kheyma"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        kheyma_home().join("config.toml")
    }

    /// Returns the path to the persisted session file.
    pub fn session_path() -> PathBuf {
        kheyma_home().join("session.json")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Optional backend base URL (for test rigs or proxies)
    pub api_base_url: Option<String>,

    /// Per-request timeout in seconds (0 disables)
    pub request_timeout_secs: u32,

    /// Route announced when the stored credential is rejected
    pub login_route: String,
}

impl Config {
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8081";
    const DEFAULT_REQUEST_TIMEOUT_SECS: u32 = 30;
    const DEFAULT_LOGIN_ROUTE: &str = "/login";

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Returns the request timeout, or `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.request_timeout_secs)))
        }
    }

    /// Resolves the backend base URL with precedence: env > config > default.
    ///
    /// # Errors
    /// Returns an error if the selected URL is not well-formed.
    pub fn effective_base_url(&self) -> Result<String> {
        let env_url = std::env::var(BASE_URL_ENV).ok();
        resolve_base_url(env_url.as_deref(), self.api_base_url.as_deref())
    }

    /// Saves only the `api_base_url` field to the config file.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the file cannot be written.
    pub fn save_base_url(url: &str) -> Result<()> {
        Self::save_base_url_to(&paths::config_path(), url)
    }

    /// Saves only the `api_base_url` field to a specific config file path.
    ///
    /// Creates the file with default template if it doesn't exist.
    /// Preserves existing fields and comments using `toml_edit`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the file cannot be written.
    pub fn save_base_url_to(path: &Path, url: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let trimmed = url.trim();
        validate_url(trimmed)?;

        let contents = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?
        } else {
            DEFAULT_CONFIG_TEMPLATE.to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["api_base_url"] = value(trimmed);

        Self::write_config(path, &doc.to_string())
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, DEFAULT_CONFIG_TEMPLATE)
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename).
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            login_route: Self::DEFAULT_LOGIN_ROUTE.to_string(),
        }
    }
}

/// Picks the first non-empty candidate (env, then config), else the default.
fn resolve_base_url(env_url: Option<&str>, config_url: Option<&str>) -> Result<String> {
    for candidate in [env_url, config_url].into_iter().flatten() {
        let trimmed = candidate.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    Ok(Config::DEFAULT_BASE_URL.to_string())
}

fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid Kheyma API base URL: {url}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.api_base_url, None);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.login_route, "/login");
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_other_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "request_timeout_secs = 5\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.login_route, "/login");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "request_timeout_secs = \"soon\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_base_url_precedence() {
        assert_eq!(
            resolve_base_url(Some("http://env:1"), Some("http://cfg:2")).unwrap(),
            "http://env:1"
        );
        assert_eq!(
            resolve_base_url(Some("   "), Some("http://cfg:2/")).unwrap(),
            "http://cfg:2"
        );
        assert_eq!(
            resolve_base_url(None, Some("")).unwrap(),
            Config::DEFAULT_BASE_URL
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = resolve_base_url(None, Some("not a url")).unwrap_err();
        assert!(err.to_string().contains("Invalid Kheyma API base URL"));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Config::init(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("# api_base_url"));

        let err = Config::init(&path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_save_base_url_preserves_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::save_base_url_to(&path, "http://api.example.com").unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("# Kheyma client configuration"));
        assert!(contents.contains("api_base_url = \"http://api.example.com\""));

        Config::save_base_url_to(&path, "http://other.example.com").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("http://other.example.com")
        );
    }

    #[test]
    fn test_save_base_url_rejects_invalid_url() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert!(Config::save_base_url_to(&path, "::nope").is_err());
        assert!(!path.exists());
    }
}
