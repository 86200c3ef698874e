//! Durable storage for the session record.
//!
//! The record is two independent string entries: `token` (raw credential) and
//! `user` (JSON-serialized identity). `FileStorage` keeps them in
//! `$KHEYMA_HOME/session.json` with restricted permissions (0600), replaced
//! atomically on every write.
//! Tokens are never logged or displayed in full.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};

use crate::config::paths;

/// Storage key for the bearer credential.
pub const TOKEN_KEY: &str = "token";

/// Storage key for the serialized identity.
pub const USER_KEY: &str = "user";

/// Both persisted entries, as read back from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredRecord {
    pub token: Option<String>,
    pub user: Option<String>,
}

/// String-keyed durable store shared by the session store and the gateway.
pub trait SessionStorage: Send + Sync {
    /// Reads an entry.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes an entry, replacing any previous value.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes an entry. Removing a missing entry is not an error.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<()>;

    /// Reads both session entries.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn load_record(&self) -> Result<StoredRecord> {
        Ok(StoredRecord {
            token: self.get(TOKEN_KEY)?,
            user: self.get(USER_KEY)?,
        })
    }

    /// Writes both session entries.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn save_record(&self, token: &str, user_json: &str) -> Result<()> {
        self.set(TOKEN_KEY, token)?;
        self.set(USER_KEY, user_json)
    }

    /// Removes both session entries.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn clear_session(&self) -> Result<()> {
        self.remove(TOKEN_KEY)?;
        self.remove(USER_KEY)
    }
}

/// In-process storage, used by tests and embedders without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage pre-populated with a session record.
    pub fn with_record(token: &str, user_json: &str) -> Self {
        let storage = Self::new();
        if let Ok(mut entries) = storage.entries.lock() {
            entries.insert(TOKEN_KEY.to_string(), token.to_string());
            entries.insert(USER_KEY.to_string(), user_json.to_string());
        }
        storage
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("Session storage lock poisoned"))
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// File-backed storage: a flat JSON object of key -> string.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Storage at the default session path.
    pub fn new() -> Self {
        Self::at(paths::session_path())
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw file contents; `None` when the file is missing or blank.
    fn read(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session from {}", self.path.display()))?;
        Ok((!contents.trim().is_empty()).then_some(contents))
    }

    fn parse(&self, contents: &str) -> Result<BTreeMap<String, String>> {
        serde_json::from_str(contents)
            .with_context(|| format!("Failed to parse session from {}", self.path.display()))
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match self.read()? {
            Some(contents) => self.parse(&contents),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Loads the entries for a read-modify-write. An unparseable file is
    /// treated as empty and flagged so the next save replaces it.
    fn load_for_write(&self) -> Result<(BTreeMap<String, String>, bool)> {
        let Some(contents) = self.read()? else {
            return Ok((BTreeMap::new(), false));
        };

        match self.parse(&contents) {
            Ok(entries) => Ok((entries, false)),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "session file is corrupt, replacing it");
                Ok((BTreeMap::new(), true))
            }
        }
    }

    /// Saves the entries with restricted permissions (0600).
    /// Uses atomic write (temp file + rename).
    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(entries).context("Failed to serialize session")?;

        let tmp_path = self.path.with_extension("json.tmp");
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&tmp_path)
            .with_context(|| format!("Failed to open {} for writing", tmp_path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to flush {}", tmp_path.display()))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let (mut entries, _) = self.load_for_write()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let (mut entries, corrupt) = self.load_for_write()?;
        if entries.remove(key).is_none() && !corrupt {
            return Ok(());
        }
        self.save(&entries)
    }
}

/// Returns a masked version of a token for display (first 8 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 12 {
        return "***".to_string();
    }
    match token.get(..8) {
        Some(prefix) => format!("{prefix}..."),
        None => "***".to_string(),
    }
}
