//! CLI command handlers.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use kheyma_session::config::Config;
use kheyma_session::events::{SessionEvent, SessionEventRx, create_event_channel, drain_events};
use kheyma_session::gateway::RequestGateway;
use kheyma_session::session::SessionStore;
use kheyma_session::storage::{FileStorage, SessionStorage};

pub mod auth;
pub mod config;
pub mod profile;

/// The process-wide session: one store plus the invalidation subscription.
pub struct HostSession {
    pub store: SessionStore,
    events: SessionEventRx,
    expired: Option<String>,
}

impl HostSession {
    /// Wires storage, gateway and store without touching the network.
    pub fn connect(config: &Config) -> Result<Self> {
        let storage: Arc<dyn SessionStorage> = Arc::new(FileStorage::new());
        let (tx, events) = create_event_channel();
        let gateway = RequestGateway::from_config(config, storage)
            .context("configure API client")?
            .with_events(tx);

        Ok(Self {
            store: SessionStore::new(gateway),
            events,
            expired: None,
        })
    }

    /// Connects and restores the stored session.
    pub async fn open(config: &Config) -> Result<Self> {
        let mut session = Self::connect(config)?;
        session.store.initialize().await;
        tracing::debug!(state = %session.store.state(), "session restored");

        // initialize already ended anonymous for these
        for event in drain_events(&mut session.events) {
            let SessionEvent::Invalidated { redirect_to, .. } = event;
            session.expired = Some(redirect_to);
        }

        Ok(session)
    }

    /// Routes pending invalidation events and tells the user when the
    /// session is gone.
    pub fn finish(mut self) {
        for event in drain_events(&mut self.events) {
            let SessionEvent::Invalidated { redirect_to, .. } = event;
            self.store.invalidate();
            self.expired = Some(redirect_to);
        }

        if let Some(redirect_to) = self.expired
            && !self.store.is_authenticated()
        {
            eprintln!("Session expired. Please log in again ({redirect_to}).");
        }
    }
}

/// Returns `value`, or reads one line from stdin after printing `prompt`.
pub fn value_or_prompt(value: Option<String>, prompt: &str) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }

    eprint!("{prompt}: ");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin()
        .lock()
        .read_line(&mut input)
        .context("read from stdin")?;

    let input = input.trim_end_matches(['\r', '\n']).to_string();
    if input.is_empty() {
        anyhow::bail!("{prompt} is required");
    }
    Ok(input)
}
