//! Session events emitted to the hosting application.
//!
//! The gateway never navigates on its own. When the backend rejects the
//! stored credential it emits [`SessionEvent::Invalidated`] and the host's
//! routing layer decides what "go to the login page" means.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Default capacity for the session event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A response rejected the credential; durable storage has been cleared.
    Invalidated {
        /// HTTP status that triggered the invalidation.
        status: u16,
        /// Path of the call that was rejected.
        target: String,
        /// Authentication entry point the host should route to.
        redirect_to: String,
    },
}

/// Sender half for session events.
pub type SessionEventTx = mpsc::Sender<SessionEvent>;

/// Receiver half for session events.
pub type SessionEventRx = mpsc::Receiver<SessionEvent>;

/// Creates a bounded session event channel.
pub fn create_event_channel() -> (SessionEventTx, SessionEventRx) {
    mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY)
}

/// Drains every event currently queued without waiting.
pub fn drain_events(rx: &mut SessionEventRx) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
