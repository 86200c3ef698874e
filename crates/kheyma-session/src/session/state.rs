use std::fmt;

use crate::gateway::GatewayError;
use crate::identity::Identity;

/// Lifecycle state of a [`super::SessionStore`].
///
/// `Uninitialized -> Initializing -> {Authenticated, Anonymous}`, with a
/// loop-back to `Anonymous` from any state on logout or invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Authenticated,
    Anonymous,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Authenticated => "authenticated",
            SessionState::Anonymous => "anonymous",
        };
        f.write_str(label)
    }
}

/// In-memory session tuple.
///
/// The credential alone defines "authenticated"; the identity may lag
/// behind it (e.g. while initializing).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub credential: Option<String>,
    pub loading: bool,
}

impl SessionSnapshot {
    /// Snapshot at process start: nothing known yet, still loading.
    pub fn empty() -> Self {
        Self {
            identity: None,
            credential: None,
            loading: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Failure result of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    /// Best-effort human-readable message
    pub message: String,
    /// HTTP status, when the backend answered
    pub status: Option<u16>,
}

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Server message, then the generic message, then `fallback`.
    pub fn from_gateway(err: &GatewayError, fallback: &str) -> Self {
        Self {
            message: err.user_message(fallback),
            status: err.status,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SessionError {}
