use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Categories of gateway errors for consistent error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Connection timeout or request timeout
    Timeout,
    /// Backend unreachable, connection reset, TLS failure, ...
    Transport,
    /// Request or response body could not be (de)serialized
    Parse,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayErrorKind::HttpStatus => write!(f, "http_status"),
            GatewayErrorKind::Timeout => write!(f, "timeout"),
            GatewayErrorKind::Transport => write!(f, "transport"),
            GatewayErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured error for a call that went through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    /// HTTP status, when the backend answered
    pub status: Option<u16>,
    /// One-line generic summary suitable for display
    pub message: String,
    /// Raw response body, if any
    pub body: Option<String>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(status: u16, body: &str) -> Self {
        Self {
            kind: GatewayErrorKind::HttpStatus,
            status: Some(status),
            message: format!("HTTP {status}"),
            body: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    /// Classifies a reqwest failure that produced no response.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(GatewayErrorKind::Timeout, format!("request timed out: {err}"))
        } else {
            Self::new(GatewayErrorKind::Transport, format!("request failed: {err}"))
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Parse, message)
    }

    /// True when the backend rejected the credential.
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    /// The structured `message` field of a JSON error body, if any.
    pub fn server_message(&self) -> Option<String> {
        let body = self.body.as_deref()?;
        let json: Value = serde_json::from_str(body).ok()?;
        json.get("message")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|msg| !msg.is_empty())
            .map(str::to_string)
    }

    /// Best-effort human-readable message: server message, then the generic
    /// message, then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message()
            .or_else(|| {
                let generic = self.message.trim();
                (!generic.is_empty()).then(|| generic.to_string())
            })
            .unwrap_or_else(|| fallback.to_string())
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GatewayError {}
