// ================================================================
// File: chatbridge-common/src/error.rs
// ================================================================

use thiserror::Error;

use crate::models::platform::Platform;

#[derive(Debug, Error)]
pub enum Error {
    /// Upstream unreachable or identity rejected. Non-fatal; the platform stays
    /// without a live handle until the next reconfiguration.
    #[error("Connect failure ({platform}): {reason}")]
    ConnectFailure { platform: Platform, reason: String },

    /// Upstream already gone while disconnecting. Always swallowed by the caller.
    #[error("Disconnect failure ({platform}): {reason}")]
    DisconnectFailure { platform: Platform, reason: String },

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    pub fn connect(platform: Platform, reason: impl Into<String>) -> Self {
        Error::ConnectFailure { platform, reason: reason.into() }
    }

    pub fn disconnect(platform: Platform, reason: impl Into<String>) -> Self {
        Error::DisconnectFailure { platform, reason: reason.into() }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}
