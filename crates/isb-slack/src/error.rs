//! Error types for isb-slack

use thiserror::Error;

/// isb-slack error type
#[derive(Error, Debug)]
pub enum SlackError {
    #[error("{method} failed after {attempts} attempt(s): {reason}")]
    RemoteCallFailed {
        method: String,
        attempts: u32,
        reason: String,
    },

    #[error("Unknown: {0}")]
    NotFound(String),

    #[error("Slack websocket closed: {status}, {reason}")]
    StreamClosed { status: u16, reason: String },

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Slack token not configured")]
    TokenNotConfigured,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SlackError>;
