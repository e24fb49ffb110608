//! Error types for isb-irc

use thiserror::Error;

/// Codec and line I/O errors
#[derive(Error, Debug)]
pub enum IrcError {
    #[error("Cannot parse: {0}")]
    MalformedLine(String),

    #[error("Bad argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for isb-irc
pub type Result<T> = std::result::Result<T, IrcError>;
