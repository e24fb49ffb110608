//! Error types for isb-core

use thiserror::Error;

/// Main error type for isb-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for isb-core
pub type Result<T> = std::result::Result<T, Error>;
