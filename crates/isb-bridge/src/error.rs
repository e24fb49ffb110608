//! Error types for isb-bridge

use isb_irc::IrcError;
use isb_slack::SlackError;
use thiserror::Error;

/// isb-bridge error type
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Irc(#[from] IrcError),

    #[error(transparent)]
    Slack(#[from] SlackError),

    #[error("Not logged in!")]
    NotLoggedIn,

    #[error("{command} needs argument {index}")]
    MissingArgument { command: String, index: usize },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BridgeError>;
