//! isb-irc: IRC side of the bridge
//!
//! The line grammar codec and the two byte-shuffling loops that move lines
//! between a client socket and the connection actor.

pub mod error;
pub mod line;
pub mod message;

pub use error::{IrcError, Result};
pub use message::Message;
