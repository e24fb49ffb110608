//! isb-core: shared plumbing for the IRC/Slack bridge
//!
//! Configuration, the per-actor mailbox and the debounced batch notifier
//! used by the protocol crates.

pub mod config;
pub mod debounce;
pub mod error;
pub mod mailbox;

pub use config::{Config, ServerConfig, SlackConfig};
pub use debounce::Debouncer;
pub use error::{Error, Result};
pub use mailbox::{Mailbox, MailboxSender};
