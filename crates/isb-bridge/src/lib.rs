//! isb-bridge: per-connection actor joining an IRC client to Slack
//!
//! [`serve`] runs one connection: a line reader and a line writer around a
//! single [`Bridge`] actor that owns the connection's Slack session.

pub mod client;
pub mod control;
pub mod error;
pub mod event;
pub mod translate;

pub use client::{serve, Bridge};
pub use control::ControlCommand;
pub use error::{BridgeError, Result};
pub use event::Event;
