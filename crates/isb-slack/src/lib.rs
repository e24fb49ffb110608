//! isb-slack: Slack side of the IRC/Slack bridge
//!
//! Web API calls with a bounded retry budget, the streaming socket, and the
//! per-login [`RemoteSession`] that ties them to lookup caches, roster
//! tracking and read-marking.

pub mod api;
pub mod error;
pub mod event;
pub mod lookup;
pub mod roster;
pub mod session;
pub mod socket;
pub mod types;

pub use api::SlackApiClient;
pub use error::{Result, SlackError};
pub use event::{EventSink, RemoteEvent, RosterChange, SessionTag};
pub use roster::RosterDelta;
pub use session::RemoteSession;
pub use types::ChannelInfo;
