//! Events a remote session hands to its owner
//!
//! Every event carries the [`SessionTag`] of the session that produced it,
//! so the owner can drop events from a session it has already replaced.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

/// Identity of one remote session instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionTag(u64);

impl SessionTag {
    /// A tag no other session in this process has used
    pub fn next() -> Self {
        Self(NEXT_TAG.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A member joined or left the workspace between two roster polls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    Added(String),
    Removed(String),
}

#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// A JSON object received on the streaming socket
    Payload { session: SessionTag, payload: Value },
    Roster { session: SessionTag, change: RosterChange },
    /// The streaming socket is gone
    Closed {
        session: SessionTag,
        status: u16,
        reason: String,
    },
    /// A frame that could not be decoded
    Malformed { session: SessionTag, detail: String },
}

impl RemoteEvent {
    pub fn session(&self) -> SessionTag {
        match self {
            RemoteEvent::Payload { session, .. }
            | RemoteEvent::Roster { session, .. }
            | RemoteEvent::Closed { session, .. }
            | RemoteEvent::Malformed { session, .. } => *session,
        }
    }
}

/// Where a session delivers its events. Must only enqueue.
pub type EventSink = Arc<dyn Fn(RemoteEvent) + Send + Sync>;
