//! What a connection actor reacts to

use std::fmt;

use isb_slack::{RemoteEvent, RosterChange};

#[derive(Debug, Clone)]
pub enum Event {
    /// One line received from the IRC client
    IrcLine(String),
    /// Anything coming out of a remote session
    Remote(RemoteEvent),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::IrcLine(line) => f.write_str(line),
            Event::Remote(RemoteEvent::Payload { payload, .. }) => write!(f, "{}", payload),
            Event::Remote(RemoteEvent::Roster { change, .. }) => match change {
                RosterChange::Added(name) => write!(f, "roster +{}", name),
                RosterChange::Removed(name) => write!(f, "roster -{}", name),
            },
            Event::Remote(RemoteEvent::Closed { status, reason, .. }) => {
                write!(f, "websocket close {} {}", status, reason)
            }
            Event::Remote(RemoteEvent::Malformed { detail, .. }) => write!(f, "bad frame {}", detail),
        }
    }
}
