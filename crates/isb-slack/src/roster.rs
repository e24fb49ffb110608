//! Workspace roster diffing

use std::collections::BTreeSet;

/// Names that appeared and disappeared since the previous poll, each sorted
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RosterDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl RosterDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Remembers the last roster snapshot.
///
/// The first observation only records the baseline and reports nothing.
#[derive(Debug, Default)]
pub struct RosterTracker {
    snapshot: Option<BTreeSet<String>>,
}

impl RosterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe<I>(&mut self, names: I) -> RosterDelta
    where
        I: IntoIterator<Item = String>,
    {
        let current: BTreeSet<String> = names.into_iter().collect();

        let delta = match &self.snapshot {
            None => RosterDelta::default(),
            Some(previous) => RosterDelta {
                added: current.difference(previous).cloned().collect(),
                removed: previous.difference(&current).cloned().collect(),
            },
        };

        self.snapshot = Some(current);
        delta
    }
}
