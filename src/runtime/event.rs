//! Event records and the append-only event log.

use serde::{Deserialize, Serialize};

/// A single emitted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Declared event name.
    pub name: String,
    /// Evaluated argument values, in emission order.
    pub values: Vec<String>,
    /// Wall-clock timestamp (excluded from determinism guarantees).
    pub timestamp: String,
}

/// Ordered, append-only log of emitted events.
///
/// Lives with the orchestrator and persists across calls until cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    entries: Vec<EventRecord>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn append(&mut self, record: EventRecord) {
        self.entries.push(record);
    }

    /// All entries in emission order.
    pub fn entries(&self) -> &[EventRecord] {
        &self.entries
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no events have been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replace the log wholesale (snapshot restore).
    pub fn replace(&mut self, entries: Vec<EventRecord>) {
        self.entries = entries;
    }
}
