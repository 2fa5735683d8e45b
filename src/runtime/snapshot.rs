//! Runtime snapshots: protocol identity + state + event log.
//!
//! The canonical encoding is a JSON object with the keys
//! `protocol_name, version, state, timestamp, block_height, event_log`.
//! State is flattened to canonical strings; the typed wire form is the
//! state file's concern, not the snapshot's.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::PersistenceError;
use super::event::EventRecord;
use super::storage;

/// A serialized image of a runtime at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Name of the loaded protocol ("" when none).
    #[serde(default)]
    pub protocol_name: String,
    /// Version of the loaded protocol ("" when none).
    #[serde(default)]
    pub version: String,
    /// State variables as canonical strings, sorted by key.
    pub state: BTreeMap<String, String>,
    /// Wall-clock timestamp of snapshot creation.
    #[serde(default)]
    pub timestamp: String,
    /// Optional block height supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<String>,
    /// Event log in emission order.
    #[serde(default)]
    pub event_log: Vec<EventRecord>,
}

impl Snapshot {
    /// Canonical JSON encoding.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("snapshot serialization is infallible")
    }

    /// Parse a snapshot from JSON. Unknown top-level keys are ignored;
    /// a missing `state` or malformed entries fail the parse.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, PersistenceError> {
        serde_json::from_value(value.clone())
            .map_err(|e| PersistenceError::InvalidFormat(e.to_string()))
    }

    /// Write the snapshot to a file (atomic, two-space pretty printed).
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(self)?;
        storage::write_atomic(path, &json)
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Read a snapshot from a file.
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let data =
            storage::read_file(path).map_err(|e| PersistenceError::Storage(e.to_string()))?;
        let value: serde_json::Value = serde_json::from_slice(&data)?;
        Self::from_json(&value)
    }
}
