//! State backends: the typed key-value store behind a loaded protocol.
//!
//! The orchestrator owns a boxed [`StateBackend`]; the in-memory store is
//! the default and alternative backends slot in without touching the
//! orchestrator. The persisted wire form maps each key to
//! `{"type": <tag>, "value": "<text>"}` with the tag order defined by
//! [`ValueKind`]; that format is an external contract.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::PersistenceError;
use super::storage;
use crate::engine::value::{Value, ValueKind};

/// Wire form of a single stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredValue {
    /// Type tag (String=0, Int=1, Bool=2, Float=3).
    #[serde(rename = "type")]
    tag: u8,
    /// Canonical text, stored verbatim.
    value: String,
}

impl StoredValue {
    fn encode(value: &Value) -> Self {
        Self {
            tag: value.kind.as_tag(),
            value: value.text.clone(),
        }
    }

    fn decode(&self) -> Result<Value, PersistenceError> {
        let kind = ValueKind::from_tag(self.tag)
            .ok_or_else(|| PersistenceError::InvalidFormat(format!("unknown type tag {}", self.tag)))?;
        Ok(Value::tagged(kind, self.value.clone()))
    }
}

/// Capability trait for state storage.
pub trait StateBackend {
    /// Set a key to a value.
    fn set(&mut self, key: &str, value: Value);

    /// Get a value by key.
    fn get(&self, key: &str) -> Option<Value>;

    /// Check whether a key is present.
    fn has(&self, key: &str) -> bool;

    /// Remove a key, reporting whether it existed.
    fn remove(&mut self, key: &str) -> bool;

    /// Set several keys at once.
    fn set_many(&mut self, values: BTreeMap<String, Value>);

    /// Copy out the entire store.
    fn get_all(&self) -> BTreeMap<String, Value>;

    /// Remove all keys.
    fn clear(&mut self);

    /// Number of stored keys.
    fn len(&self) -> usize;

    /// True when nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produce a store-level snapshot: `{timestamp, state: {k: {type, value}}}`.
    fn snapshot(&self) -> serde_json::Value;

    /// Restore from a store-level snapshot. Malformed input leaves the
    /// store unchanged.
    fn restore(&mut self, snapshot: &serde_json::Value) -> Result<(), PersistenceError>;

    /// Persist the store to a file in the typed wire form.
    fn save(&self, path: &Path) -> Result<(), PersistenceError>;

    /// Load the store from a file, replacing the current contents.
    /// A failed load leaves the store unchanged.
    fn load(&mut self, path: &Path) -> Result<(), PersistenceError>;
}

/// In-memory state store (the default backend).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: BTreeMap<String, Value>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn encode_all(&self) -> BTreeMap<String, StoredValue> {
        self.state
            .iter()
            .map(|(key, value)| (key.clone(), StoredValue::encode(value)))
            .collect()
    }

    fn decode_all(
        encoded: &BTreeMap<String, StoredValue>,
    ) -> Result<BTreeMap<String, Value>, PersistenceError> {
        let mut state = BTreeMap::new();
        for (key, stored) in encoded {
            state.insert(key.clone(), stored.decode()?);
        }
        Ok(state)
    }
}

impl StateBackend for MemoryStore {
    fn set(&mut self, key: &str, value: Value) {
        self.state.insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.state.get(key).cloned()
    }

    fn has(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    fn remove(&mut self, key: &str) -> bool {
        self.state.remove(key).is_some()
    }

    fn set_many(&mut self, values: BTreeMap<String, Value>) {
        self.state.extend(values);
    }

    fn get_all(&self) -> BTreeMap<String, Value> {
        self.state.clone()
    }

    fn clear(&mut self) {
        self.state.clear();
    }

    fn len(&self) -> usize {
        self.state.len()
    }

    fn snapshot(&self) -> serde_json::Value {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        serde_json::json!({
            "timestamp": timestamp,
            "state": self.encode_all(),
        })
    }

    fn restore(&mut self, snapshot: &serde_json::Value) -> Result<(), PersistenceError> {
        let state_json = snapshot
            .get("state")
            .ok_or_else(|| PersistenceError::InvalidFormat("missing state".to_string()))?;
        let encoded: BTreeMap<String, StoredValue> =
            serde_json::from_value(state_json.clone())?;
        // Decode fully before swapping so a malformed entry changes nothing.
        self.state = Self::decode_all(&encoded)?;
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(&self.encode_all())?;
        storage::write_atomic(path, &json)
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), PersistenceError> {
        let data =
            storage::read_file(path).map_err(|e| PersistenceError::Storage(e.to_string()))?;
        let encoded: BTreeMap<String, StoredValue> = serde_json::from_slice(&data)?;
        self.state = Self::decode_all(&encoded)?;
        Ok(())
    }
}
