//! Derived ABI: the flattened external surface of a protocol document.
//!
//! The ABI is a pure function of the protocol logic, name, and version.
//! Entries are sorted by name, so reloading the same document reproduces
//! byte-identical ABI JSON.

use serde::{Deserialize, Serialize};

use super::Cpl;

/// Method entry in the ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiMethod {
    /// Method name.
    pub name: String,
    /// Ordered parameter names.
    pub params: Vec<String>,
    /// Return expression, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
}

/// Event entry in the ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEvent {
    /// Event name.
    pub name: String,
    /// Ordered parameter names.
    pub params: Vec<String>,
}

/// State variable entry in the ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiState {
    /// Variable name.
    pub name: String,
    /// Declared type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Default value, verbatim.
    pub default: String,
}

/// The full derived ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abi {
    /// Protocol name.
    pub protocol: String,
    /// Protocol version.
    pub version: String,
    /// Methods, sorted by name.
    pub methods: Vec<AbiMethod>,
    /// Events, sorted by name.
    pub events: Vec<AbiEvent>,
    /// State variables, sorted by name.
    pub state: Vec<AbiState>,
}

impl Abi {
    /// Derive the ABI from protocol logic plus identity.
    pub fn derive(cpl: &Cpl, protocol: &str, version: &str) -> Self {
        let methods = cpl
            .methods
            .iter()
            .map(|(name, method)| AbiMethod {
                name: name.clone(),
                params: method.params.clone(),
                returns: method.returns.clone(),
            })
            .collect();

        let events = cpl
            .events
            .iter()
            .map(|(name, event)| AbiEvent {
                name: name.clone(),
                params: event.params.clone(),
            })
            .collect();

        let state = cpl
            .state
            .iter()
            .map(|(name, var)| AbiState {
                name: name.clone(),
                type_name: var.type_name.clone(),
                default: var.default.clone(),
            })
            .collect();

        Self {
            protocol: protocol.to_string(),
            version: version.to_string(),
            methods,
            events,
            state,
        }
    }

    /// Render the ABI as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("abi serialization is infallible")
    }

    /// Render the ABI as pretty-printed JSON text.
    pub fn to_string_pretty(&self) -> String {
        serde_json::to_string_pretty(self).expect("abi serialization is infallible")
    }
}
