//! Namespace resolution for variable references.
//!
//! A resolver is constructed per invocation: it borrows the state store
//! owned by the runtime, the declared-type table, and carries the argument
//! frame for the current call. It must not outlive the call.

use std::collections::BTreeMap;

use super::ast::VarRef;
use super::value::{Value, ValueKind};
use crate::runtime::state::StateBackend;

/// Resolves `state.X`, `params.X`, and bare references against the store
/// and the current argument frame.
pub struct Resolver<'a> {
    store: &'a mut dyn StateBackend,
    types: &'a BTreeMap<String, ValueKind>,
    frame: BTreeMap<String, String>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver with an empty argument frame.
    pub fn new(store: &'a mut dyn StateBackend, types: &'a BTreeMap<String, ValueKind>) -> Self {
        Self {
            store,
            types,
            frame: BTreeMap::new(),
        }
    }

    /// Bind a parameter into the argument frame.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.frame.insert(name.into(), value.into());
    }

    /// Read a reference. Unknown names resolve to the empty string.
    ///
    /// Bare names prefer the argument frame, falling back to the store.
    pub fn read(&self, var: &VarRef) -> String {
        match var {
            VarRef::State(name) => self.read_store(name),
            VarRef::Params(name) => self.frame.get(name).cloned().unwrap_or_default(),
            VarRef::Bare(name) => match self.frame.get(name) {
                Some(value) => value.clone(),
                None => self.read_store(name),
            },
        }
    }

    /// Write through a reference. Bare names always write the store.
    pub fn write(&mut self, var: &VarRef, value: &str) {
        match var {
            VarRef::State(name) | VarRef::Bare(name) => self.write_store(name, value),
            VarRef::Params(name) => {
                self.frame.insert(name.clone(), value.to_string());
            }
        }
    }

    fn read_store(&self, name: &str) -> String {
        self.store.get(name).map(|v| v.text).unwrap_or_default()
    }

    fn write_store(&mut self, name: &str, value: &str) {
        let kind = self
            .types
            .get(name)
            .copied()
            .unwrap_or(ValueKind::String);
        self.store.set(name, Value::tagged(kind, value));
    }
}
