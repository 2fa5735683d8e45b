//! Runtime orchestrator and public API.
//!
//! This module provides the main `Runtime` struct that ties a loaded
//! protocol document to a state store, executes method calls through the
//! statement engine, manages the event log, and handles snapshots and
//! persistence.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

// Submodules
/// Clock capability for timestamps.
pub mod clock;
/// Runtime and persistence error types.
pub mod error;
/// Event records and the event log.
pub mod event;
/// Runtime snapshots.
pub mod snapshot;
/// State backends and the state-file format.
pub mod state;
/// Atomic file write helpers.
pub mod storage;

use crate::engine::eval::{EmittedEvent, Evaluator};
use crate::engine::resolver::Resolver;
use crate::engine::value::{Value, ValueKind};
use crate::engine::EvalError;
use crate::protocol::{compile_methods, Abi, CompiledMethod, LoadError, Protocol};

use clock::{Clock, SystemClock};
use event::{EventLog, EventRecord};
use snapshot::Snapshot;
use state::{MemoryStore, StateBackend};

// Re-export commonly used types
pub use error::{PersistenceError, Result, RuntimeError};

/// Configuration for the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Record emitted events (when false, `emit` is a no-op).
    pub enable_events: bool,

    /// Advisory: snapshots are supported for this instance.
    pub enable_snapshots: bool,

    /// Advisory: persistence is supported for this instance. Callers
    /// still invoke save/load explicitly.
    pub enable_persistence: bool,

    /// Opaque snapshot cadence hint, passed through to hosts.
    pub snapshot_interval: String,

    /// Opaque storage location hint, passed through to hosts.
    pub storage_path: String,

    /// Roll back state and drop buffered events when a call fails
    /// mid-body. The default matches the reference behavior: partial
    /// mutations persist.
    pub transactional: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            enable_events: true,
            enable_snapshots: true,
            enable_persistence: true,
            snapshot_interval: "7d".to_string(),
            storage_path: String::new(),
            transactional: false,
        }
    }
}

/// Outcome of a method invocation.
///
/// Invocation failures (unknown method, arity mismatch, evaluation
/// errors) are reported here rather than raised.
#[derive(Debug)]
pub struct MethodResult {
    /// Whether the call completed without error.
    pub success: bool,
    /// The method's return value ("" when none).
    pub return_value: String,
    /// Events emitted during this call, in emission order.
    pub events: Vec<EventRecord>,
    /// The failure, when `success` is false.
    pub error: Option<RuntimeError>,
}

impl MethodResult {
    fn ok(return_value: String, events: Vec<EventRecord>) -> Self {
        Self {
            success: true,
            return_value,
            events,
            error: None,
        }
    }

    fn failed(error: RuntimeError) -> Self {
        Self {
            success: false,
            return_value: String::new(),
            events: Vec::new(),
            error: Some(error),
        }
    }

    /// The failure rendered as text, when present.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// The main runtime orchestrator.
///
/// Owns the loaded protocol, its compiled methods, the state store, and
/// the event log. Single-threaded and non-reentrant: a call runs to
/// completion before the next begins.
pub struct Runtime {
    config: RuntimeConfig,
    protocol: Option<Protocol>,
    methods: BTreeMap<String, CompiledMethod>,
    decl_types: BTreeMap<String, ValueKind>,
    store: Box<dyn StateBackend>,
    events: EventLog,
    clock: Box<dyn Clock>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with an explicit configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            config,
            protocol: None,
            methods: BTreeMap::new(),
            decl_types: BTreeMap::new(),
            store: Box::new(MemoryStore::new()),
            events: EventLog::new(),
            clock: Box::new(SystemClock),
        }
    }

    /// Replace the clock (tests inject a fixed instant).
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the state backend.
    pub fn with_backend(mut self, store: Box<dyn StateBackend>) -> Self {
        self.store = store;
        self
    }

    // ── Protocol loading ──────────────────────────────────

    /// Load and validate a protocol document from a file, then initialize
    /// the store from declared defaults (overwriting any existing state).
    pub fn load_protocol(&mut self, path: &Path) -> Result<()> {
        let protocol = Protocol::from_file(path)?;
        self.install(protocol)
    }

    /// Load a protocol document from a JSON string.
    pub fn load_protocol_from_json(&mut self, json: &str) -> Result<()> {
        let protocol = Protocol::from_json(json)?;
        self.install(protocol)
    }

    /// Load a protocol document from a base64-wrapped JSON string.
    pub fn load_protocol_from_base64(&mut self, encoded: &str) -> Result<()> {
        let protocol = Protocol::from_base64(encoded)?;
        self.install(protocol)
    }

    fn install(&mut self, protocol: Protocol) -> Result<()> {
        let methods = compile_methods(&protocol.cpl)
            .map_err(|e| RuntimeError::Load(LoadError::Schema(e)))?;

        self.decl_types = protocol
            .cpl
            .state
            .iter()
            .map(|(name, var)| (name.clone(), ValueKind::from_decl(&var.type_name)))
            .collect();
        self.methods = methods;
        tracing::debug!(
            protocol = %protocol.name,
            version = %protocol.version,
            methods = self.methods.len(),
            "protocol loaded"
        );
        self.protocol = Some(protocol);
        self.install_defaults();
        Ok(())
    }

    fn install_defaults(&mut self) {
        self.store.clear();
        if let Some(protocol) = &self.protocol {
            for (name, var) in &protocol.cpl.state {
                let kind = ValueKind::from_decl(&var.type_name);
                self.store.set(name, Value::tagged(kind, var.default.clone()));
            }
        }
    }

    // ── Method invocation ─────────────────────────────────

    /// Call a method with positional string arguments.
    pub fn call_method(&mut self, name: &str, args: &[String]) -> MethodResult {
        if self.protocol.is_none() {
            return MethodResult::failed(RuntimeError::NoProtocol);
        }
        let method = match self.methods.get(name) {
            Some(method) => method.clone(),
            None => return MethodResult::failed(RuntimeError::MethodNotFound(name.to_string())),
        };
        if args.len() != method.params.len() {
            return MethodResult::failed(RuntimeError::Arity {
                method: name.to_string(),
                expected: method.params.len(),
                got: args.len(),
            });
        }

        let rollback = if self.config.transactional {
            Some(self.store.get_all())
        } else {
            None
        };

        let (outcome, emitted) =
            run_compiled(&mut *self.store, &self.decl_types, &method, args);

        match outcome {
            Ok(return_value) => {
                let events = self.record_emitted(emitted);
                MethodResult::ok(return_value, events)
            }
            Err(error) => {
                if let Some(image) = rollback {
                    // Strict mode: undo partial writes and drop the
                    // events buffered by the failed call.
                    tracing::warn!(
                        method = %name,
                        error = %error,
                        "call failed, rolling back state"
                    );
                    self.store.clear();
                    self.store.set_many(image);
                    MethodResult::failed(error.into())
                } else {
                    tracing::debug!(
                        method = %name,
                        error = %error,
                        "call failed, keeping partial state"
                    );
                    let events = self.record_emitted(emitted);
                    let mut result = MethodResult::failed(error.into());
                    result.events = events;
                    result
                }
            }
        }
    }

    /// Call a method with JSON arguments: arrays bind positionally,
    /// objects bind by declared parameter name (missing entries default
    /// to the empty string).
    pub fn call_method_with_json(
        &mut self,
        name: &str,
        args: &serde_json::Value,
    ) -> MethodResult {
        let string_args: Vec<String> = match args {
            serde_json::Value::Array(items) => items.iter().map(json_arg_text).collect(),
            serde_json::Value::Object(map) => match self.methods.get(name) {
                Some(method) => method
                    .params
                    .iter()
                    .map(|param| map.get(param).map(json_arg_text).unwrap_or_default())
                    .collect(),
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        self.call_method(name, &string_args)
    }

    fn record_emitted(&mut self, emitted: Vec<EmittedEvent>) -> Vec<EventRecord> {
        if !self.config.enable_events || emitted.is_empty() {
            return Vec::new();
        }
        let timestamp = clock::format_timestamp(self.clock.now());
        let mut records = Vec::with_capacity(emitted.len());
        for event in emitted {
            let record = EventRecord {
                name: event.name,
                values: event.values,
                timestamp: timestamp.clone(),
            };
            self.events.append(record.clone());
            records.push(record);
        }
        records
    }

    // ── State management ──────────────────────────────────

    /// Administrative read of a state key ("" when absent). Does not go
    /// through the evaluator.
    pub fn get_state(&self, key: &str) -> String {
        self.store.get(key).map(|v| v.text).unwrap_or_default()
    }

    /// Administrative write of a state key. The value is tagged with the
    /// declared type of the variable when one exists.
    pub fn set_state(&mut self, key: &str, value: &str) {
        let kind = self
            .decl_types
            .get(key)
            .copied()
            .unwrap_or(ValueKind::String);
        self.store.set(key, Value::tagged(kind, value));
    }

    /// All state as canonical strings, sorted by key.
    pub fn get_all_state(&self) -> BTreeMap<String, String> {
        self.store
            .get_all()
            .into_iter()
            .map(|(key, value)| (key, value.text))
            .collect()
    }

    // ── Events ────────────────────────────────────────────

    /// Append an event directly, honoring `enable_events`.
    pub fn emit_event(&mut self, name: &str, values: Vec<String>) {
        if !self.config.enable_events {
            return;
        }
        let record = EventRecord {
            name: name.to_string(),
            values,
            timestamp: clock::format_timestamp(self.clock.now()),
        };
        self.events.append(record);
    }

    /// The global event log.
    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    /// Drop all recorded events.
    pub fn clear_event_log(&mut self) {
        self.events.clear();
    }

    // ── Snapshots ─────────────────────────────────────────

    /// Create a snapshot of the current state and event log.
    pub fn create_snapshot(&self, block_height: Option<&str>) -> Snapshot {
        Snapshot {
            protocol_name: self.protocol_name().to_string(),
            version: self.protocol_version().to_string(),
            state: self.get_all_state(),
            timestamp: clock::format_timestamp(self.clock.now()),
            block_height: block_height.map(|h| h.to_string()),
            event_log: self.events.entries().to_vec(),
        }
    }

    /// Restore state and event log from a snapshot. The store is cleared
    /// first so the restored image is exact.
    pub fn restore_from_snapshot(&mut self, snapshot: &Snapshot) {
        self.store.clear();
        for (key, value) in &snapshot.state {
            let kind = self
                .decl_types
                .get(key)
                .copied()
                .unwrap_or(ValueKind::String);
            self.store.set(key, Value::tagged(kind, value.clone()));
        }
        self.events.replace(snapshot.event_log.clone());
    }

    /// Snapshot the runtime and write it to a file.
    pub fn save_snapshot_to_file(&self, path: &Path) -> Result<()> {
        self.create_snapshot(None).save(path)?;
        Ok(())
    }

    /// Load a snapshot file and restore from it.
    pub fn load_snapshot_from_file(&mut self, path: &Path) -> Result<()> {
        let snapshot = Snapshot::load(path)?;
        self.restore_from_snapshot(&snapshot);
        Ok(())
    }

    // ── Persistence ───────────────────────────────────────

    /// Persist the store to a state file.
    pub fn save_state_to_file(&self, path: &Path) -> Result<()> {
        self.store.save(path)?;
        Ok(())
    }

    /// Load the store from a state file, replacing current contents.
    pub fn load_state_from_file(&mut self, path: &Path) -> Result<()> {
        self.store.load(path)?;
        Ok(())
    }

    // ── Introspection ─────────────────────────────────────

    /// The loaded protocol document, when any.
    pub fn protocol(&self) -> Option<&Protocol> {
        self.protocol.as_ref()
    }

    /// Name of the loaded protocol ("" when none).
    pub fn protocol_name(&self) -> &str {
        self.protocol.as_ref().map(|p| p.name.as_str()).unwrap_or("")
    }

    /// Version of the loaded protocol ("" when none).
    pub fn protocol_version(&self) -> &str {
        self.protocol
            .as_ref()
            .map(|p| p.version.as_str())
            .unwrap_or("")
    }

    /// The derived ABI of the loaded protocol.
    pub fn abi(&self) -> Option<&Abi> {
        self.protocol.as_ref().map(|p| &p.abi)
    }

    /// Declared method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    /// Declared state variable names, sorted.
    pub fn state_variables(&self) -> Vec<String> {
        self.decl_types.keys().cloned().collect()
    }

    /// The active configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Replace the configuration.
    pub fn set_config(&mut self, config: RuntimeConfig) {
        self.config = config;
    }

    // ── Reset ─────────────────────────────────────────────

    /// Clear the store and reinstall declared defaults.
    pub fn reset_state(&mut self) {
        self.install_defaults();
    }

    /// Drop the protocol, state, and event log.
    pub fn reset(&mut self) {
        self.protocol = None;
        self.methods.clear();
        self.decl_types.clear();
        self.store.clear();
        self.events.clear();
    }
}

/// Execute a compiled method against the store. Returns the outcome and
/// whatever events were buffered before completion or failure.
fn run_compiled(
    store: &mut dyn StateBackend,
    types: &BTreeMap<String, ValueKind>,
    method: &CompiledMethod,
    args: &[String],
) -> (std::result::Result<String, EvalError>, Vec<EmittedEvent>) {
    let mut resolver = Resolver::new(store, types);
    for (param, arg) in method.params.iter().zip(args) {
        resolver.bind(param.clone(), arg.clone());
    }

    let mut evaluator = Evaluator::new(&mut resolver);
    let outcome = match evaluator.run_body(&method.body) {
        // The declared return expression overrides the last-statement
        // value, evaluated in the same environment after the body.
        Ok(last) => match &method.returns {
            Some(expr) => evaluator.eval(expr),
            None => Ok(last),
        },
        Err(error) => Err(error),
    };
    let events = evaluator.into_events();
    (outcome, events)
}

fn json_arg_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
