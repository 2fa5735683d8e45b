//! carvm – A deterministic runtime for cardinals protocol documents
//!
//! This crate loads `.car` protocol documents (self-describing JSON
//! contracts), materializes their declared state, and executes their
//! methods with:
//! - A real tokenizer + parser for the embedded statement language
//! - A typed key-value state store with file persistence
//! - An append-only event log populated by `emit` statements
//! - Snapshot/restore of state + events for durable execution
//! - Deterministic results: same document, state, and arguments always
//!   produce the same post-state, return value, and event sequence

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// The embedded statement language: lexer, parser, evaluator.
pub mod engine;
/// Protocol document model, loader, and derived ABI.
pub mod protocol;
/// Runtime orchestrator, state store, events, snapshots.
pub mod runtime;

// Re-export key types for convenience
pub use protocol::{Abi, Protocol};
pub use runtime::{MethodResult, Runtime, RuntimeConfig};

/// Current version of the carvm runtime.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
