//! Error types for the carvm runtime.
//!
//! Domain errors use thiserror and nest into a single `RuntimeError` at
//! the orchestrator boundary. Method invocation never returns `Err`; its
//! failures are reported inside `MethodResult`.

use thiserror::Error;

use crate::engine::EvalError;
use crate::protocol::LoadError;

/// Top-level runtime error.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Protocol document failed to load or validate.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Method body or return expression failed at execution time.
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// State or snapshot persistence failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Call referenced an unknown method.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Positional argument count differed from the declared parameter count.
    #[error("Parameter count mismatch for '{method}'. Expected {expected}, got {got}")]
    Arity {
        /// Method being invoked.
        method: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        got: usize,
    },

    /// An operation required a loaded protocol.
    #[error("No protocol loaded")]
    NoProtocol,
}

/// Persistence-specific errors (state files and snapshots).
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Atomic write or read helper failure, with path context.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed snapshot or state file.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Result type using RuntimeError.
pub type Result<T> = std::result::Result<T, RuntimeError>;
