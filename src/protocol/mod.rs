//! Protocol documents: the on-disk `.car` contract format.
//!
//! A protocol document is a self-describing JSON envelope
//! `{p, op, protocol, version, cpl, abi, hash, signature}` whose inner
//! `cpl` object declares typed state variables, methods in the embedded
//! statement language, and events. Documents are immutable after load;
//! the loader validates structure, compiles method bodies, and derives
//! the ABI and content hash.

/// Derived ABI model.
pub mod abi;
/// Loading, validation, and method compilation.
pub mod loader;

pub use abi::{Abi, AbiEvent, AbiMethod, AbiState};
pub use loader::{compile_methods, CompiledMethod};

use std::collections::BTreeMap;

use thiserror::Error;

/// Required value of the `p` field.
pub const NAMESPACE: &str = "cardinals";
/// Required value of the `op` field.
pub const DEPLOY_OP: &str = "deploy";

/// A declared state variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    /// Declared type name (`string`, `int`, `bool`, `float`). Advisory.
    pub type_name: String,
    /// Default value, recorded verbatim as the initial value.
    pub default: String,
}

/// A declared method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    /// Ordered, unique parameter names.
    pub params: Vec<String>,
    /// Normalized body: `;`-separated statements (may be empty when the
    /// method only declares `returns`).
    pub body: String,
    /// Return expression, when declared.
    pub returns: Option<String>,
}

/// A declared event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDecl {
    /// Ordered parameter names.
    pub params: Vec<String>,
}

/// The protocol logic: state, methods, events, owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cpl {
    /// State variable declarations by name.
    pub state: BTreeMap<String, VarDecl>,
    /// Method declarations by name.
    pub methods: BTreeMap<String, MethodDecl>,
    /// Event declarations by name.
    pub events: BTreeMap<String, EventDecl>,
    /// Owner address.
    pub owner: String,
}

/// A validated protocol document.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    /// Protocol name.
    pub name: String,
    /// Protocol version.
    pub version: String,
    /// Protocol logic.
    pub cpl: Cpl,
    /// Derived ABI.
    pub abi: Abi,
    /// Content hash: preserved from the document when supplied, otherwise
    /// the blake3 hex digest of the canonical JSON encoding.
    pub hash: String,
    /// Opaque signature; never interpreted.
    pub signature: String,
}

/// Errors raised while loading a protocol document.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Document is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 wrapper could not be decoded.
    #[error("Base64 error: {0}")]
    Base64(String),

    /// Document violated a validation rule.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Structural validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// `p` was not "cardinals".
    #[error("invalid protocol namespace: '{0}'")]
    InvalidNamespace(String),

    /// `op` was not "deploy".
    #[error("invalid operation: '{0}'")]
    InvalidOperation(String),

    /// `protocol` was missing or empty.
    #[error("protocol name is empty")]
    MissingProtocolName,

    /// `version` was missing or empty.
    #[error("protocol version is empty")]
    MissingVersion,

    /// `cpl.owner` was missing or empty.
    #[error("protocol owner is empty")]
    MissingOwner,

    /// A state variable declared an empty type.
    #[error("state variable '{0}' has empty type")]
    EmptyVarType(String),

    /// A method declared neither a body nor a return expression.
    #[error("method '{0}' has no body or return value")]
    EmptyMethod(String),

    /// A method repeated a parameter name.
    #[error("method '{method}' declares duplicate parameter '{param}'")]
    DuplicateParam {
        /// Method name.
        method: String,
        /// Repeated parameter.
        param: String,
    },

    /// An event parameter entry was neither a string nor `{name: ...}`.
    #[error("event '{0}' has a malformed parameter list")]
    BadEventParams(String),

    /// A method body failed to parse.
    #[error("method '{method}' has a malformed body: {detail}")]
    BodySyntax {
        /// Method name.
        method: String,
        /// Parser diagnostic.
        detail: String,
    },

    /// A return expression failed to parse as a pure expression.
    #[error("method '{method}' has a malformed return expression: {detail}")]
    ReturnSyntax {
        /// Method name.
        method: String,
        /// Parser diagnostic.
        detail: String,
    },

    /// A method body writes a state variable that is not declared.
    #[error("method '{method}' writes undeclared state variable '{variable}'")]
    UndeclaredStateWrite {
        /// Method name.
        method: String,
        /// Undeclared variable.
        variable: String,
    },

    /// A method body emits an event that is not declared.
    #[error("method '{method}' emits undeclared event '{event}'")]
    UnknownEvent {
        /// Method name.
        method: String,
        /// Undeclared event.
        event: String,
    },

    /// An emit's argument count differs from the event declaration.
    #[error("method '{method}' emits '{event}' with {got} argument(s), declared {expected}")]
    EventArityMismatch {
        /// Method name.
        method: String,
        /// Event name.
        event: String,
        /// Declared parameter count.
        expected: usize,
        /// Emitted argument count.
        got: usize,
    },
}
