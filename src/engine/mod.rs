//! The embedded statement language: lexer, parser, and evaluator.
//!
//! Method bodies in a protocol document are `;`-separated statements over
//! a tiny expression language (assignment, `if` blocks, `emit`, and the
//! usual arithmetic/comparison/logical operators). This module compiles
//! bodies to an AST at load time and evaluates them against the runtime's
//! state store through a per-call resolver.

/// Expression and statement AST.
pub mod ast;
/// Statement/expression evaluation.
pub mod eval;
/// Tokenizer for the statement language.
pub mod lexer;
/// Recursive-descent and Pratt parsing.
pub mod parser;
/// Variable namespace resolution.
pub mod resolver;
/// Tagged canonical-string values and coercions.
pub mod value;

pub use ast::{BinOp, Expr, Stmt, UnOp, VarRef};
pub use eval::{EmittedEvent, Evaluator};
pub use parser::{parse_body, parse_expression};
pub use resolver::Resolver;
pub use value::{format_float, parse_bool, Value, ValueKind};

use thiserror::Error;

/// Errors surfaced while parsing or evaluating method bodies.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// Lexical or grammatical failure, with a byte position.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Division or remainder with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,
}
