use serde::{Deserialize, Serialize};

/// A variable reference in one of the three namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarRef {
    /// `state.X` — always the state store.
    State(String),
    /// `params.X` — always the current argument frame.
    Params(String),
    /// Bare `X` — frame on read if present, store otherwise; store on write.
    Bare(String),
}

impl VarRef {
    /// The referenced name without its namespace qualifier.
    pub fn name(&self) -> &str {
        match self {
            VarRef::State(name) | VarRef::Params(name) | VarRef::Bare(name) => name,
        }
    }
}

/// Binary operators, grouped by the semantics they carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    /// Float addition.
    Add,
    /// Float subtraction.
    Sub,
    /// Float multiplication.
    Mul,
    /// Float division (division by zero is an evaluation error).
    Div,
    /// Integer remainder (zero divisor is an evaluation error).
    Mod,
    /// String equality on canonical forms.
    Eq,
    /// String inequality on canonical forms.
    Ne,
    /// Numeric less-than.
    Lt,
    /// Numeric greater-than.
    Gt,
    /// Numeric less-or-equal.
    Le,
    /// Numeric greater-or-equal.
    Ge,
    /// Boolean conjunction (short-circuiting).
    And,
    /// Boolean disjunction (short-circuiting).
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    /// Boolean negation.
    Not,
    /// Numeric negation.
    Neg,
}

/// An expression in the statement language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A literal token: string contents (quotes stripped), a numeric token
    /// verbatim, or the keywords `true`/`false`.
    Literal(String),
    /// A variable reference resolved through the namespace table.
    Var(VarRef),
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnOp,
        /// Operand.
        operand: Box<Expr>,
    },
}

/// A single statement of a method body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `lhs = rhs` — write through the resolver; the statement's value is
    /// the assigned text.
    Assign {
        /// Assignment target.
        target: VarRef,
        /// Value expression.
        value: Expr,
    },
    /// `if (cond) { body }` — the body runs when the condition coerces true.
    If {
        /// Condition expression.
        condition: Expr,
        /// Nested statement list.
        body: Vec<Stmt>,
    },
    /// `emit Name(arg, ...)` — record an event.
    Emit {
        /// Declared event name.
        event: String,
        /// Argument expressions, evaluated left to right.
        args: Vec<Expr>,
    },
    /// A bare expression; its value becomes the provisional method result.
    Expr(Expr),
}
