//! Statement and expression evaluation.
//!
//! The evaluator walks compiled statement lists against a resolver and
//! buffers emitted events as plain (name, values) pairs; the orchestrator
//! owns timestamps and the global log. All intermediate results are
//! canonical strings, with numeric and boolean views derived on demand.

use super::ast::{BinOp, Expr, Stmt, UnOp};
use super::resolver::Resolver;
use super::value::{format_bool, format_float, parse_bool, parse_float, parse_int};
use super::EvalError;

/// An event produced while running a body, before timestamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedEvent {
    /// Declared event name.
    pub name: String,
    /// Evaluated argument values, in order.
    pub values: Vec<String>,
}

/// Executes statements against a resolver, collecting emitted events.
pub struct Evaluator<'r, 'a> {
    resolver: &'r mut Resolver<'a>,
    events: Vec<EmittedEvent>,
}

impl<'r, 'a> Evaluator<'r, 'a> {
    /// Create an evaluator over the given resolver.
    pub fn new(resolver: &'r mut Resolver<'a>) -> Self {
        Self {
            resolver,
            events: Vec::new(),
        }
    }

    /// Run a method body. Returns the value of the last bare expression
    /// statement (the provisional method result), or the empty string.
    pub fn run_body(&mut self, stmts: &[Stmt]) -> Result<String, EvalError> {
        let mut last = String::new();
        self.exec_stmts(stmts, &mut last)?;
        Ok(last)
    }

    /// Consume the evaluator, yielding the events emitted so far.
    pub fn into_events(self) -> Vec<EmittedEvent> {
        self.events
    }

    fn exec_stmts(&mut self, stmts: &[Stmt], last: &mut String) -> Result<(), EvalError> {
        for stmt in stmts {
            self.exec_stmt(stmt, last)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt, last: &mut String) -> Result<(), EvalError> {
        match stmt {
            Stmt::Assign { target, value } => {
                let value = self.eval(value)?;
                self.resolver.write(target, &value);
            }
            Stmt::If { condition, body } => {
                let condition = self.eval(condition)?;
                if parse_bool(&condition) {
                    self.exec_stmts(body, last)?;
                }
            }
            Stmt::Emit { event, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.events.push(EmittedEvent {
                    name: event.clone(),
                    values,
                });
            }
            Stmt::Expr(expr) => {
                *last = self.eval(expr)?;
            }
        }
        Ok(())
    }

    /// Evaluate an expression to its canonical string form.
    pub fn eval(&mut self, expr: &Expr) -> Result<String, EvalError> {
        match expr {
            Expr::Literal(text) => Ok(text.clone()),
            Expr::Var(var) => Ok(self.resolver.read(var)),
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                Ok(match op {
                    UnOp::Not => format_bool(!parse_bool(&operand)).to_string(),
                    UnOp::Neg => format_float(-parse_float(&operand)),
                })
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
        }
    }

    fn eval_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<String, EvalError> {
        // Logical operators short-circuit; operands are side-effect free,
        // so this only saves work.
        match op {
            BinOp::And => {
                let lhs = self.eval(lhs)?;
                if !parse_bool(&lhs) {
                    return Ok(format_bool(false).to_string());
                }
                let rhs = self.eval(rhs)?;
                return Ok(format_bool(parse_bool(&rhs)).to_string());
            }
            BinOp::Or => {
                let lhs = self.eval(lhs)?;
                if parse_bool(&lhs) {
                    return Ok(format_bool(true).to_string());
                }
                let rhs = self.eval(rhs)?;
                return Ok(format_bool(parse_bool(&rhs)).to_string());
            }
            _ => {}
        }

        let lhs = self.eval(lhs)?;
        let rhs = self.eval(rhs)?;
        let result = match op {
            BinOp::Add => format_float(parse_float(&lhs) + parse_float(&rhs)),
            BinOp::Sub => format_float(parse_float(&lhs) - parse_float(&rhs)),
            BinOp::Mul => format_float(parse_float(&lhs) * parse_float(&rhs)),
            BinOp::Div => {
                let divisor = parse_float(&rhs);
                if divisor == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                format_float(parse_float(&lhs) / divisor)
            }
            BinOp::Mod => {
                let divisor = parse_int(&rhs);
                if divisor == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                (parse_int(&lhs) % divisor).to_string()
            }
            BinOp::Eq => format_bool(lhs == rhs).to_string(),
            BinOp::Ne => format_bool(lhs != rhs).to_string(),
            BinOp::Lt => format_bool(parse_float(&lhs) < parse_float(&rhs)).to_string(),
            BinOp::Gt => format_bool(parse_float(&lhs) > parse_float(&rhs)).to_string(),
            BinOp::Le => format_bool(parse_float(&lhs) <= parse_float(&rhs)).to_string(),
            BinOp::Ge => format_bool(parse_float(&lhs) >= parse_float(&rhs)).to_string(),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::{parse_body, parse_expression};
    use crate::engine::value::{Value, ValueKind};
    use crate::runtime::state::{MemoryStore, StateBackend};
    use std::collections::BTreeMap;

    fn run(src: &str, store: &mut MemoryStore, types: &BTreeMap<String, ValueKind>) -> String {
        let mut resolver = Resolver::new(store, types);
        let stmts = parse_body(src).unwrap();
        let mut eval = Evaluator::new(&mut resolver);
        eval.run_body(&stmts).unwrap()
    }

    fn eval_str(src: &str) -> String {
        let mut store = MemoryStore::new();
        let types = BTreeMap::new();
        let mut resolver = Resolver::new(&mut store, &types);
        let expr = parse_expression(src).unwrap();
        Evaluator::new(&mut resolver).eval(&expr).unwrap()
    }

    #[test]
    fn arithmetic_uses_the_canonical_formatter() {
        assert_eq!(eval_str("1 + 2"), "3");
        assert_eq!(eval_str("7 - 10"), "-3");
        assert_eq!(eval_str("2 * 2.5"), "5");
        assert_eq!(eval_str("5 / 2"), "2.5");
        assert_eq!(eval_str("7 % 3"), "1");
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut store = MemoryStore::new();
        let types = BTreeMap::new();
        let mut resolver = Resolver::new(&mut store, &types);
        let expr = parse_expression("1 / 0").unwrap();
        let err = Evaluator::new(&mut resolver).eval(&expr).unwrap_err();
        assert!(matches!(err, EvalError::DivisionByZero));

        let expr = parse_expression("1 % 0").unwrap();
        let err = Evaluator::new(&mut resolver).eval(&expr).unwrap_err();
        assert!(matches!(err, EvalError::DivisionByZero));
    }

    #[test]
    fn equality_is_string_typed_comparisons_numeric() {
        assert_eq!(eval_str("\"abc\" == \"abc\""), "true");
        // Canonical forms differ even though the numbers agree.
        assert_eq!(eval_str("\"1\" == \"1.0\""), "false");
        assert_eq!(eval_str("\"2\" < \"10\""), "true");
        assert_eq!(eval_str("\"10\" >= \"2\""), "true");
    }

    #[test]
    fn logic_coerces_and_short_circuits() {
        assert_eq!(eval_str("true && \"1\""), "true");
        assert_eq!(eval_str("\"\" || false"), "false");
        assert_eq!(eval_str("\"anything\" || false"), "true");
        assert_eq!(eval_str("!\"\""), "true");
        assert_eq!(eval_str("!1"), "false");
    }

    #[test]
    fn non_numeric_operands_saturate_to_zero() {
        assert_eq!(eval_str("\"gm\" + \"doge\""), "0");
    }

    #[test]
    fn assignments_write_through_and_do_not_set_last_result() {
        let mut store = MemoryStore::new();
        let mut types = BTreeMap::new();
        types.insert("count".to_string(), ValueKind::Int);
        let result = run("state.count = state.count + 1", &mut store, &types);
        assert_eq!(result, "");
        assert_eq!(store.get("count").unwrap().text, "1");
    }

    #[test]
    fn last_expression_is_the_provisional_result() {
        let mut store = MemoryStore::new();
        let types = BTreeMap::new();
        let result = run("state.x = 5; state.x * 2", &mut store, &types);
        assert_eq!(result, "10");
    }

    #[test]
    fn conditionals_gate_their_bodies() {
        let mut store = MemoryStore::new();
        let types = BTreeMap::new();
        run(
            "state.n = 3; if (state.n > 2) { state.big = \"yes\" }; if (state.n > 5) { state.huge = \"yes\" }",
            &mut store,
            &types,
        );
        assert_eq!(store.get("big").unwrap().text, "yes");
        assert!(store.get("huge").is_none());
    }

    #[test]
    fn emit_collects_evaluated_arguments() {
        let mut store = MemoryStore::new();
        store.set("limit", Value::string("2"));
        let types = BTreeMap::new();
        let mut resolver = Resolver::new(&mut store, &types);
        let stmts = parse_body("emit Overflow(state.limit, \"hit\")").unwrap();
        let mut eval = Evaluator::new(&mut resolver);
        eval.run_body(&stmts).unwrap();
        assert_eq!(
            eval.into_events(),
            vec![EmittedEvent {
                name: "Overflow".into(),
                values: vec!["2".into(), "hit".into()],
            }]
        );
    }
}
