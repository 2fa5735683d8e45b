//! Parser for method bodies and return expressions.
//!
//! Statements are parsed from the token stream, so `;` inside string
//! literals, nested `{}` blocks, and `=` in return expressions all behave
//! as the grammar dictates. Expressions use a Pratt parser with the
//! conventional precedence ladder (unary binds tightest, `||` loosest).

use super::ast::{BinOp, Expr, Stmt, UnOp, VarRef};
use super::lexer::{tokenize, Op, Spanned, Token};
use super::EvalError;

/// Parse a `;`-separated method body into a statement list.
pub fn parse_body(src: &str) -> Result<Vec<Stmt>, EvalError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser::new(tokens);
    let stmts = parser.parse_stmts(false)?;
    parser.expect_eof()?;
    Ok(stmts)
}

/// Parse a standalone expression (used for `returns` clauses).
///
/// Assignment and `emit` are statements, so a return expression is pure by
/// construction.
pub fn parse_expression(src: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr(0)?;
    parser.expect_eof()?;
    Ok(expr)
}

type ParseResult<T> = Result<T, EvalError>;

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, index: 0 }
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|s| s.token.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn at_op(&self, op: Op) -> bool {
        matches!(self.current(), Some(Token::Op(o)) if *o == op)
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.at_op(op) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Op, context: &str) -> ParseResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?} {}", op, context)))
        }
    }

    fn expect_eof(&self) -> ParseResult<()> {
        match self.current() {
            None => Ok(()),
            Some(token) => Err(self.error(&format!("unexpected trailing {:?}", token))),
        }
    }

    fn error(&self, message: &str) -> EvalError {
        let at = self
            .tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map(|s| s.at)
            .unwrap_or(0);
        EvalError::Syntax(format!("{} at byte {}", message, at))
    }

    /// Parse statements until end of input, or until a `}` when parsing an
    /// `if` body (`in_block`). The closing brace is left for the caller.
    fn parse_stmts(&mut self, in_block: bool) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while self.eat_op(Op::Semi) {}
            match self.current() {
                None => break,
                Some(Token::Op(Op::RBrace)) if in_block => break,
                _ => {}
            }
            stmts.push(self.parse_stmt()?);
            match self.current() {
                None => break,
                Some(Token::Op(Op::Semi)) => continue,
                Some(Token::Op(Op::RBrace)) if in_block => break,
                Some(token) => {
                    return Err(self.error(&format!("expected ';' before {:?}", token)));
                }
            }
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        match self.current() {
            Some(Token::Ident(name)) if name == "emit" => self.parse_emit(),
            Some(Token::Ident(name)) if name == "if" => self.parse_if(),
            _ => {
                let expr = self.parse_expr(0)?;
                if self.eat_op(Op::Assign) {
                    let target = match expr {
                        Expr::Var(var) => var,
                        other => {
                            return Err(self.error(&format!(
                                "assignment target must be a variable, found {:?}",
                                other
                            )));
                        }
                    };
                    let value = self.parse_expr(0)?;
                    Ok(Stmt::Assign { target, value })
                } else {
                    Ok(Stmt::Expr(expr))
                }
            }
        }
    }

    fn parse_emit(&mut self) -> ParseResult<Stmt> {
        // consume `emit`
        self.advance();
        let event = match self.advance() {
            Some(Token::Ident(name)) => name,
            _ => return Err(self.error("expected event name after 'emit'")),
        };
        self.expect_op(Op::LParen, "after event name")?;
        let mut args = Vec::new();
        if !self.at_op(Op::RParen) {
            loop {
                args.push(self.parse_expr(0)?);
                if !self.eat_op(Op::Comma) {
                    break;
                }
            }
        }
        self.expect_op(Op::RParen, "to close emit arguments")?;
        Ok(Stmt::Emit { event, args })
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        // consume `if`
        self.advance();
        self.expect_op(Op::LParen, "after 'if'")?;
        let condition = self.parse_expr(0)?;
        self.expect_op(Op::RParen, "to close condition")?;
        self.expect_op(Op::LBrace, "to open if body")?;
        let body = self.parse_stmts(true)?;
        self.expect_op(Op::RBrace, "to close if body")?;
        Ok(Stmt::If { condition, body })
    }

    fn parse_expr(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let (op, bp) = match self.current() {
                Some(Token::Op(Op::OrOr)) => (BinOp::Or, 1),
                Some(Token::Op(Op::AndAnd)) => (BinOp::And, 2),
                Some(Token::Op(Op::EqEq)) => (BinOp::Eq, 3),
                Some(Token::Op(Op::NotEq)) => (BinOp::Ne, 3),
                Some(Token::Op(Op::Lt)) => (BinOp::Lt, 4),
                Some(Token::Op(Op::Gt)) => (BinOp::Gt, 4),
                Some(Token::Op(Op::Le)) => (BinOp::Le, 4),
                Some(Token::Op(Op::Ge)) => (BinOp::Ge, 4),
                Some(Token::Op(Op::Plus)) => (BinOp::Add, 5),
                Some(Token::Op(Op::Minus)) => (BinOp::Sub, 5),
                Some(Token::Op(Op::Star)) => (BinOp::Mul, 6),
                Some(Token::Op(Op::Slash)) => (BinOp::Div, 6),
                Some(Token::Op(Op::Percent)) => (BinOp::Mod, 6),
                _ => break,
            };
            if bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(bp + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.eat_op(Op::Bang) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(operand),
            });
        }
        if self.eat_op(Op::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.advance() {
            Some(Token::Number(text)) => Ok(Expr::Literal(text)),
            Some(Token::Str(text)) => Ok(Expr::Literal(text)),
            Some(Token::Bool(flag)) => Ok(Expr::Literal(
                if flag { "true" } else { "false" }.to_string(),
            )),
            Some(Token::Op(Op::LParen)) => {
                let expr = self.parse_expr(0)?;
                self.expect_op(Op::RParen, "to close group")?;
                Ok(expr)
            }
            Some(Token::Ident(head)) => self.parse_var(head),
            Some(token) => Err(self.error(&format!("unexpected {:?} in expression", token))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_var(&mut self, head: String) -> ParseResult<Expr> {
        if self.eat_op(Op::Dot) {
            let field = match self.advance() {
                Some(Token::Ident(name)) => name,
                _ => return Err(self.error("expected a name after '.'")),
            };
            let var = match head.as_str() {
                "state" => VarRef::State(field),
                "params" => VarRef::Params(field),
                other => {
                    return Err(self.error(&format!(
                        "unknown namespace '{}': expected 'state' or 'params'",
                        other
                    )));
                }
            };
            Ok(Expr::Var(var))
        } else {
            Ok(Expr::Var(VarRef::Bare(head)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_to_state() {
        let stmts = parse_body("state.msg = params.new_msg").unwrap();
        assert_eq!(
            stmts,
            vec![Stmt::Assign {
                target: VarRef::State("msg".into()),
                value: Expr::Var(VarRef::Params("new_msg".into())),
            }]
        );
    }

    #[test]
    fn parses_arithmetic_with_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn comparison_binds_tighter_than_logic() {
        let expr = parse_expression("a > 1 && b < 2").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinOp::And, .. }));
    }

    #[test]
    fn parses_if_with_emit_body() {
        let stmts = parse_body("state.n = state.n + 1; if (state.n > 2) { emit Overflow(\"2\") }")
            .unwrap();
        assert_eq!(stmts.len(), 2);
        match &stmts[1] {
            Stmt::If { body, .. } => {
                assert_eq!(
                    body,
                    &vec![Stmt::Emit {
                        event: "Overflow".into(),
                        args: vec![Expr::Literal("2".into())],
                    }]
                );
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn nested_if_blocks_parse() {
        let stmts = parse_body("if (a) { if (b) { state.x = 1; state.y = 2 } }").unwrap();
        match &stmts[0] {
            Stmt::If { body, .. } => match &body[0] {
                Stmt::If { body: inner, .. } => assert_eq!(inner.len(), 2),
                other => panic!("expected nested if, got {:?}", other),
            },
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn semicolons_inside_strings_do_not_split() {
        let stmts = parse_body("state.note = \"a; b\"; state.flag = true").unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn assignment_target_must_be_variable() {
        let err = parse_body("1 = 2").unwrap_err();
        assert!(err.to_string().contains("assignment target"));
    }

    #[test]
    fn return_expressions_reject_assignment() {
        assert!(parse_expression("state.x = 1").is_err());
        assert!(parse_expression("state.x").is_ok());
    }

    #[test]
    fn unary_operators_nest() {
        let expr = parse_expression("!!done").unwrap();
        assert!(matches!(expr, Expr::Unary { op: UnOp::Not, .. }));
        let expr = parse_expression("-(1 + 2)").unwrap();
        assert!(matches!(expr, Expr::Unary { op: UnOp::Neg, .. }));
    }

    #[test]
    fn unknown_namespace_is_rejected() {
        let err = parse_expression("storage.x").unwrap_err();
        assert!(err.to_string().contains("unknown namespace"));
    }

    #[test]
    fn missing_brace_is_reported() {
        assert!(parse_body("if (a) { state.x = 1").is_err());
    }

    #[test]
    fn empty_statements_are_skipped() {
        let stmts = parse_body("; ; state.x = 1; ;").unwrap();
        assert_eq!(stmts.len(), 1);
    }
}
