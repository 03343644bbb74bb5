//! Precedence-climbing parser for template expressions.

use serde_json::Value;

use super::lexer::{lex, Spanned, Tok};
use super::{BinaryOp, Expr, ExprError, LoopTarget, UnaryOp};

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "if", "else", "true", "false", "none", "True", "False", "None",
    "null",
];

pub(crate) struct ExprParser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl ExprParser {
    pub(crate) fn new(source: &str) -> Result<Self, ExprError> {
        Ok(Self {
            tokens: lex(source)?,
            pos: 0,
        })
    }

    pub(crate) fn parse_complete(mut self) -> Result<Expr, ExprError> {
        if self.peek() == &Tok::Eof {
            return Err(self.error("empty expression"));
        }
        let expr = self.parse_filtered()?;
        self.expect_end()?;
        Ok(expr)
    }

    pub(crate) fn parse_loop(mut self) -> Result<LoopTarget, ExprError> {
        let parenthesized = self.eat(&Tok::LParen);
        let mut targets = vec![self.identifier()?];
        while self.eat(&Tok::Comma) {
            targets.push(self.identifier()?);
        }
        if parenthesized {
            self.expect(&Tok::RParen)?;
        }
        if targets.len() > 2 {
            return Err(self.error("a loop unpacks at most two targets"));
        }
        if !self.eat_keyword("in") {
            return Err(self.error("expected `in`"));
        }
        let iterable = self.parse_filtered()?;
        self.expect_end()?;
        Ok(LoopTarget { targets, iterable })
    }

    pub(crate) fn parse_assignment(mut self) -> Result<(String, Expr), ExprError> {
        let name = self.identifier()?;
        self.expect(&Tok::Assign)?;
        let value = self.parse_filtered()?;
        self.expect_end()?;
        Ok((name, value))
    }

    // ---- helpers ----

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].0
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        if tok != Tok::Eof {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Tok::Ident(name) if name == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), ExprError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                tok.describe(),
                self.peek().describe()
            )))
        }
    }

    fn expect_end(&self) -> Result<(), ExprError> {
        match self.peek() {
            Tok::Eof => Ok(()),
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }

    fn identifier(&mut self) -> Result<String, ExprError> {
        match self.peek().clone() {
            Tok::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                self.pos += 1;
                Ok(name)
            }
            other => Err(self.error(format!("expected a name, found {}", other.describe()))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::new(message, self.offset())
    }

    // ---- grammar, lowest precedence first ----

    fn parse_filtered(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_ternary()?;
        while self.eat(&Tok::Pipe) {
            let name = self.identifier()?;
            let args = if self.eat(&Tok::LParen) {
                self.arguments(&Tok::RParen)?
            } else {
                Vec::new()
            };
            expr = Expr::Filter {
                expr: Box::new(expr),
                name,
                args,
            };
        }
        Ok(expr)
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExprError> {
        let then = self.parse_or()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let condition = self.parse_or()?;
        if !self.eat_keyword("else") {
            return Err(self.error("expected `else` in conditional expression"));
        }
        let otherwise = self.parse_ternary()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("and") {
            let right = self.parse_not()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.eat_keyword("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_additive()?;
        loop {
            let (op, width) = match self.peek() {
                Tok::Op("==") => (BinaryOp::Eq, 1),
                Tok::Op("!=") => (BinaryOp::Ne, 1),
                Tok::Op("<") => (BinaryOp::Lt, 1),
                Tok::Op("<=") => (BinaryOp::Le, 1),
                Tok::Op(">") => (BinaryOp::Gt, 1),
                Tok::Op(">=") => (BinaryOp::Ge, 1),
                Tok::Ident(k) if k == "in" => (BinaryOp::In, 1),
                Tok::Ident(k)
                    if k == "not" && matches!(self.peek_at(1), Tok::Ident(n) if n == "in") =>
                {
                    (BinaryOp::NotIn, 2)
                }
                _ => return Ok(left),
            };
            self.pos += width;
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinaryOp::Add,
                Tok::Op("-") => BinaryOp::Sub,
                Tok::Op("~") => BinaryOp::Concat,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinaryOp::Mul,
                Tok::Op("/") => BinaryOp::Div,
                Tok::Op("//") => BinaryOp::FloorDiv,
                Tok::Op("%") => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Tok::Op("-")) {
            let operand = self.parse_unary()?;
            return Ok(match operand {
                Expr::Literal(Value::Number(n)) if n.as_i64().is_some() => {
                    Expr::Literal(Value::from(-n.as_i64().unwrap_or_default()))
                }
                other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
            });
        }
        if self.eat(&Tok::Op("+")) {
            return self.parse_unary();
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Tok::Dot) {
                let name = match self.bump() {
                    Tok::Ident(name) => name,
                    Tok::Int(i) => i.to_string(),
                    other => {
                        return Err(self.error(format!(
                            "expected an attribute name, found {}",
                            other.describe()
                        )))
                    }
                };
                expr = if self.eat(&Tok::LParen) {
                    let args = self.arguments(&Tok::RParen)?;
                    Expr::Filter {
                        expr: Box::new(expr),
                        name,
                        args,
                    }
                } else {
                    Expr::Attr(Box::new(expr), name)
                };
            } else if self.eat(&Tok::LBracket) {
                let index = self.parse_filtered()?;
                self.expect(&Tok::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.peek() == &Tok::LParen {
                let Expr::Name(func) = expr else {
                    return Err(self.error("only named functions can be called"));
                };
                self.pos += 1;
                let args = self.arguments(&Tok::RParen)?;
                expr = Expr::Call { func, args };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let offset = self.offset();
        match self.bump() {
            Tok::Int(i) => Ok(Expr::Literal(Value::from(i))),
            Tok::Float(f) => Ok(Expr::Literal(
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Tok::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Tok::Ident(name) => match name.as_str() {
                "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                "none" | "None" | "null" => Ok(Expr::Literal(Value::Null)),
                kw if KEYWORDS.contains(&kw) => {
                    Err(ExprError::new(format!("unexpected keyword `{kw}`"), offset))
                }
                _ => Ok(Expr::Name(name)),
            },
            Tok::LParen => {
                let inner = self.parse_filtered()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Tok::LBracket => Ok(Expr::List(self.arguments(&Tok::RBracket)?)),
            Tok::LBrace => {
                let mut entries = Vec::new();
                while !self.eat(&Tok::RBrace) {
                    let key = self.parse_ternary()?;
                    self.expect(&Tok::Colon)?;
                    let value = self.parse_filtered()?;
                    entries.push((key, value));
                    if !self.eat(&Tok::Comma) {
                        self.expect(&Tok::RBrace)?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            other => Err(ExprError::new(
                format!("unexpected {}", other.describe()),
                offset,
            )),
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn arguments(&mut self, close: &Tok) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        while !self.eat(close) {
            args.push(self.parse_filtered()?);
            if !self.eat(&Tok::Comma) {
                self.expect(close)?;
                break;
            }
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{parse_assignment, parse_expr, parse_loop};
    use super::*;
    use serde_json::json;

    fn lit(v: Value) -> Box<Expr> {
        Box::new(Expr::Literal(v))
    }

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::Name(n.into()))
    }

    // ==================== Precedence Tests ====================

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse_expr("1 + 2 * 3").unwrap(),
            Expr::Binary(
                BinaryOp::Add,
                lit(json!(1)),
                Box::new(Expr::Binary(BinaryOp::Mul, lit(json!(2)), lit(json!(3))))
            )
        );
    }

    #[test]
    fn filter_is_lowest_precedence() {
        assert_eq!(
            parse_expr("a or b | upper").unwrap(),
            Expr::Filter {
                expr: Box::new(Expr::Binary(BinaryOp::Or, name("a"), name("b"))),
                name: "upper".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn not_in_operator() {
        assert_eq!(
            parse_expr("x not in xs").unwrap(),
            Expr::Binary(BinaryOp::NotIn, name("x"), name("xs"))
        );
    }

    #[test]
    fn not_binds_looser_than_comparison() {
        assert_eq!(
            parse_expr("not a == b").unwrap(),
            Expr::Unary(
                UnaryOp::Not,
                Box::new(Expr::Binary(BinaryOp::Eq, name("a"), name("b")))
            )
        );
    }

    #[test]
    fn ternary() {
        assert_eq!(
            parse_expr("'y' if ok else 'n'").unwrap(),
            Expr::Ternary {
                condition: name("ok"),
                then: lit(json!("y")),
                otherwise: lit(json!("n")),
            }
        );
    }

    #[test]
    fn negative_literal_folds() {
        assert_eq!(parse_expr("-3").unwrap(), Expr::Literal(json!(-3)));
    }

    // ==================== Postfix Tests ====================

    #[test]
    fn attribute_index_and_method() {
        assert_eq!(
            parse_expr("user.tags[0].strip()").unwrap(),
            Expr::Filter {
                expr: Box::new(Expr::Index(
                    Box::new(Expr::Attr(name("user"), "tags".into())),
                    lit(json!(0))
                )),
                name: "strip".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn function_call() {
        assert_eq!(
            parse_expr("range(1, 4)").unwrap(),
            Expr::Call {
                func: "range".into(),
                args: vec![Expr::Literal(json!(1)), Expr::Literal(json!(4))],
            }
        );
    }

    #[test]
    fn filter_with_arguments() {
        assert_eq!(
            parse_expr("xs | join(', ')").unwrap(),
            Expr::Filter {
                expr: name("xs"),
                name: "join".into(),
                args: vec![Expr::Literal(json!(", "))],
            }
        );
    }

    #[test]
    fn collection_literals() {
        assert_eq!(
            parse_expr("[1, 'a',]").unwrap(),
            Expr::List(vec![Expr::Literal(json!(1)), Expr::Literal(json!("a"))])
        );
        assert_eq!(
            parse_expr("{'a': 1}").unwrap(),
            Expr::Dict(vec![(Expr::Literal(json!("a")), Expr::Literal(json!(1)))])
        );
        assert_eq!(parse_expr("{}").unwrap(), Expr::Dict(vec![]));
    }

    // ==================== Statement Form Tests ====================

    #[test]
    fn loop_header() {
        let target = parse_loop("k, v in pairs | list").unwrap();
        assert_eq!(target.targets, vec!["k", "v"]);
        assert!(matches!(target.iterable, Expr::Filter { .. }));
    }

    #[test]
    fn loop_header_requires_in() {
        assert!(parse_loop("item items").is_err());
    }

    #[test]
    fn assignment() {
        let (target, value) = parse_assignment("total = a + b").unwrap();
        assert_eq!(target, "total");
        assert_eq!(value, Expr::Binary(BinaryOp::Add, name("a"), name("b")));
    }

    // ==================== Error Tests ====================

    #[test]
    fn empty_expression() {
        assert!(parse_expr("   ").is_err());
    }

    #[test]
    fn trailing_tokens() {
        let err = parse_expr("a b").unwrap_err();
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn keyword_as_name() {
        assert!(parse_expr("and").is_err());
    }

    #[test]
    fn unbalanced_parenthesis() {
        assert!(parse_expr("(a + b").is_err());
    }
}
