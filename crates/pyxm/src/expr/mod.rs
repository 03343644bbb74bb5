//! The template expression language.
//!
//! Expressions appear in `{{ }}` output, `:attr` bindings, `if`/`elif`
//! conditions, `for` headers and setup assignments. They evaluate against
//! JSON-shaped data.
//!
//! # Syntax
//!
//! ```text
//! 42  1.5  "text"  'text'  true  false  none     literals (True/False/None/null too)
//! [a, b]  {"k": v}                               list and dict literals
//! user.name  items[0]  items[-1]                 attribute and index access
//! f(x, y)  x.f(y)                                call filter `f` on x with args
//! -x  not x                                      unary
//! *  /  //  %                                    multiplicative (`/` yields a float)
//! +  -  ~                                        additive (`~` joins as strings)
//! ==  !=  <  <=  >  >=  in  not in               comparison
//! and  or                                        short-circuit, yield an operand
//! a if cond else b                               conditional
//! expr | filter | filter(arg)                    filter chain (lowest precedence)
//! ```
//!
//! `range(n)`, `range(a, b)` and `range(a, b, step)` are available as
//! functions.
//!
//! # Example
//!
//! ```rust
//! use pyxm::expr::{parse_expr, Evaluator};
//! use pyxm::{FilterRegistry, UndefinedBehavior};
//! use serde_json::{json, Map};
//!
//! let expr = parse_expr("user.name ~ '!' | upper").unwrap();
//! let mut vars = Map::new();
//! vars.insert("user".into(), json!({"name": "ada"}));
//!
//! let filters = FilterRegistry::default();
//! let eval = Evaluator::new(&[], &vars, &filters, UndefinedBehavior::Strict);
//! // The filter applies to the whole concatenation.
//! assert_eq!(eval.eval(&expr).unwrap(), json!("ADA!"));
//! ```

mod eval;
mod lexer;
mod parser;

use std::fmt;

use serde_json::Value;

pub use eval::Evaluator;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    And,
    Or,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    /// `name(args)`: a builtin function or a filter applied to the first
    /// argument.
    Call {
        func: String,
        args: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `expr | name(args)` and `expr.name(args)`.
    Filter {
        expr: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Name of the outermost filter, if the expression ends in one.
    pub fn terminal_filter(&self) -> Option<&str> {
        match self {
            Expr::Filter { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// `for` loop header: one or two targets and the iterable.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopTarget {
    pub targets: Vec<String>,
    pub iterable: Expr,
}

/// Expression syntax error with the char offset it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprError {
    pub message: String,
    pub offset: usize,
}

impl ExprError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.offset)
    }
}

impl std::error::Error for ExprError {}

/// Parses a full expression, filter chain included.
pub fn parse_expr(source: &str) -> Result<Expr, ExprError> {
    parser::ExprParser::new(source)?.parse_complete()
}

/// Parses a `for` header such as `item in items` or `k, v in pairs`.
pub fn parse_loop(source: &str) -> Result<LoopTarget, ExprError> {
    parser::ExprParser::new(source)?.parse_loop()
}

/// Parses a setup assignment such as `total = price * qty`.
pub fn parse_assignment(source: &str) -> Result<(String, Expr), ExprError> {
    parser::ExprParser::new(source)?.parse_assignment()
}
