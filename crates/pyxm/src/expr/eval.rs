//! Expression evaluator.
//!
//! Evaluates an [`Expr`] against a stack of variable scopes plus a base
//! variable map. Values are [`serde_json::Value`]; conversion to output text
//! happens later, in the compiled template.

use serde_json::{Map, Value};

use super::{BinaryOp, Expr, UnaryOp};
use crate::config::UndefinedBehavior;
use crate::error::RenderError;
use crate::filters::FilterRegistry;
use crate::value::{compare_values, contains, float_value, values_equal, Num, ValueExt};

/// Arithmetic subset of [`BinaryOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl Arith {
    fn from_op(op: BinaryOp) -> Option<Self> {
        Some(match op {
            BinaryOp::Add => Arith::Add,
            BinaryOp::Sub => Arith::Sub,
            BinaryOp::Mul => Arith::Mul,
            BinaryOp::Div => Arith::Div,
            BinaryOp::FloorDiv => Arith::FloorDiv,
            BinaryOp::Mod => Arith::Mod,
            _ => return None,
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "`+`",
            Arith::Sub => "`-`",
            Arith::Mul => "`*`",
            Arith::Div => "`/`",
            Arith::FloorDiv => "`//`",
            Arith::Mod => "`%`",
        }
    }
}

/// Evaluates expressions against borrowed variables.
///
/// Names resolve innermost scope first, then `globals`. Missing names and
/// attributes follow the [`UndefinedBehavior`].
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    scopes: &'a [Map<String, Value>],
    globals: &'a Map<String, Value>,
    filters: &'a FilterRegistry,
    undefined: UndefinedBehavior,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        scopes: &'a [Map<String, Value>],
        globals: &'a Map<String, Value>,
        filters: &'a FilterRegistry,
        undefined: UndefinedBehavior,
    ) -> Self {
        Self {
            scopes,
            globals,
            filters,
            undefined,
        }
    }

    fn lenient(&self) -> Self {
        Self {
            undefined: UndefinedBehavior::Lenient,
            ..*self
        }
    }

    fn is_strict(&self) -> bool {
        self.undefined == UndefinedBehavior::Strict
    }

    /// Looks a name up without applying the undefined policy.
    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, RenderError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Dict(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(self.eval(key)?.to_display(), self.eval(value)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Name(name) => match self.lookup(name) {
                Some(value) => Ok(value.clone()),
                None if self.is_strict() => {
                    Err(RenderError::UndefinedVariable { name: name.clone() })
                }
                None => Ok(Value::Null),
            },
            Expr::Attr(base, attribute) => {
                let base = self.eval(base)?;
                self.attribute(&base, attribute)
            }
            Expr::Index(base, index) => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                self.index(&base, &index)
            }
            Expr::Call { func, args } => {
                let mut args = self.eval_all(args)?;
                let value = if args.is_empty() {
                    Value::Null
                } else {
                    args.remove(0)
                };
                self.apply_filter(func, &value, &args)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match Num::of(&value) {
                        Some(Num::Int(i)) => i.checked_neg().map(Value::from).ok_or_else(|| {
                            RenderError::Arithmetic(format!("cannot negate {i}"))
                        }),
                        Some(Num::Float(f)) => float_value(-f),
                        None => Err(RenderError::TypeMismatch {
                            context: "negation",
                            expected: "number",
                            found: value.type_name().to_string(),
                        }),
                    },
                }
            }
            Expr::Binary(op, left, right) => self.binary(*op, left, right),
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Filter { expr, name, args } => {
                // `default` exists to paper over missing values, so its
                // operand never fails on an undefined name.
                let value = if name == "default" {
                    self.lenient().eval(expr)?
                } else {
                    self.eval(expr)?
                };
                let args = self.eval_all(args)?;
                self.apply_filter(name, &value, &args)
            }
        }
    }

    fn eval_all(&self, exprs: &[Expr]) -> Result<Vec<Value>, RenderError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    /// Applies a registered filter by name.
    pub fn apply_filter(
        &self,
        name: &str,
        value: &Value,
        args: &[Value],
    ) -> Result<Value, RenderError> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| RenderError::UnknownFilter {
                name: name.to_string(),
            })?;
        filter(value, args).map_err(|err| RenderError::Filter {
            name: name.to_string(),
            message: err.0,
        })
    }

    fn missing_attribute(&self, base: &Value, attribute: &str) -> Result<Value, RenderError> {
        if self.is_strict() {
            Err(RenderError::UndefinedAttribute {
                attribute: attribute.to_string(),
                type_name: base.type_name(),
            })
        } else {
            Ok(Value::Null)
        }
    }

    fn attribute(&self, base: &Value, attribute: &str) -> Result<Value, RenderError> {
        let found = match base {
            Value::Object(map) => map.get(attribute),
            Value::Array(items) => attribute.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match found {
            Some(value) => Ok(value.clone()),
            None => self.missing_attribute(base, attribute),
        }
    }

    fn index(&self, base: &Value, index: &Value) -> Result<Value, RenderError> {
        match base {
            Value::Object(map) => {
                let key = index.to_display();
                match map.get(&key) {
                    Some(value) => Ok(value.clone()),
                    None => self.missing_attribute(base, &key),
                }
            }
            Value::Array(items) => {
                let i = self.integer_index(index)?;
                match resolve_index(i, items.len()) {
                    Some(pos) => Ok(items[pos].clone()),
                    None => self.out_of_range(i, items.len(), "list"),
                }
            }
            Value::String(s) => {
                let i = self.integer_index(index)?;
                let len = s.chars().count();
                match resolve_index(i, len).and_then(|pos| s.chars().nth(pos)) {
                    Some(ch) => Ok(Value::String(ch.to_string())),
                    None => self.out_of_range(i, len, "string"),
                }
            }
            Value::Null if !self.is_strict() => Ok(Value::Null),
            other => Err(RenderError::TypeMismatch {
                context: "index access",
                expected: "list, string or dict",
                found: other.type_name().to_string(),
            }),
        }
    }

    fn integer_index(&self, index: &Value) -> Result<i64, RenderError> {
        match Num::of(index) {
            Some(Num::Int(i)) => Ok(i),
            _ => Err(RenderError::TypeMismatch {
                context: "index access",
                expected: "int",
                found: index.type_name().to_string(),
            }),
        }
    }

    fn out_of_range(
        &self,
        index: i64,
        len: usize,
        type_name: &'static str,
    ) -> Result<Value, RenderError> {
        if self.is_strict() {
            Err(RenderError::IndexOutOfRange {
                index,
                len,
                type_name,
            })
        } else {
            Ok(Value::Null)
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, RenderError> {
        match op {
            BinaryOp::And => {
                let left = self.eval(left)?;
                return if left.is_truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                };
            }
            BinaryOp::Or => {
                let left = self.eval(left)?;
                return if left.is_truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                };
            }
            _ => {}
        }

        let left = self.eval(left)?;
        let right = self.eval(right)?;

        if let Some(arith) = Arith::from_op(op) {
            return arithmetic(arith, &left, &right);
        }

        let ordering = |test: fn(std::cmp::Ordering) -> bool| {
            compare_values(&left, &right)
                .map(|o| Value::Bool(test(o)))
                .ok_or_else(|| RenderError::TypeMismatch {
                    context: "comparison",
                    expected: "two comparable values",
                    found: format!("{} and {}", left.type_name(), right.type_name()),
                })
        };

        match op {
            BinaryOp::Concat => Ok(Value::String(format!(
                "{}{}",
                left.to_display(),
                right.to_display()
            ))),
            BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
            BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
            BinaryOp::Lt => ordering(|o| o.is_lt()),
            BinaryOp::Le => ordering(|o| o.is_le()),
            BinaryOp::Gt => ordering(|o| o.is_gt()),
            BinaryOp::Ge => ordering(|o| o.is_ge()),
            BinaryOp::In => contains(&right, &left).map(Value::Bool),
            BinaryOp::NotIn => contains(&right, &left).map(|c| Value::Bool(!c)),
            // Arithmetic and the short-circuit operators returned above.
            _ => Ok(Value::Null),
        }
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 {
        len as i64 + index
    } else {
        index
    };
    (0..len as i64)
        .contains(&resolved)
        .then_some(resolved as usize)
}

fn arithmetic(op: Arith, left: &Value, right: &Value) -> Result<Value, RenderError> {
    if let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) {
        return match (a, b) {
            (Num::Int(x), Num::Int(y)) => int_arithmetic(op, x, y),
            _ => float_arithmetic(op, a.as_f64(), b.as_f64()),
        };
    }

    match (op, left, right) {
        (Arith::Add, Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Arith::Add, Value::Array(a), Value::Array(b)) => {
            Ok(Value::Array(a.iter().chain(b).cloned().collect()))
        }
        (Arith::Mul, Value::String(s), n) | (Arith::Mul, n, Value::String(s))
            if repeat_count(n).is_some() =>
        {
            let count = repeat_count(n).unwrap_or(0);
            check_repeat(s.len(), count)?;
            Ok(Value::String(s.repeat(count)))
        }
        (Arith::Mul, Value::Array(items), n) | (Arith::Mul, n, Value::Array(items))
            if repeat_count(n).is_some() =>
        {
            let count = repeat_count(n).unwrap_or(0);
            check_repeat(items.len(), count)?;
            Ok(Value::Array(
                std::iter::repeat(items.iter().cloned())
                    .take(count)
                    .flatten()
                    .collect(),
            ))
        }
        _ => Err(RenderError::TypeMismatch {
            context: op.symbol(),
            expected: "numbers",
            found: format!("{} and {}", left.type_name(), right.type_name()),
        }),
    }
}

fn repeat_count(value: &Value) -> Option<usize> {
    match Num::of(value)? {
        Num::Int(i) => Some(i.max(0) as usize),
        Num::Float(_) => None,
    }
}

/// Largest string (in bytes) or list that `*` repetition may build.
pub const MAX_REPEAT_LEN: usize = 1_000_000;

fn check_repeat(len: usize, count: usize) -> Result<(), RenderError> {
    match len.checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(()),
        _ => Err(RenderError::Arithmetic(format!(
            "repetition of {len} items by {count} exceeds the limit of {MAX_REPEAT_LEN}"
        ))),
    }
}

fn int_arithmetic(op: Arith, x: i64, y: i64) -> Result<Value, RenderError> {
    let overflow = || RenderError::Arithmetic(format!("integer overflow in {x} {} {y}", op.symbol()));
    if y == 0 && matches!(op, Arith::Div | Arith::FloorDiv | Arith::Mod) {
        return Err(RenderError::Arithmetic("division by zero".into()));
    }
    match op {
        Arith::Add => x.checked_add(y).map(Value::from).ok_or_else(overflow),
        Arith::Sub => x.checked_sub(y).map(Value::from).ok_or_else(overflow),
        Arith::Mul => x.checked_mul(y).map(Value::from).ok_or_else(overflow),
        Arith::Div => float_value(x as f64 / y as f64),
        Arith::FloorDiv => {
            let q = x.checked_div(y).ok_or_else(overflow)?;
            let floored = if x % y != 0 && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            };
            Ok(Value::from(floored))
        }
        Arith::Mod => {
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            let adjusted = if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r };
            Ok(Value::from(adjusted))
        }
    }
}

fn float_arithmetic(op: Arith, x: f64, y: f64) -> Result<Value, RenderError> {
    if y == 0.0 && matches!(op, Arith::Div | Arith::FloorDiv | Arith::Mod) {
        return Err(RenderError::Arithmetic("division by zero".into()));
    }
    float_value(match op {
        Arith::Add => x + y,
        Arith::Sub => x - y,
        Arith::Mul => x * y,
        Arith::Div => x / y,
        Arith::FloorDiv => (x / y).floor(),
        Arith::Mod => x - y * (x / y).floor(),
    })
}
