//! Helpers for the JSON value model templates evaluate against.
//!
//! Templates see data as [`serde_json::Value`]. [`ValueExt`] adds the
//! template-specific views of a value: truthiness, display text and a type
//! name for diagnostics.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::error::RenderError;

/// Template semantics on top of [`Value`].
pub trait ValueExt {
    /// `null`, `false`, zero, and empty strings, lists and objects are falsy.
    fn is_truthy(&self) -> bool;

    /// Short type name used in error messages.
    fn type_name(&self) -> &'static str;

    /// Text written to the output for this value.
    ///
    /// `null` renders as the empty string and booleans as `true`/`false`.
    /// Lists and objects render as compact JSON.
    fn to_display(&self) -> String;
}

impl ValueExt for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "none",
            Value::Bool(_) => "bool",
            Value::Number(n) if n.is_f64() => "float",
            Value::Number(_) => "int",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "dict",
        }
    }

    fn to_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => self.to_string(),
        }
    }
}

/// Escapes `&`, `<`, `>`, `"` and `'` for HTML text and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// A number split into its integer or float form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub(crate) fn of(value: &Value) -> Option<Num> {
        let Value::Number(n) = value else {
            return None;
        };
        n.as_i64()
            .map(Num::Int)
            .or_else(|| n.as_f64().map(Num::Float))
    }

    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

/// Converts a float result back into a value, rejecting NaN and infinity.
pub(crate) fn float_value(f: f64) -> Result<Value, RenderError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| RenderError::Arithmetic(format!("result {f} is not a finite number")))
}

/// Equality with `1 == 1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (Num::of(a), Num::of(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
        (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering for numbers, strings, booleans and lists of those.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => match (Num::of(a)?, Num::of(b)?) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            (x, y) => x.as_f64().partial_cmp(&y.as_f64()),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                match compare_values(l, r)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        _ => None,
    }
}

/// Membership test behind `in`: substring, list element or object key.
pub fn contains(container: &Value, item: &Value) -> Result<bool, RenderError> {
    match container {
        Value::String(s) => Ok(s.contains(item.to_display().as_str())),
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Object(map) => Ok(map.contains_key(item.to_display().as_str())),
        other => Err(RenderError::TypeMismatch {
            context: "`in`",
            expected: "string, list or dict",
            found: other.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==================== Truthiness Tests ====================

    #[test]
    fn falsy_values() {
        for v in [
            json!(null),
            json!(false),
            json!(0),
            json!(0.0),
            json!(""),
            json!([]),
            json!({}),
        ] {
            assert!(!v.is_truthy(), "{v} should be falsy");
        }
    }

    #[test]
    fn truthy_values() {
        for v in [json!(true), json!(-1), json!(0.5), json!("0"), json!([0]), json!({"a": null})] {
            assert!(v.is_truthy(), "{v} should be truthy");
        }
    }

    // ==================== Display Tests ====================

    #[test]
    fn display_forms() {
        assert_eq!(json!(null).to_display(), "");
        assert_eq!(json!(true).to_display(), "true");
        assert_eq!(json!(42).to_display(), "42");
        assert_eq!(json!(1.5).to_display(), "1.5");
        assert_eq!(json!("hi").to_display(), "hi");
        assert_eq!(json!([1, "a"]).to_display(), r#"[1,"a"]"#);
    }

    #[test]
    fn type_names() {
        assert_eq!(json!(1).type_name(), "int");
        assert_eq!(json!(1.0).type_name(), "float");
        assert_eq!(json!({}).type_name(), "dict");
    }

    // ==================== Escape Tests ====================

    #[test]
    fn escapes_all_special_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn escape_leaves_plain_text() {
        assert_eq!(escape_html("plain text"), "plain text");
    }

    // ==================== Comparison Tests ====================

    #[test]
    fn int_float_equality() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn ordering() {
        assert_eq!(compare_values(&json!(1), &json!(2.5)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!([1, 2]), &json!([1])), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(1), &json!("a")), None);
    }

    #[test]
    fn membership() {
        assert!(contains(&json!("hello"), &json!("ell")).unwrap());
        assert!(contains(&json!([1, 2]), &json!(2.0)).unwrap());
        assert!(contains(&json!({"k": 1}), &json!("k")).unwrap());
        assert!(contains(&json!(3), &json!(3)).is_err());
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(float_value(f64::NAN).is_err());
        assert_eq!(float_value(2.5).unwrap(), json!(2.5));
    }
}
