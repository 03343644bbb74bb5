//! Filter registry and the built-in filters.
//!
//! A filter is any `Fn(&Value, &[Value]) -> Result<Value, FilterError>`. The
//! first parameter is the piped value, the slice holds the call arguments:
//!
//! ```text
//! {{ title | upper }}              upper(title, [])
//! {{ tags | join(" / ") }}         join(tags, [" / "])
//! {{ length(items) }}              length(items, [])
//! ```
//!
//! Registries are plain values. Each [`Environment`](crate::Environment)
//! owns one, and [`Template::compile_with`](crate::Template::compile_with)
//! takes one explicitly, so there is no process-wide filter table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::FilterError;
use crate::value::{escape_html, Num, ValueExt};

/// A filter function.
pub type Filter = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, FilterError> + Send + Sync>;

/// Upper bound on the number of items `range` produces.
pub const MAX_RANGE: usize = 100_000;

static BUILTINS: Lazy<FilterRegistry> = Lazy::new(|| {
    let mut registry = FilterRegistry::new();
    register_builtins(&mut registry);
    registry
});

/// Named filters available to expressions.
#[derive(Clone)]
pub struct FilterRegistry {
    filters: HashMap<String, Filter>,
}

impl FilterRegistry {
    /// An empty registry, without even the built-ins.
    pub fn new() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// A registry holding every built-in filter.
    pub fn with_builtins() -> Self {
        BUILTINS.clone()
    }

    /// Adds or replaces a filter.
    pub fn register<F>(&mut self, name: impl Into<String>, filter: F) -> &mut Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, FilterError> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

/// Registers all built-in filters on a registry.
pub fn register_builtins(registry: &mut FilterRegistry) {
    // Escaping. The compiler recognises `safe`, `escape` and `e` as the last
    // filter of an output expression and skips its own escaping.
    registry.register("escape", |v, _| Ok(Value::String(escape_html(&v.to_display()))));
    registry.register("e", |v, _| Ok(Value::String(escape_html(&v.to_display()))));
    registry.register("safe", |v, _| Ok(v.clone()));

    // Case.
    registry.register("upper", |v, _| Ok(Value::String(v.to_display().to_uppercase())));
    registry.register("lower", |v, _| Ok(Value::String(v.to_display().to_lowercase())));
    registry.register("title", |v, _| Ok(Value::String(title_case(&v.to_display()))));
    registry.register("capitalize", |v, _| {
        Ok(Value::String(capitalize(&v.to_display())))
    });

    // Whitespace, optionally a custom character set: `{{ s | strip("-") }}`.
    registry.register("strip", strip);
    registry.register("trim", strip);

    // Collections.
    registry.register("length", length);
    registry.register("count", length);
    registry.register("first", |v, _| match v {
        Value::Array(items) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(s
            .chars()
            .next()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        other => Err(expected("first", "a list or string", other)),
    });
    registry.register("last", |v, _| match v {
        Value::Array(items) => Ok(items.last().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(s
            .chars()
            .last()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        other => Err(expected("last", "a list or string", other)),
    });
    registry.register("join", |v, args| {
        let sep = args.first().map(ValueExt::to_display);
        let sep = sep.as_deref().unwrap_or(", ");
        match v {
            Value::Array(items) => Ok(Value::String(
                items
                    .iter()
                    .map(ValueExt::to_display)
                    .collect::<Vec<_>>()
                    .join(sep),
            )),
            other => Err(expected("join", "a list", other)),
        }
    });
    registry.register("reverse", |v, _| match v {
        Value::Array(items) => Ok(Value::Array(items.iter().rev().cloned().collect())),
        Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
        other => Err(expected("reverse", "a list or string", other)),
    });
    registry.register("list", |v, _| match v {
        Value::Array(_) => Ok(v.clone()),
        Value::String(s) => Ok(Value::Array(
            s.chars().map(|c| Value::String(c.to_string())).collect(),
        )),
        Value::Object(map) => Ok(Value::Array(
            map.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        other => Err(expected("list", "a list, string or dict", other)),
    });
    registry.register("range", range);

    // Fallback for falsy values: `{{ name | default("anonymous") }}`.
    registry.register("default", |v, args| {
        if v.is_truthy() {
            Ok(v.clone())
        } else {
            Ok(args
                .first()
                .cloned()
                .unwrap_or_else(|| Value::String(String::new())))
        }
    });

    // Conversions.
    registry.register("int", to_int);
    registry.register("float", to_float);
    registry.register("str", |v, _| Ok(Value::String(v.to_display())));
    registry.register("string", |v, _| Ok(Value::String(v.to_display())));
    registry.register("bool", |v, _| Ok(Value::Bool(v.is_truthy())));
    registry.register("json", to_json);
    registry.register("tojson", to_json);

    registry.register("replace", |v, args| match args {
        [from, to, ..] => Ok(Value::String(
            v.to_display()
                .replace(&from.to_display(), &to.to_display()),
        )),
        _ => Err(FilterError::new("replace expects two arguments")),
    });
}

fn expected(filter: &str, what: &str, found: &Value) -> FilterError {
    FilterError::new(format!(
        "{filter} expects {what}, got {}",
        found.type_name()
    ))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(ch);
            word_start = !ch.is_numeric();
        }
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn strip(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let text = value.to_display();
    let stripped = match args.first() {
        Some(chars) => {
            let chars: Vec<char> = chars.to_display().chars().collect();
            text.trim_matches(chars.as_slice()).to_string()
        }
        None => text.trim().to_string(),
    };
    Ok(Value::String(stripped))
}

fn length(value: &Value, _: &[Value]) -> Result<Value, FilterError> {
    let len = match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => return Err(expected("length", "a string, list or dict", other)),
    };
    Ok(Value::from(len))
}

fn to_int(value: &Value, _: &[Value]) -> Result<Value, FilterError> {
    match value {
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        Value::Number(_) => match Num::of(value) {
            Some(Num::Int(i)) => Ok(Value::from(i)),
            Some(Num::Float(f)) if f.is_finite() => Ok(Value::from(f.trunc() as i64)),
            _ => Err(FilterError::new("int cannot convert a non-finite number")),
        },
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::from)
                .map_err(|_| FilterError::new(format!("invalid literal for int: {s:?}")))
        }
        other => Err(expected("int", "a number, string or bool", other)),
    }
}

fn to_float(value: &Value, _: &[Value]) -> Result<Value, FilterError> {
    let f = match value {
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(_) => Num::of(value).map(Num::as_f64).unwrap_or(f64::NAN),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FilterError::new(format!("could not convert string to float: {s:?}")))?,
        other => return Err(expected("float", "a number, string or bool", other)),
    };
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| FilterError::new(format!("float cannot represent {f}")))
}

fn to_json(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let pretty = args.first().is_some_and(ValueExt::is_truthy);
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    text.map(Value::String)
        .map_err(|e| FilterError::new(e.to_string()))
}

/// `range(stop)`, `range(start, stop)`, `range(start, stop, step)`.
fn range(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let int = |v: &Value| match Num::of(v) {
        Some(Num::Int(i)) => Ok(i),
        _ => Err(expected("range", "integer arguments", v)),
    };
    let (start, stop, step) = match args {
        [] => (0, int(value)?, 1),
        [stop] => (int(value)?, int(stop)?, 1),
        [stop, step, ..] => (int(value)?, int(stop)?, int(step)?),
    };
    if step == 0 {
        return Err(FilterError::new("range step must not be zero"));
    }

    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        if items.len() >= MAX_RANGE {
            return Err(FilterError::new(format!(
                "range exceeds the limit of {MAX_RANGE} items"
            )));
        }
        items.push(Value::from(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::Array(items))
}
