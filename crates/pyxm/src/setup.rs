//! `<setup>` blocks.
//!
//! A setup block defines names for the rest of the template. Each logical
//! line is one of:
//!
//! ```text
//! total = price * quantity      assignment, evaluated at render time
//! # a comment                   ignored
//! import json                   recorded as an import, otherwise ignored
//! from app import helpers       likewise
//! ```
//!
//! A line whose brackets are still open continues on the next line, so list
//! and dict literals may span several lines. Anything else is rejected at
//! compile time; setup blocks never run arbitrary code.

use pyxm_syntax::is_import_line;

use crate::error::CompileError;
use crate::expr::{parse_assignment, Expr};

/// One `name = expr` line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assignment {
    pub name: String,
    pub value: Expr,
    pub line: usize,
}

/// Parses the body of a setup block that starts on `first_line`.
pub(crate) fn parse_setup(content: &str, first_line: usize) -> Result<Vec<Assignment>, CompileError> {
    let mut assignments = Vec::new();
    let mut pending = String::new();
    let mut pending_line = first_line;
    let mut depth: i32 = 0;

    for (offset, raw) in content.lines().enumerate() {
        let line_no = first_line + offset;
        let line = strip_comment(raw).trim();
        if pending.is_empty() {
            if line.is_empty() {
                continue;
            }
            if is_import_line(line) {
                continue;
            }
            pending_line = line_no;
        } else {
            pending.push(' ');
        }
        pending.push_str(line);
        depth += bracket_delta(line);

        if depth <= 0 {
            assignments.push(parse_line(&pending, pending_line)?);
            pending.clear();
            depth = 0;
        }
    }

    if !pending.is_empty() {
        return Err(CompileError::InvalidSetup {
            line: pending_line,
            reason: "unclosed bracket".to_string(),
        });
    }
    Ok(assignments)
}

fn parse_line(text: &str, line: usize) -> Result<Assignment, CompileError> {
    parse_assignment(text)
        .map(|(name, value)| Assignment { name, value, line })
        .map_err(|err| CompileError::InvalidSetup {
            line,
            reason: format!("expected `name = expression` in `{text}`: {}", err.message),
        })
}

/// Drops a trailing `# comment` that is outside string literals.
fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    let mut escaped = false;
    for (i, ch) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '#' => return &line[..i],
                _ => {}
            },
        }
    }
    line
}

/// Open brackets minus closed brackets, ignoring string literals.
fn bracket_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut quote = None;
    let mut escaped = false;
    for ch in line.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '(' | '[' | '{' => delta += 1,
                ')' | ']' | '}' => delta -= 1,
                _ => {}
            },
        }
    }
    delta
}
