//! Error types for lexing and parsing.
//!
//! Every error carries the 1-indexed line and column it refers to. For
//! unterminated regions that is the position of the *opening* delimiter,
//! since the end of input says nothing useful about where the mistake is.

use thiserror::Error;

/// Errors produced while turning source text into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// A delimiter was opened but never closed before end of input.
    #[error("unterminated {delimiter} opened at line {line}, column {column} (expected `{expected}`)")]
    Unterminated {
        delimiter: &'static str,
        expected: &'static str,
        line: usize,
        column: usize,
    },

    /// A character that is not valid in the current region.
    #[error("unexpected character {ch:?} in {region} at line {line}, column {column}")]
    UnexpectedCharacter {
        ch: char,
        region: &'static str,
        line: usize,
        column: usize,
    },
}

/// Structural errors found while building the AST.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// A closing tag does not match the element it closes.
    #[error(
        "mismatched closing tag: expected </{expected}> for <{expected}> opened at line {open_line}, found </{found}> at line {line}"
    )]
    MismatchedTag {
        expected: String,
        found: String,
        open_line: usize,
        line: usize,
    },

    /// An element was still open at end of input.
    #[error("element <{tag}> opened at line {line} is never closed")]
    UnclosedElement { tag: String, line: usize },

    /// A closing tag with no open element.
    #[error("unexpected closing tag </{tag}> at line {line}")]
    UnexpectedClosingTag { tag: String, line: usize },

    /// A control block was still open at end of input.
    #[error("{{% {keyword} %}} opened at line {line} is never closed (expected {{% {expected} %}})")]
    UnclosedBlock {
        keyword: String,
        expected: String,
        line: usize,
    },

    /// A statement appeared where it cannot, such as `endfor` inside an `if`.
    #[error("unexpected {{% {keyword} %}} at line {line}")]
    UnexpectedStatement { keyword: String, line: usize },

    /// A known statement whose arguments are missing or malformed.
    #[error("malformed {{% {keyword} %}} at line {line}: {reason}")]
    MalformedStatement {
        keyword: String,
        reason: String,
        line: usize,
    },

    /// An unrecognised statement keyword in strict mode.
    #[error("unknown statement `{statement}` at line {line}")]
    UnknownStatement { statement: String, line: usize },

    /// A token that does not fit the grammar at this point.
    #[error("unexpected {found} at line {line}, column {column}")]
    UnexpectedToken {
        found: String,
        line: usize,
        column: usize,
    },
}

/// Any failure from [`parse`](crate::parse).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

impl ParseError {
    /// The line the error points at.
    pub fn line(&self) -> usize {
        match self {
            ParseError::Lex(LexError::Unterminated { line, .. })
            | ParseError::Lex(LexError::UnexpectedCharacter { line, .. }) => *line,
            ParseError::Syntax(err) => match err {
                SyntaxError::MismatchedTag { line, .. }
                | SyntaxError::UnclosedElement { line, .. }
                | SyntaxError::UnexpectedClosingTag { line, .. }
                | SyntaxError::UnclosedBlock { line, .. }
                | SyntaxError::UnexpectedStatement { line, .. }
                | SyntaxError::MalformedStatement { line, .. }
                | SyntaxError::UnknownStatement { line, .. }
                | SyntaxError::UnexpectedToken { line, .. } => *line,
            },
        }
    }
}

/// Result type for syntax operations.
pub type Result<T> = std::result::Result<T, ParseError>;
