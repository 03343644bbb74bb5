//! Error types for compiling and rendering templates.
//!
//! Errors are layered the same way the pipeline is:
//!
//! - [`ParseError`] from `pyxm-syntax` covers lexing and parsing
//! - [`CompileError`] covers turning the AST into a render routine
//! - [`RenderError`] covers running that routine against a context
//!
//! The [`Template`](crate::Template) wrapper folds these into
//! [`TemplateError`]: every compile-time failure becomes
//! [`TemplateError::Syntax`] and every render-time failure becomes
//! [`TemplateError::Render`], both carrying the template name.

use pyxm_syntax::ParseError;
use thiserror::Error;

use crate::loader::LoaderError;

/// Failure while compiling an AST into a render routine.
#[derive(Debug, Error)]
pub enum CompileError {
    /// An expression, condition or loop header could not be parsed.
    #[error("invalid expression `{source_text}` at line {line}, column {column}: {reason}")]
    InvalidExpression {
        source_text: String,
        reason: String,
        line: usize,
        column: usize,
    },

    /// A node that cannot be compiled where it appears.
    #[error("malformed {kind} node at line {line}, column {column}: {reason}")]
    MalformedNode {
        kind: &'static str,
        reason: String,
        line: usize,
        column: usize,
    },

    /// A setup block line that is not an assignment, import or comment.
    #[error("invalid setup statement at line {line}: {reason}")]
    InvalidSetup { line: usize, reason: String },

    /// The AST could not be serialized for hashing.
    #[error("failed to hash template: {0}")]
    Hash(#[from] serde_json::Error),
}

/// Failure returned by a filter function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FilterError(pub String);

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure while executing a compiled template.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("undefined variable `{name}`")]
    UndefinedVariable { name: String },

    #[error("{type_name} value has no attribute `{attribute}`")]
    UndefinedAttribute {
        attribute: String,
        type_name: &'static str,
    },

    #[error("unknown filter `{name}`")]
    UnknownFilter { name: String },

    #[error("filter `{name}` failed: {message}")]
    Filter { name: String, message: String },

    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("{type_name} value is not iterable")]
    NotIterable { type_name: &'static str },

    #[error("index {index} out of range for {type_name} of length {len}")]
    IndexOutOfRange {
        index: i64,
        len: usize,
        type_name: &'static str,
    },

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// A nested component failed. The component's own error is the source.
    #[error("component `{name}` failed: {source}")]
    Component {
        name: String,
        source: Box<TemplateError>,
    },
}

/// Any failure while building a template from source.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Error type for the template wrapper and environment.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Lexing, parsing or compiling failed. Never cached.
    #[error("syntax error in {name}: {source}")]
    Syntax { name: String, source: BuildError },

    /// Rendering failed. The compiled template stays cached.
    #[error("render error in {name}: {source}")]
    Render { name: String, source: RenderError },

    /// Template lookup or file reading failed.
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

impl TemplateError {
    pub(crate) fn syntax(name: &str, source: impl Into<BuildError>) -> Self {
        TemplateError::Syntax {
            name: name.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn render(name: &str, source: RenderError) -> Self {
        TemplateError::Render {
            name: name.to_string(),
            source,
        }
    }

    /// Name of the template the error belongs to, if any.
    pub fn template_name(&self) -> Option<&str> {
        match self {
            TemplateError::Syntax { name, .. } | TemplateError::Render { name, .. } => Some(name),
            TemplateError::Loader(_) => None,
        }
    }
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;
