//! Tokens produced by the [`Lexer`](crate::lexer::Lexer).

use std::fmt;

/// The kind of a [`Token`].
///
/// Delimited regions (`{{ }}`, `{% %}`, `{# #}`, `<setup>`) always produce an
/// open/content/close triple, even when the content is empty, so the parser
/// can rely on the shape of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Literal text between markup and template regions.
    Text,
    /// `<` starting an element.
    TagOpen,
    /// `</` starting a closing tag.
    TagEndOpen,
    /// Element name in an opening or closing tag.
    TagName,
    /// `>` ending a tag.
    TagClose,
    /// `/>` ending a self-closing tag.
    TagSelfClose,
    /// Plain attribute name.
    AttrName,
    /// `=` between an attribute name and its value.
    AttrEquals,
    /// Attribute value with surrounding quotes removed.
    AttrValue,
    /// `@name`, an event binding. The text holds the name without `@`.
    EventBind,
    /// `:name`, a dynamic attribute. The text holds the name without `:`.
    AttrBind,
    /// `#name`, an element reference. The text holds the name without `#`.
    RefBind,
    ExprOpen,
    ExprContent,
    ExprClose,
    StmtOpen,
    StmtContent,
    StmtClose,
    CommentOpen,
    CommentContent,
    CommentClose,
    SetupOpen,
    SetupContent,
    SetupClose,
    /// Verbatim body of a `{% raw %}` block.
    RawContent,
    /// End of input. Always the last token.
    Eof,
}

impl TokenKind {
    /// Human-readable description used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Text => "text",
            TokenKind::TagOpen => "`<`",
            TokenKind::TagEndOpen => "`</`",
            TokenKind::TagName => "tag name",
            TokenKind::TagClose => "`>`",
            TokenKind::TagSelfClose => "`/>`",
            TokenKind::AttrName => "attribute name",
            TokenKind::AttrEquals => "`=`",
            TokenKind::AttrValue => "attribute value",
            TokenKind::EventBind => "event binding",
            TokenKind::AttrBind => "attribute binding",
            TokenKind::RefBind => "element reference",
            TokenKind::ExprOpen => "`{{`",
            TokenKind::ExprContent => "expression",
            TokenKind::ExprClose => "`}}`",
            TokenKind::StmtOpen => "`{%`",
            TokenKind::StmtContent => "statement",
            TokenKind::StmtClose => "`%}`",
            TokenKind::CommentOpen => "`{#`",
            TokenKind::CommentContent => "comment",
            TokenKind::CommentClose => "`#}`",
            TokenKind::SetupOpen => "`<setup>`",
            TokenKind::SetupContent => "setup code",
            TokenKind::SetupClose => "`</setup>`",
            TokenKind::RawContent => "raw content",
            TokenKind::Eof => "end of input",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A single lexical unit with its 1-indexed source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}
