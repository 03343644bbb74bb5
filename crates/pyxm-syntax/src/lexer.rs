//! Single-pass lexer for PYXM source text.
//!
//! The lexer walks the source once, left to right, and produces a flat
//! [`Token`] stream terminated by [`TokenKind::Eof`]. It recognises:
//!
//! - `{{ expr }}` output expressions
//! - `{% stmt %}` statements
//! - `{# comment #}` template comments
//! - `<setup> ... </setup>` setup blocks (tag name matched case-insensitively)
//! - element tags with plain attributes and the `@event`, `:attr` and `#ref`
//!   binding prefixes
//! - everything else as text
//!
//! # Nesting
//!
//! Inside `{{ }}` and `{% %}` the lexer tracks bracket depth and string
//! literals, so `{{ {'a': {'b': 1}} }}` or `{{ "}}" }}` end at the right
//! delimiter. Only a closing delimiter seen at depth zero, outside quotes,
//! terminates the region.
//!
//! # Raw blocks
//!
//! After a `{% raw %}` statement the lexer switches to raw mode and emits
//! everything up to the matching `{% endraw %}` as one
//! [`TokenKind::RawContent`] token, untouched.
//!
//! # Script and style
//!
//! The content of `<script>` and `<style>` elements is text up to the
//! matching closing tag, so `if (a<b)` stays text. Template regions inside
//! them are still recognised.
//!
//! # Example
//!
//! ```rust
//! use pyxm_syntax::{tokenize, TokenKind};
//!
//! let tokens = tokenize("<p>{{ name }}</p>").unwrap();
//! let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
//! assert_eq!(
//!     kinds,
//!     vec![
//!         TokenKind::TagOpen,
//!         TokenKind::TagName,
//!         TokenKind::TagClose,
//!         TokenKind::ExprOpen,
//!         TokenKind::ExprContent,
//!         TokenKind::ExprClose,
//!         TokenKind::TagEndOpen,
//!         TokenKind::TagName,
//!         TokenKind::TagClose,
//!         TokenKind::Eof,
//!     ]
//! );
//! ```

use tracing::trace;

use crate::error::LexError;
use crate::token::{Token, TokenKind};

/// Tokenizes `source` in one pass.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Expression,
    Statement,
}

impl Region {
    fn close(self) -> &'static str {
        match self {
            Region::Expression => "}}",
            Region::Statement => "%}",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Region::Expression => "expression",
            Region::Statement => "statement",
        }
    }

    fn kinds(self) -> (TokenKind, TokenKind, TokenKind) {
        match self {
            Region::Expression => (
                TokenKind::ExprOpen,
                TokenKind::ExprContent,
                TokenKind::ExprClose,
            ),
            Region::Statement => (
                TokenKind::StmtOpen,
                TokenKind::StmtContent,
                TokenKind::StmtClose,
            ),
        }
    }
}

/// Lexer state. Consumed by [`Lexer::tokenize`]; create a new one per source.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    /// Set while inside a `<script>` or `<style>` element.
    raw_text: Option<&'static str>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            raw_text: None,
        }
    }

    /// Runs the lexer to completion.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        while self.pos < self.src.len() {
            self.next_region()?;
        }
        let (line, column) = (self.line, self.column);
        self.push(TokenKind::Eof, "", line, column);
        trace!(count = self.tokens.len(), "tokenized template source");
        Ok(self.tokens)
    }

    fn next_region(&mut self) -> Result<(), LexError> {
        let rest = self.rest();
        if let Some(element) = self.raw_text {
            if closes_element(rest, element) {
                self.raw_text = None;
                return self.lex_end_tag();
            }
            if !starts_template_region(rest) {
                return self.lex_raw_text(element);
            }
        }

        if rest.starts_with("{{") {
            self.lex_delimited(Region::Expression)
        } else if rest.starts_with("{%") {
            self.lex_delimited(Region::Statement)
        } else if rest.starts_with("{#") {
            self.lex_comment()
        } else if let Some(open_len) = setup_open_len(rest) {
            self.lex_setup(open_len)
        } else if is_end_tag_start(rest) {
            self.lex_end_tag()
        } else if is_tag_start(rest) {
            self.lex_tag()
        } else {
            self.lex_text()
        }
    }

    // ---- cursor helpers ----

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Advances `bytes` bytes, updating line and column, and returns the
    /// consumed slice. `bytes` must land on a char boundary.
    fn advance(&mut self, bytes: usize) -> &'a str {
        let taken = &self.src[self.pos..self.pos + bytes];
        for ch in taken.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos += bytes;
        taken
    }

    /// Line and column `bytes` ahead of the cursor, without moving it.
    fn position_at(&self, bytes: usize) -> (usize, usize) {
        let (mut line, mut column) = (self.line, self.column);
        for ch in self.rest()[..bytes].chars() {
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        (line, column)
    }

    fn push(&mut self, kind: TokenKind, text: &str, line: usize, column: usize) {
        self.tokens.push(Token::new(kind, text, line, column));
    }

    /// Emits a token for the next `bytes` bytes and advances past them.
    fn emit(&mut self, kind: TokenKind, bytes: usize) {
        let (line, column) = (self.line, self.column);
        let text = self.advance(bytes);
        self.push(kind, text, line, column);
    }

    fn skip_whitespace(&mut self) {
        let len = self.rest().len() - self.rest().trim_start().len();
        self.advance(len);
    }

    // ---- template regions ----

    fn lex_delimited(&mut self, region: Region) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        let (open, content, close) = region.kinds();

        self.emit(open, 2);
        let end = find_region_end(self.rest(), region.close()).ok_or(LexError::Unterminated {
            delimiter: region.name(),
            expected: region.close(),
            line,
            column,
        })?;
        let body = &self.rest()[..end];
        self.emit(content, end);
        self.emit(close, 2);

        if region == Region::Statement && body.trim() == "raw" {
            self.lex_raw(line, column)?;
        }
        Ok(())
    }

    /// Emits everything up to the next `{% endraw %}` as one token.
    fn lex_raw(&mut self, line: usize, column: usize) -> Result<(), LexError> {
        let body = self.rest();
        let mut search = 0;
        while let Some(rel) = body[search..].find("{%") {
            let start = search + rel;
            let inner = &body[start + 2..];
            if let Some(close) = inner.find("%}") {
                if inner[..close].trim() == "endraw" {
                    self.emit(TokenKind::RawContent, start);
                    return Ok(());
                }
            }
            search = start + 2;
        }
        Err(LexError::Unterminated {
            delimiter: "raw block",
            expected: "{% endraw %}",
            line,
            column,
        })
    }

    fn lex_comment(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        self.emit(TokenKind::CommentOpen, 2);
        let end = self.rest().find("#}").ok_or(LexError::Unterminated {
            delimiter: "comment",
            expected: "#}",
            line,
            column,
        })?;
        self.emit(TokenKind::CommentContent, end);
        self.emit(TokenKind::CommentClose, 2);
        Ok(())
    }

    fn lex_setup(&mut self, open_len: usize) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        self.emit(TokenKind::SetupOpen, open_len);

        let unterminated = LexError::Unterminated {
            delimiter: "setup block",
            expected: "</setup>",
            line,
            column,
        };
        // ASCII lowercasing keeps byte offsets aligned with the source.
        let lowered = self.rest().to_ascii_lowercase();
        let end = lowered.find("</setup").ok_or(unterminated.clone())?;
        let after = &lowered[end + "</setup".len()..];
        let gap = after.len() - after.trim_start().len();
        if !after[gap..].starts_with('>') {
            return Err(unterminated);
        }

        self.emit(TokenKind::SetupContent, end);
        self.emit(TokenKind::SetupClose, "</setup".len() + gap + 1);
        Ok(())
    }

    // ---- markup ----

    fn lex_tag(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        self.emit(TokenKind::TagOpen, 1);
        self.lex_name(TokenKind::TagName, 0, "tag")?;
        let raw_text = self.tokens.last().and_then(|name| raw_text_element(&name.text));

        loop {
            self.skip_whitespace();
            let Some(ch) = self.peek() else {
                return Err(LexError::Unterminated {
                    delimiter: "tag",
                    expected: ">",
                    line,
                    column,
                });
            };
            match ch {
                '>' => {
                    self.emit(TokenKind::TagClose, 1);
                    self.raw_text = raw_text;
                    return Ok(());
                }
                '/' if self.rest().starts_with("/>") => {
                    self.emit(TokenKind::TagSelfClose, 2);
                    return Ok(());
                }
                '@' => {
                    self.lex_name(TokenKind::EventBind, 1, "event binding")?;
                    self.lex_attr_value(line, column)?;
                }
                ':' => {
                    self.lex_name(TokenKind::AttrBind, 1, "attribute binding")?;
                    self.lex_attr_value(line, column)?;
                }
                '#' => {
                    self.lex_name(TokenKind::RefBind, 1, "element reference")?;
                }
                c if is_name_start(c) => {
                    self.lex_name(TokenKind::AttrName, 0, "attribute")?;
                    self.lex_attr_value(line, column)?;
                }
                other => {
                    return Err(LexError::UnexpectedCharacter {
                        ch: other,
                        region: "tag",
                        line: self.line,
                        column: self.column,
                    });
                }
            }
        }
    }

    fn lex_end_tag(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        self.emit(TokenKind::TagEndOpen, 2);
        self.lex_name(TokenKind::TagName, 0, "closing tag")?;
        self.skip_whitespace();
        match self.peek() {
            Some('>') => {
                self.emit(TokenKind::TagClose, 1);
                Ok(())
            }
            Some(other) => Err(LexError::UnexpectedCharacter {
                ch: other,
                region: "closing tag",
                line: self.line,
                column: self.column,
            }),
            None => Err(LexError::Unterminated {
                delimiter: "closing tag",
                expected: ">",
                line,
                column,
            }),
        }
    }

    /// Lexes a name after skipping `prefix` bytes (`@`, `:` or `#`). The
    /// token starts at the prefix but its text is the bare name.
    fn lex_name(
        &mut self,
        kind: TokenKind,
        prefix: usize,
        region: &'static str,
    ) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(prefix);

        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start(c) => {}
            Some((_, c)) => {
                return Err(LexError::UnexpectedCharacter {
                    ch: c,
                    region,
                    line: self.line,
                    column: self.column,
                })
            }
            None => {
                return Err(LexError::Unterminated {
                    delimiter: region,
                    expected: ">",
                    line,
                    column,
                })
            }
        }
        let len = chars
            .find(|(_, c)| !is_name_char(*c))
            .map_or(rest.len(), |(i, _)| i);

        let name = self.advance(len);
        self.push(kind, name, line, column);
        Ok(())
    }

    /// Lexes an optional `= value` after an attribute name.
    fn lex_attr_value(&mut self, tag_line: usize, tag_column: usize) -> Result<(), LexError> {
        let gap = self.rest().len() - self.rest().trim_start().len();
        if !self.rest()[gap..].starts_with('=') {
            return Ok(());
        }
        self.advance(gap);
        self.emit(TokenKind::AttrEquals, 1);
        self.skip_whitespace();

        let (line, column) = (self.line, self.column);
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                let end = self.rest()[1..]
                    .find(quote)
                    .ok_or(LexError::Unterminated {
                        delimiter: "attribute value",
                        expected: if quote == '"' { "\"" } else { "'" },
                        line,
                        column,
                    })?;
                self.advance(1);
                self.emit(TokenKind::AttrValue, end);
                self.advance(1);
                Ok(())
            }
            Some(_) => {
                let rest = self.rest();
                let len = rest
                    .char_indices()
                    .find(|&(i, c)| {
                        c.is_whitespace() || c == '>' || rest[i..].starts_with("/>")
                    })
                    .map_or(rest.len(), |(i, _)| i);
                if len == 0 {
                    let ch = self.peek().unwrap_or('>');
                    return Err(LexError::UnexpectedCharacter {
                        ch,
                        region: "attribute value",
                        line,
                        column,
                    });
                }
                self.emit(TokenKind::AttrValue, len);
                Ok(())
            }
            None => Err(LexError::Unterminated {
                delimiter: "tag",
                expected: ">",
                line: tag_line,
                column: tag_column,
            }),
        }
    }

    fn lex_text(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        let rest = self.rest();
        let mut end = 0;

        while end < rest.len() {
            let tail = &rest[end..];
            if end > 0 && starts_region(tail) {
                break;
            }
            if tail.starts_with("<!--") {
                let close = tail[4..].find("-->").ok_or_else(|| {
                    let (line, column) = self.position_at(end);
                    LexError::Unterminated {
                        delimiter: "HTML comment",
                        expected: "-->",
                        line,
                        column,
                    }
                })?;
                end += 4 + close + 3;
                continue;
            }
            end += tail.chars().next().map_or(1, char::len_utf8);
        }

        let text = self.advance(end);
        self.push(TokenKind::Text, text, line, column);
        Ok(())
    }

    /// Text inside a script or style element, up to the next template
    /// region or the element's closing tag.
    fn lex_raw_text(&mut self, element: &str) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        let rest = self.rest();
        let mut end = 0;

        while end < rest.len() {
            let tail = &rest[end..];
            if end > 0 && (starts_template_region(tail) || closes_element(tail, element)) {
                break;
            }
            end += tail.chars().next().map_or(1, char::len_utf8);
        }

        let text = self.advance(end);
        self.push(TokenKind::Text, text, line, column);
        Ok(())
    }
}

fn raw_text_element(tag: &str) -> Option<&'static str> {
    ["script", "style"]
        .into_iter()
        .find(|element| element.eq_ignore_ascii_case(tag))
}

/// `</element` at the start of `s`, matched case-insensitively.
fn closes_element(s: &str, element: &str) -> bool {
    let bytes = s.as_bytes();
    let end = 2 + element.len();
    s.starts_with("</")
        && bytes
            .get(2..end)
            .is_some_and(|name| name.eq_ignore_ascii_case(element.as_bytes()))
        && !bytes.get(end).is_some_and(|&b| is_name_char(char::from(b)))
}

fn starts_template_region(s: &str) -> bool {
    s.starts_with("{{") || s.starts_with("{%") || s.starts_with("{#")
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn is_tag_start(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.first() == Some(&b'<') && bytes.get(1).is_some_and(u8::is_ascii_alphabetic)
}

fn is_end_tag_start(s: &str) -> bool {
    s.starts_with("</") && s.as_bytes().get(2).is_some_and(u8::is_ascii_alphabetic)
}

/// Length of a `<setup>` open tag at the start of `s`, if there is one.
/// Whitespace is allowed before the `>`.
fn setup_open_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if !bytes.get(..6)?.eq_ignore_ascii_case(b"<setup") {
        return None;
    }
    let gap = bytes[6..]
        .iter()
        .take_while(|b| b.is_ascii_whitespace())
        .count();
    (bytes.get(6 + gap) == Some(&b'>')).then_some(6 + gap + 1)
}

fn starts_region(s: &str) -> bool {
    starts_template_region(s) || is_tag_start(s) || is_end_tag_start(s)
}

/// Finds the byte offset of `close` at bracket depth zero, outside string
/// literals.
fn find_region_end(body: &str, close: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' if depth > 0 => depth -= 1,
                _ if depth == 0 && bytes[i..].starts_with(close.as_bytes()) => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}
