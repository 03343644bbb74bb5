//! Recursive-descent parser from tokens to a [`TemplateAst`].
//!
//! The parser is driven by [`Parser::parse_until`], which collects sibling
//! nodes until it reaches something that ends the current scope: end of
//! input, a closing tag, or one of the `end*` / `elif` / `else` statements.
//! Each construct decides whether that terminator is the one it expects.
//!
//! # Statements
//!
//! | Statement | Body ends at |
//! |-----------|--------------|
//! | `{% if cond %}` | `elif`, `else`, `endif` |
//! | `{% for x in xs %}` | `endfor` |
//! | `{% component Name attr="v" :prop="expr" %}` | `endcomponent` |
//! | `{% block name %}` | `endblock` |
//! | `{% slot [name] %}` | `endslot`, or no body at all |
//! | `{% raw %}` | `endraw` |
//!
//! # Unknown statements
//!
//! By default an unrecognised keyword is a [`SyntaxError::UnknownStatement`].
//! With [`UnknownStatements::Comment`] it becomes a [`Node::Comment`]
//! carrying the statement text instead, which renders nothing.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::analysis;
use crate::ast::{is_void_element, AttrValue, Conditional, Element, Node, Span, TemplateAst};
use crate::error::{ParseError, SyntaxError};
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};

/// Keywords that end a scope rather than opening one.
const TERMINATORS: &[&str] = &[
    "elif",
    "else",
    "endif",
    "endfor",
    "endcomponent",
    "endblock",
    "endslot",
    "endraw",
];

/// How to treat `{% keyword %}` statements the parser does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownStatements {
    /// Fail with [`SyntaxError::UnknownStatement`].
    #[default]
    Strict,
    /// Keep the statement as a comment node.
    Comment,
}

/// Parser configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    pub unknown_statements: UnknownStatements,
}

impl ParseOptions {
    pub fn unknown_statements(mut self, behavior: UnknownStatements) -> Self {
        self.unknown_statements = behavior;
        self
    }
}

/// Parses `source` with default options.
pub fn parse(source: &str) -> Result<TemplateAst, ParseError> {
    parse_with(source, &ParseOptions::default())
}

/// Parses `source` into a [`TemplateAst`].
pub fn parse_with(source: &str, options: &ParseOptions) -> Result<TemplateAst, ParseError> {
    let tokens = tokenize(source)?;
    let root = Parser::new(tokens, *options).parse_document()?;
    Ok(analysis::analyze(root))
}

/// A `{% ... %}` statement split into keyword and arguments.
#[derive(Debug, Clone)]
struct Statement {
    keyword: String,
    args: String,
    text: String,
    line: usize,
    column: usize,
}

/// What stopped [`Parser::parse_until`].
#[derive(Debug)]
enum End {
    Eof,
    CloseTag { name: String, line: usize },
    Statement(Statement),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    options: ParseOptions,
}

impl Parser {
    fn new(tokens: Vec<Token>, options: ParseOptions) -> Self {
        Self {
            tokens,
            pos: 0,
            options,
        }
    }

    fn parse_document(&mut self) -> Result<Node, ParseError> {
        let (children, end) = self.parse_until()?;
        match end {
            End::Eof => Ok(Node::Root { children }),
            End::CloseTag { name, line } => {
                Err(SyntaxError::UnexpectedClosingTag { tag: name, line }.into())
            }
            End::Statement(stmt) => Err(SyntaxError::UnexpectedStatement {
                keyword: stmt.keyword,
                line: stmt.line,
            }
            .into()),
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        // The lexer always ends the stream with Eof and the parser never
        // advances past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, SyntaxError> {
        let token = self.advance();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(unexpected(&token))
        }
    }

    // ---- scopes ----

    /// Parses sibling nodes until something ends the current scope.
    fn parse_until(&mut self) -> Result<(Vec<Node>, End), ParseError> {
        let mut children = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Eof => return Ok((children, End::Eof)),
                TokenKind::Text => {
                    let token = self.advance();
                    children.push(Node::text(token.text));
                }
                TokenKind::ExprOpen => children.push(self.parse_expression()?),
                TokenKind::CommentOpen => children.push(self.parse_comment()?),
                TokenKind::SetupOpen => children.push(self.parse_setup()?),
                TokenKind::TagOpen => children.push(self.parse_element()?),
                TokenKind::TagEndOpen => {
                    let (name, line) = self.parse_end_tag()?;
                    return Ok((children, End::CloseTag { name, line }));
                }
                TokenKind::StmtOpen => {
                    let stmt = self.read_statement()?;
                    if TERMINATORS.contains(&stmt.keyword.as_str()) {
                        return Ok((children, End::Statement(stmt)));
                    }
                    children.push(self.parse_statement(stmt)?);
                }
                _ => return Err(unexpected(self.peek()).into()),
            }
        }
    }

    /// Parses a body that must end with one of `expected`.
    fn parse_body(
        &mut self,
        opener: &Statement,
        expected: &[&str],
    ) -> Result<(Vec<Node>, Statement), ParseError> {
        let (children, end) = self.parse_until()?;
        match end {
            End::Statement(stmt) if expected.contains(&stmt.keyword.as_str()) => {
                Ok((children, stmt))
            }
            End::Statement(stmt) => Err(SyntaxError::UnexpectedStatement {
                keyword: stmt.keyword,
                line: stmt.line,
            }
            .into()),
            End::CloseTag { name, line } => {
                Err(SyntaxError::UnexpectedClosingTag { tag: name, line }.into())
            }
            End::Eof => Err(SyntaxError::UnclosedBlock {
                keyword: opener.keyword.clone(),
                expected: expected.last().copied().unwrap_or("end").to_string(),
                line: opener.line,
            }
            .into()),
        }
    }

    // ---- template regions ----

    fn parse_expression(&mut self) -> Result<Node, ParseError> {
        let open = self.expect(TokenKind::ExprOpen)?;
        let content = self.expect(TokenKind::ExprContent)?;
        self.expect(TokenKind::ExprClose)?;
        Ok(Node::Expression {
            source: content.text.trim().to_string(),
            span: Span::new(open.line, open.column),
        })
    }

    fn parse_comment(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenKind::CommentOpen)?;
        let content = self.expect(TokenKind::CommentContent)?;
        self.expect(TokenKind::CommentClose)?;
        Ok(Node::Comment {
            content: content.text.trim().to_string(),
        })
    }

    fn parse_setup(&mut self) -> Result<Node, ParseError> {
        let open = self.expect(TokenKind::SetupOpen)?;
        let content = self.expect(TokenKind::SetupContent)?;
        self.expect(TokenKind::SetupClose)?;
        Ok(Node::SetupCode {
            content: content.text,
            span: Span::new(open.line, open.column),
        })
    }

    // ---- markup ----

    fn parse_element(&mut self) -> Result<Node, ParseError> {
        let open = self.expect(TokenKind::TagOpen)?;
        let name = self.expect(TokenKind::TagName)?;
        let mut element = Element::new(
            name.text.to_ascii_lowercase(),
            Span::new(open.line, open.column),
        );

        loop {
            let token = self.advance();
            match token.kind {
                TokenKind::AttrName => {
                    let value = match self.attr_value()? {
                        Some(value) => AttrValue::Text(value),
                        None => AttrValue::Flag,
                    };
                    element.attributes.insert(token.text, value);
                }
                TokenKind::AttrBind => {
                    let expr = self.required_attr_value(&token)?;
                    element.bindings.insert(token.text, expr);
                }
                TokenKind::EventBind => {
                    let handler = self.required_attr_value(&token)?;
                    element.events.insert(token.text, handler);
                }
                TokenKind::RefBind => element.refs.push(token.text),
                TokenKind::TagClose => break,
                TokenKind::TagSelfClose => {
                    element.self_closing = true;
                    break;
                }
                _ => return Err(unexpected(&token).into()),
            }
        }

        if !element.is_void() {
            let (children, end) = self.parse_until()?;
            match end {
                End::CloseTag { name, .. } if name == element.tag => {}
                End::CloseTag { name, line } => {
                    return Err(SyntaxError::MismatchedTag {
                        expected: element.tag,
                        found: name,
                        open_line: open.line,
                        line,
                    }
                    .into())
                }
                End::Eof | End::Statement(_) => {
                    return Err(SyntaxError::UnclosedElement {
                        tag: element.tag,
                        line: open.line,
                    }
                    .into())
                }
            }
            element.children = children;
        }

        element.compute_static();
        Ok(Node::Element(element))
    }

    fn parse_end_tag(&mut self) -> Result<(String, usize), ParseError> {
        let open = self.expect(TokenKind::TagEndOpen)?;
        let name = self.expect(TokenKind::TagName)?;
        self.expect(TokenKind::TagClose)?;
        Ok((name.text.to_ascii_lowercase(), open.line))
    }

    fn attr_value(&mut self) -> Result<Option<String>, ParseError> {
        if self.peek().kind != TokenKind::AttrEquals {
            return Ok(None);
        }
        self.advance();
        Ok(Some(self.expect(TokenKind::AttrValue)?.text))
    }

    fn required_attr_value(&mut self, name: &Token) -> Result<String, ParseError> {
        self.attr_value()?.ok_or_else(|| {
            SyntaxError::UnexpectedToken {
                found: format!("{} `{}` without a value", name.kind, name.text),
                line: name.line,
                column: name.column,
            }
            .into()
        })
    }

    // ---- statements ----

    fn read_statement(&mut self) -> Result<Statement, ParseError> {
        let open = self.expect(TokenKind::StmtOpen)?;
        let content = self.expect(TokenKind::StmtContent)?;
        self.expect(TokenKind::StmtClose)?;

        let text = content.text.trim().to_string();
        let (keyword, args) = match text.split_once(char::is_whitespace) {
            Some((keyword, args)) => (keyword.to_string(), args.trim().to_string()),
            None => (text.clone(), String::new()),
        };
        Ok(Statement {
            keyword,
            args,
            text,
            line: open.line,
            column: open.column,
        })
    }

    fn parse_statement(&mut self, stmt: Statement) -> Result<Node, ParseError> {
        trace!(keyword = %stmt.keyword, line = stmt.line, "parsing statement");
        match stmt.keyword.as_str() {
            "if" => self.parse_if(stmt).map(Node::If),
            "for" => self.parse_for(stmt),
            "component" => self.parse_component(stmt),
            "block" => self.parse_block(stmt),
            "slot" => self.parse_slot(stmt),
            "raw" => self.parse_raw(stmt),
            _ => match self.options.unknown_statements {
                UnknownStatements::Strict => Err(SyntaxError::UnknownStatement {
                    statement: stmt.text,
                    line: stmt.line,
                }
                .into()),
                UnknownStatements::Comment => {
                    warn!(statement = %stmt.text, line = stmt.line, "unknown statement kept as comment");
                    Ok(Node::Comment {
                        content: format!("Unknown statement: {}", stmt.text),
                    })
                }
            },
        }
    }

    /// Parses an `if` or `elif` branch and everything after it up to `endif`.
    fn parse_if(&mut self, stmt: Statement) -> Result<Conditional, ParseError> {
        if stmt.args.is_empty() {
            return Err(malformed(&stmt, "missing condition"));
        }
        let (children, end) = self.parse_body(&stmt, &["elif", "else", "endif"])?;
        let keyword = end.keyword.clone();
        let alternative = match keyword.as_str() {
            "elif" => Some(Box::new(Node::Elif(self.parse_if(end)?))),
            "else" => {
                let (children, _) = self.parse_body(&end, &["endif"])?;
                Some(Box::new(Node::Else { children }))
            }
            _ => None,
        };
        Ok(Conditional {
            condition: stmt.args,
            children,
            alternative,
            span: Span::new(stmt.line, stmt.column),
        })
    }

    fn parse_for(&mut self, stmt: Statement) -> Result<Node, ParseError> {
        if !stmt.args.split_whitespace().any(|word| word == "in") {
            return Err(malformed(&stmt, "expected `target in expression`"));
        }
        let (children, _) = self.parse_body(&stmt, &["endfor"])?;
        Ok(Node::For {
            iterator: stmt.args,
            children,
            span: Span::new(stmt.line, stmt.column),
        })
    }

    fn parse_component(&mut self, stmt: Statement) -> Result<Node, ParseError> {
        let (name, rest) = match stmt.args.split_once(char::is_whitespace) {
            Some((name, rest)) => (name.to_string(), rest.trim()),
            None => (stmt.args.clone(), ""),
        };
        if name.is_empty() {
            return Err(malformed(&stmt, "missing component name"));
        }

        let mut attributes = IndexMap::new();
        let mut bindings = IndexMap::new();
        for (key, value) in split_attributes(rest).map_err(|reason| malformed(&stmt, &reason))? {
            match (key.strip_prefix(':'), value) {
                (Some(prop), Some(expr)) => {
                    bindings.insert(prop.to_string(), expr);
                }
                (Some(prop), None) => {
                    return Err(malformed(&stmt, &format!("binding `:{prop}` needs a value")))
                }
                (None, Some(value)) => {
                    attributes.insert(key, AttrValue::Text(value));
                }
                (None, None) => {
                    attributes.insert(key, AttrValue::Flag);
                }
            }
        }

        let (children, _) = self.parse_body(&stmt, &["endcomponent"])?;
        Ok(Node::Component {
            name,
            attributes,
            bindings,
            children,
            span: Span::new(stmt.line, stmt.column),
        })
    }

    fn parse_block(&mut self, stmt: Statement) -> Result<Node, ParseError> {
        if stmt.args.is_empty() || stmt.args.contains(char::is_whitespace) {
            return Err(malformed(&stmt, "expected a single block name"));
        }
        let (children, _) = self.parse_body(&stmt, &["endblock"])?;
        Ok(Node::Block {
            name: stmt.args,
            children,
        })
    }

    fn parse_slot(&mut self, stmt: Statement) -> Result<Node, ParseError> {
        let name = if stmt.args.is_empty() {
            "default".to_string()
        } else {
            stmt.args.clone()
        };
        let children = if self.slot_has_body() {
            self.parse_body(&stmt, &["endslot"])?.0
        } else {
            Vec::new()
        };
        Ok(Node::Slot { name, children })
    }

    fn slot_has_body(&self) -> bool {
        slot_end(&self.tokens, self.pos).is_some()
    }

    fn parse_raw(&mut self, stmt: Statement) -> Result<Node, ParseError> {
        let content = if self.peek().kind == TokenKind::RawContent {
            self.advance().text
        } else {
            String::new()
        };
        let end = self.read_statement()?;
        if end.keyword != "endraw" {
            return Err(SyntaxError::UnclosedBlock {
                keyword: stmt.keyword,
                expected: "endraw".into(),
                line: stmt.line,
            }
            .into());
        }
        Ok(Node::Raw { content })
    }
}

/// Index just past the `endslot` that closes a slot whose body starts at
/// `start`, or `None` when the slot has no body.
///
/// Nested slots with their own `endslot` are skipped. The search gives up
/// when it would leave the element or statement block enclosing the slot.
fn slot_end(tokens: &[Token], start: usize) -> Option<usize> {
    let mut elements = 0usize;
    let mut blocks = 0usize;
    let mut open_tag: Option<&str> = None;
    let mut i = start;

    while let Some(token) = tokens.get(i) {
        match token.kind {
            TokenKind::TagName if i > 0 && tokens[i - 1].kind == TokenKind::TagOpen => {
                open_tag = Some(token.text.as_str());
            }
            TokenKind::TagClose => {
                if open_tag.take().is_some_and(|tag| !is_void_element(tag)) {
                    elements += 1;
                }
            }
            TokenKind::TagSelfClose => open_tag = None,
            TokenKind::TagEndOpen => match elements.checked_sub(1) {
                Some(depth) => elements = depth,
                None => return None,
            },
            TokenKind::StmtContent => {
                match token.text.split_whitespace().next().unwrap_or("") {
                    "slot" => {
                        if let Some(end) = slot_end(tokens, i + 1) {
                            i = end;
                            continue;
                        }
                    }
                    "endslot" if elements == 0 && blocks == 0 => return Some(i + 1),
                    "endslot" => return None,
                    "if" | "for" | "component" | "block" => blocks += 1,
                    "endif" | "endfor" | "endcomponent" | "endblock" => {
                        match blocks.checked_sub(1) {
                            Some(depth) => blocks = depth,
                            None => return None,
                        }
                    }
                    "elif" | "else" if blocks == 0 => return None,
                    _ => {}
                }
            }
            TokenKind::Eof => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

fn unexpected(token: &Token) -> SyntaxError {
    SyntaxError::UnexpectedToken {
        found: token.kind.to_string(),
        line: token.line,
        column: token.column,
    }
}

fn malformed(stmt: &Statement, reason: &str) -> ParseError {
    SyntaxError::MalformedStatement {
        keyword: stmt.keyword.clone(),
        reason: reason.to_string(),
        line: stmt.line,
    }
    .into()
}

/// Splits `a="x" :b='y' flag c=z` into name/value pairs.
fn split_attributes(text: &str) -> Result<Vec<(String, Option<String>)>, String> {
    let mut out = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let name = &rest[..name_len];
        if name.is_empty() {
            return Err(format!("expected an attribute name before `{rest}`"));
        }
        rest = rest[name_len..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let end = body
                        .find(quote)
                        .ok_or_else(|| format!("unterminated value for `{name}`"))?;
                    rest = &body[end + 1..];
                    Some(body[..end].to_string())
                }
                Some(_) => {
                    let end = after_eq
                        .find(char::is_whitespace)
                        .unwrap_or(after_eq.len());
                    rest = &after_eq[end..];
                    Some(after_eq[..end].to_string())
                }
                None => return Err(format!("missing value for `{name}`")),
            }
        } else {
            None
        };

        out.push((name.to_string(), value));
        rest = rest.trim_start();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_children(source: &str) -> Vec<Node> {
        match parse(source).expect("parses").root {
            Node::Root { children } => children,
            other => panic!("expected root, got {other:?}"),
        }
    }

    fn only(source: &str) -> Node {
        let mut children = root_children(source);
        assert_eq!(children.len(), 1, "expected one node in {children:?}");
        children.remove(0)
    }

    // ==================== Element Tests ====================

    mod elements {
        use super::*;

        #[test]
        fn nested_elements() {
            let Node::Element(div) = only("<div><p>hi</p></div>") else {
                panic!("expected element");
            };
            assert_eq!(div.tag, "div");
            let Node::Element(p) = &div.children[0] else {
                panic!("expected element");
            };
            assert_eq!(p.children, vec![Node::text("hi")]);
        }

        #[test]
        fn tag_names_are_lowercased() {
            let Node::Element(el) = only("<DIV></div>") else {
                panic!("expected element");
            };
            assert_eq!(el.tag, "div");
        }

        #[test]
        fn attribute_maps() {
            let Node::Element(el) =
                only(r#"<input type="text" required :value="v" @input="update" #field>"#)
            else {
                panic!("expected element");
            };
            assert_eq!(el.attributes["type"], AttrValue::Text("text".into()));
            assert_eq!(el.attributes["required"], AttrValue::Flag);
            assert_eq!(el.bindings["value"], "v");
            assert_eq!(el.events["input"], "update");
            assert_eq!(el.refs, vec!["field".to_string()]);
            assert!(!el.is_static);
        }

        #[test]
        fn void_element_needs_no_closing_tag() {
            let children = root_children("<p>a<br>b</p>");
            let Node::Element(p) = &children[0] else {
                panic!("expected element");
            };
            assert_eq!(p.children.len(), 3);
        }

        #[test]
        fn self_closing_element() {
            let Node::Element(el) = only("<my-icon name=\"x\" />") else {
                panic!("expected element");
            };
            assert!(el.self_closing);
            assert!(el.children.is_empty());
        }

        #[test]
        fn static_flag_propagates_upward() {
            let Node::Element(outer) = only("<div><p>{{ x }}</p></div>") else {
                panic!("expected element");
            };
            assert!(!outer.is_static);

            let Node::Element(outer) = only("<div><p>text</p></div>") else {
                panic!("expected element");
            };
            assert!(outer.is_static);
        }

        #[test]
        fn mismatched_closing_tag() {
            let err = parse("<div>\n</span>").unwrap_err();
            assert_eq!(
                err,
                ParseError::Syntax(SyntaxError::MismatchedTag {
                    expected: "div".into(),
                    found: "span".into(),
                    open_line: 1,
                    line: 2,
                })
            );
        }

        #[test]
        fn unclosed_element() {
            assert!(matches!(
                parse("<div><p></p>"),
                Err(ParseError::Syntax(SyntaxError::UnclosedElement { .. }))
            ));
        }

        #[test]
        fn stray_closing_tag() {
            assert!(matches!(
                parse("text</p>"),
                Err(ParseError::Syntax(SyntaxError::UnexpectedClosingTag { .. }))
            ));
        }

        #[test]
        fn binding_without_value_is_rejected() {
            assert!(matches!(
                parse("<a :href></a>"),
                Err(ParseError::Syntax(SyntaxError::UnexpectedToken { .. }))
            ));
        }
    }

    // ==================== Conditional Tests ====================

    mod conditionals {
        use super::*;

        #[test]
        fn if_elif_else_chain() {
            let Node::If(cond) = only("{% if a %}A{% elif b %}B{% else %}C{% endif %}") else {
                panic!("expected if");
            };
            assert_eq!(cond.condition, "a");
            assert_eq!(cond.children, vec![Node::text("A")]);

            let Some(alt) = cond.alternative.as_deref() else {
                panic!("expected elif");
            };
            let Node::Elif(elif) = alt else {
                panic!("expected elif, got {alt:?}");
            };
            assert_eq!(elif.condition, "b");
            assert_eq!(
                elif.alternative.as_deref(),
                Some(&Node::Else {
                    children: vec![Node::text("C")]
                })
            );
        }

        #[test]
        fn if_without_alternative() {
            let Node::If(cond) = only("{% if a %}A{% endif %}") else {
                panic!("expected if");
            };
            assert!(cond.alternative.is_none());
        }

        #[test]
        fn missing_endif() {
            assert!(matches!(
                parse("{% if a %}A"),
                Err(ParseError::Syntax(SyntaxError::UnclosedBlock { .. }))
            ));
        }

        #[test]
        fn stray_endif() {
            assert!(matches!(
                parse("A{% endif %}"),
                Err(ParseError::Syntax(SyntaxError::UnexpectedStatement { .. }))
            ));
        }

        #[test]
        fn mismatched_end_keyword() {
            assert!(matches!(
                parse("{% if a %}A{% endfor %}"),
                Err(ParseError::Syntax(SyntaxError::UnexpectedStatement { .. }))
            ));
        }

        #[test]
        fn empty_condition() {
            assert!(matches!(
                parse("{% if %}A{% endif %}"),
                Err(ParseError::Syntax(SyntaxError::MalformedStatement { .. }))
            ));
        }
    }

    // ==================== Loop Tests ====================

    mod loops {
        use super::*;

        #[test]
        fn for_loop() {
            let Node::For {
                iterator, children, ..
            } = only("{% for item in items %}<li>{{ item }}</li>{% endfor %}")
            else {
                panic!("expected for");
            };
            assert_eq!(iterator, "item in items");
            assert_eq!(children.len(), 1);
        }

        #[test]
        fn for_loop_across_lines() {
            let Node::For { iterator, .. } = only("{% for item\nin items %}{% endfor %}") else {
                panic!("expected for");
            };
            assert_eq!(iterator, "item\nin items");
        }

        #[test]
        fn for_without_in() {
            assert!(matches!(
                parse("{% for items %}{% endfor %}"),
                Err(ParseError::Syntax(SyntaxError::MalformedStatement { .. }))
            ));
        }
    }

    // ==================== Composition Tests ====================

    mod composition {
        use super::*;

        #[test]
        fn component_with_props() {
            let Node::Component {
                name,
                attributes,
                bindings,
                children,
                ..
            } = only(r#"{% component Card title="Hi" :count="n" wide %}body{% endcomponent %}"#)
            else {
                panic!("expected component");
            };
            assert_eq!(name, "Card");
            assert_eq!(attributes["title"], AttrValue::Text("Hi".into()));
            assert_eq!(attributes["wide"], AttrValue::Flag);
            assert_eq!(bindings["count"], "n");
            assert_eq!(children, vec![Node::text("body")]);
        }

        #[test]
        fn component_requires_name() {
            assert!(matches!(
                parse("{% component %}{% endcomponent %}"),
                Err(ParseError::Syntax(SyntaxError::MalformedStatement { .. }))
            ));
        }

        #[test]
        fn block_with_default_content() {
            assert_eq!(
                only("{% block main %}default{% endblock %}"),
                Node::Block {
                    name: "main".into(),
                    children: vec![Node::text("default")],
                }
            );
        }

        #[test]
        fn unnamed_slot_is_default() {
            assert_eq!(
                only("{% slot %}"),
                Node::Slot {
                    name: "default".into(),
                    children: vec![],
                }
            );
        }

        #[test]
        fn slot_with_fallback_body() {
            assert_eq!(
                only("{% slot footer %}fallback{% endslot %}"),
                Node::Slot {
                    name: "footer".into(),
                    children: vec![Node::text("fallback")],
                }
            );
        }

        #[test]
        fn slot_default_may_hold_a_bodiless_slot() {
            let Node::Slot { name, children } =
                only("{% slot header %}<h1>{% slot title %}</h1>{% endslot %}")
            else {
                panic!("expected a slot");
            };
            assert_eq!(name, "header");
            let [Node::Element(h1)] = children.as_slice() else {
                panic!("expected one element, got {children:?}");
            };
            assert_eq!(h1.tag, "h1");
            assert_eq!(
                h1.children,
                vec![Node::Slot {
                    name: "title".into(),
                    children: vec![],
                }]
            );
        }

        #[test]
        fn slot_default_may_hold_a_slot_with_body() {
            let Node::Slot { name, children } =
                only("{% slot outer %}[{% slot inner %}x{% endslot %}]{% endslot %}")
            else {
                panic!("expected a slot");
            };
            assert_eq!(name, "outer");
            assert_eq!(children.len(), 3);
            assert_eq!(
                children[1],
                Node::Slot {
                    name: "inner".into(),
                    children: vec![Node::text("x")],
                }
            );
        }

        #[test]
        fn adjacent_slots_without_bodies() {
            let children = root_children("{% slot a %}{% slot b %}x{% endslot %}");
            assert_eq!(
                children[0],
                Node::Slot {
                    name: "a".into(),
                    children: vec![],
                }
            );
            assert_eq!(
                children[1],
                Node::Slot {
                    name: "b".into(),
                    children: vec![Node::text("x")],
                }
            );
        }

        #[test]
        fn raw_block() {
            assert_eq!(
                only("{% raw %}{{ x }}{% endraw %}"),
                Node::Raw {
                    content: "{{ x }}".into()
                }
            );
        }
    }

    // ==================== Unknown Statement Tests ====================

    mod unknown_statements {
        use super::*;

        #[test]
        fn strict_by_default() {
            assert!(matches!(
                parse("{% fi x %}"),
                Err(ParseError::Syntax(SyntaxError::UnknownStatement { .. }))
            ));
        }

        #[test]
        fn comment_mode_keeps_text() {
            let options = ParseOptions::default().unknown_statements(UnknownStatements::Comment);
            let ast = parse_with("{% fi x %}", &options).unwrap();
            assert_eq!(
                ast.root.children(),
                &[Node::Comment {
                    content: "Unknown statement: fi x".into()
                }]
            );
        }

        #[test]
        fn options_deserialize_lowercase() {
            let options: ParseOptions =
                serde_json::from_str(r#"{"unknown_statements": "comment"}"#).unwrap();
            assert_eq!(options.unknown_statements, UnknownStatements::Comment);
        }
    }

    // ==================== Attribute Splitting Tests ====================

    mod split {
        use super::*;

        #[test]
        fn mixed_forms() {
            let pairs = split_attributes(r#"a="x y" :b='c' flag d=e"#).unwrap();
            assert_eq!(
                pairs,
                vec![
                    ("a".to_string(), Some("x y".to_string())),
                    (":b".to_string(), Some("c".to_string())),
                    ("flag".to_string(), None),
                    ("d".to_string(), Some("e".to_string())),
                ]
            );
        }

        #[test]
        fn unterminated_quote() {
            assert!(split_attributes(r#"a="x"#).is_err());
        }

        #[test]
        fn empty_input() {
            assert!(split_attributes("").unwrap().is_empty());
        }
    }
}
