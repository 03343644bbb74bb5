//! Lexer, parser and AST for PYXM templates.
//!
//! PYXM source mixes HTML-like markup with template regions:
//!
//! ```text
//! <setup>
//! greeting = "Hello"
//! </setup>
//! <ul :class="list_class">
//!   {% for item in items %}
//!     <li @click="select(item)">{{ greeting }}, {{ item.name | title }}</li>
//!   {% endfor %}
//! </ul>
//! {# comments render nothing #}
//! ```
//!
//! This crate turns such source into a [`TemplateAst`]. It does not evaluate
//! anything: expression, condition and iterator texts are kept as strings for
//! a compiler to interpret.
//!
//! # Example
//!
//! ```rust
//! use pyxm_syntax::{parse, Node};
//!
//! let ast = parse("<p :title=\"t\">{{ name }}</p>").unwrap();
//! let Node::Element(p) = &ast.root.children()[0] else { unreachable!() };
//! assert_eq!(p.tag, "p");
//! assert_eq!(p.bindings["title"], "t");
//! assert!(!p.is_static);
//! ```
//!
//! # Errors
//!
//! Lexing fails with a [`LexError`] on unterminated regions or characters
//! that cannot appear inside a tag. Parsing fails with a [`SyntaxError`] on
//! structural problems (mismatched tags, unbalanced blocks). Both are
//! wrapped by [`ParseError`].

pub mod analysis;
pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use analysis::is_import_line;
pub use ast::{
    is_void_element, AttrValue, Conditional, Element, Node, Span, TemplateAst, VOID_ELEMENTS,
};
pub use error::{LexError, ParseError, SyntaxError};
pub use lexer::{tokenize, Lexer};
pub use parser::{parse, parse_with, ParseOptions, UnknownStatements};
pub use token::{Token, TokenKind};
