//! AST node types.
//!
//! The tree is strictly owned: every [`Node`] owns its children and there are
//! no back-references. Serialization (via serde) is the canonical textual
//! form of the tree: field order is fixed by the type definitions, maps
//! keep source order, and source positions are skipped.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;

/// Elements that never have content or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Returns `true` if `tag` is an HTML void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// 1-indexed source position of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Value of a static attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Attribute present without a value (`<input disabled>`).
    Flag,
    /// Attribute with a literal value.
    Text(String),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Flag => None,
            AttrValue::Text(s) => Some(s),
        }
    }
}

/// A markup element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    /// Lowercased tag name.
    pub tag: String,
    /// Static attributes in source order.
    pub attributes: IndexMap<String, AttrValue>,
    /// `:name="expr"` bindings: attribute name to expression text.
    pub bindings: IndexMap<String, String>,
    /// `@event="handler"` bindings: event name to handler text.
    pub events: IndexMap<String, String>,
    /// `#name` references.
    pub refs: Vec<String>,
    pub children: Vec<Node>,
    /// Written as `<tag ... />` in the source.
    pub self_closing: bool,
    /// No bindings, no events, and every child is static.
    pub is_static: bool,
    #[serde(skip)]
    pub span: Span,
}

impl Element {
    pub fn new(tag: impl Into<String>, span: Span) -> Self {
        Self {
            tag: tag.into(),
            attributes: IndexMap::new(),
            bindings: IndexMap::new(),
            events: IndexMap::new(),
            refs: Vec::new(),
            children: Vec::new(),
            self_closing: false,
            is_static: false,
            span,
        }
    }

    /// Recomputes [`is_static`](Self::is_static) from this element's
    /// bindings and its (already computed) children.
    pub fn compute_static(&mut self) {
        self.is_static = self.bindings.is_empty()
            && self.events.is_empty()
            && self.children.iter().all(Node::is_static);
    }

    /// Void elements and `/>` elements are written without a closing tag.
    pub fn is_void(&self) -> bool {
        self.self_closing || is_void_element(&self.tag)
    }
}

/// An `if` or `elif` branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conditional {
    /// Condition expression text.
    pub condition: String,
    pub children: Vec<Node>,
    /// The following `elif` ([`Node::Elif`]) or `else` ([`Node::Else`]).
    pub alternative: Option<Box<Node>>,
    #[serde(skip)]
    pub span: Span,
}

/// A node in the template tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Node {
    Root {
        children: Vec<Node>,
    },
    Element(Element),
    Text {
        content: String,
    },
    /// `{{ source }}`, where the source may end in a filter chain.
    Expression {
        source: String,
        #[serde(skip)]
        span: Span,
    },
    If(Conditional),
    Elif(Conditional),
    Else {
        children: Vec<Node>,
    },
    /// `{% for iterator %}`, where `iterator` is `target in expr`.
    For {
        iterator: String,
        children: Vec<Node>,
        #[serde(skip)]
        span: Span,
    },
    Component {
        name: String,
        attributes: IndexMap<String, AttrValue>,
        bindings: IndexMap<String, String>,
        children: Vec<Node>,
        #[serde(skip)]
        span: Span,
    },
    Slot {
        name: String,
        children: Vec<Node>,
    },
    Block {
        name: String,
        children: Vec<Node>,
    },
    SetupCode {
        content: String,
        #[serde(skip)]
        span: Span,
    },
    Comment {
        content: String,
    },
    Raw {
        content: String,
    },
}

impl Node {
    pub fn text(content: impl Into<String>) -> Self {
        Node::Text {
            content: content.into(),
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Root { .. } => "Root",
            Node::Element(_) => "Element",
            Node::Text { .. } => "Text",
            Node::Expression { .. } => "Expression",
            Node::If(_) => "If",
            Node::Elif(_) => "Elif",
            Node::Else { .. } => "Else",
            Node::For { .. } => "For",
            Node::Component { .. } => "Component",
            Node::Slot { .. } => "Slot",
            Node::Block { .. } => "Block",
            Node::SetupCode { .. } => "SetupCode",
            Node::Comment { .. } => "Comment",
            Node::Raw { .. } => "Raw",
        }
    }

    /// Whether the node renders identically for every context.
    ///
    /// Expressions, control flow, components, slots and blocks are never
    /// static. Elements carry their own precomputed flag.
    pub fn is_static(&self) -> bool {
        match self {
            Node::Text { .. } | Node::Comment { .. } | Node::Raw { .. } | Node::SetupCode { .. } => {
                true
            }
            Node::Element(el) => el.is_static,
            _ => false,
        }
    }

    /// Direct children of the node. An `If`'s alternative is not a child.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Root { children }
            | Node::Else { children }
            | Node::For { children, .. }
            | Node::Component { children, .. }
            | Node::Slot { children, .. }
            | Node::Block { children, .. } => children,
            Node::Element(el) => &el.children,
            Node::If(c) | Node::Elif(c) => &c.children,
            Node::Text { .. }
            | Node::Expression { .. }
            | Node::SetupCode { .. }
            | Node::Comment { .. }
            | Node::Raw { .. } => &[],
        }
    }

    /// Source position, when the node records one.
    pub fn span(&self) -> Option<Span> {
        match self {
            Node::Element(el) => Some(el.span),
            Node::If(c) | Node::Elif(c) => Some(c.span),
            Node::Expression { span, .. }
            | Node::For { span, .. }
            | Node::Component { span, .. }
            | Node::SetupCode { span, .. } => Some(*span),
            _ => None,
        }
    }
}

/// The result of parsing one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateAst {
    /// Always a [`Node::Root`].
    pub root: Node,
    /// Setup block bodies in document order.
    pub setup_blocks: Vec<String>,
    /// `import` / `from` lines found in setup blocks.
    pub imports: Vec<String>,
    /// Component nodes by name. When a name repeats, the last one wins.
    pub components: BTreeMap<String, Node>,
    /// Slot nodes by name. When a name repeats, the last one wins.
    pub slots: BTreeMap<String, Node>,
}
