//! AST to render-routine compiler.
//!
//! Every node compiles to a [`Step`]: a closure that appends to the output
//! buffer of a [`Frame`] and returns a boxed future. Literal output is
//! merged at compile time, so a run of text and static elements costs one
//! `push_str`, and a fully static template renders without evaluating
//! anything.
//!
//! Steps that never suspend return an already-completed future. Only loops,
//! sequences, components and blocks run as real async blocks, since those
//! are the ones that may wait on a nested component render.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use pyxm_syntax::{AttrValue, Conditional, Element, Node, Span, TemplateAst};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::{EngineConfig, UndefinedBehavior};
use crate::context::Context;
use crate::error::{CompileError, RenderError};
use crate::expr::{parse_expr, parse_loop, Evaluator, Expr, ExprError, LoopTarget};
use crate::filters::FilterRegistry;
use crate::hash::ast_hash;
use crate::setup::{parse_setup, Assignment};
use crate::value::{escape_html, ValueExt};

type StepResult = Result<(), RenderError>;

/// One compiled node: appends its output to the frame.
type Step = Arc<dyn for<'a> Fn(&'a mut Frame) -> BoxFuture<'a, StepResult> + Send + Sync>;

fn step<F>(f: F) -> Step
where
    F: for<'a> Fn(&'a mut Frame) -> BoxFuture<'a, StepResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn done<'a>(result: StepResult) -> BoxFuture<'a, StepResult> {
    future::ready(result).boxed()
}

/// Filters whose output is already safe to write without escaping.
const ESCAPING_FILTERS: &[&str] = &["safe", "escape", "e"];

/// Mutable state of one render call.
struct Frame {
    out: String,
    /// Setup names at index 0, then one scope per active loop.
    scopes: Vec<Map<String, Value>>,
    ctx: Context,
    filters: Arc<FilterRegistry>,
    undefined: UndefinedBehavior,
    /// Output of every block rendered so far, for inheritance.
    blocks: HashMap<String, String>,
}

impl Frame {
    fn eval(&self, expr: &Expr) -> Result<Value, RenderError> {
        Evaluator::new(&self.scopes, self.ctx.vars(), &self.filters, self.undefined).eval(expr)
    }
}

/// Renders `part` into a fresh buffer and returns what it wrote.
async fn capture(frame: &mut Frame, part: &Step) -> Result<String, RenderError> {
    let saved = std::mem::take(&mut frame.out);
    let result = part(frame).await;
    let captured = std::mem::replace(&mut frame.out, saved);
    result.map(|()| captured)
}

enum Piece {
    Literal(String),
    Dynamic(Step),
}

/// Output of a node list, with adjacent literals merged.
#[derive(Default)]
struct Pieces(Vec<Piece>);

impl Pieces {
    fn literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.0.last_mut() {
            Some(Piece::Literal(last)) => last.push_str(text),
            _ => self.0.push(Piece::Literal(text.to_string())),
        }
    }

    fn dynamic(&mut self, step: Step) {
        self.0.push(Piece::Dynamic(step));
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_step(mut self) -> Step {
        match self.0.len() {
            0 => step(|_| done(Ok(()))),
            1 => match self.0.pop() {
                Some(Piece::Literal(text)) => step(move |frame| {
                    frame.out.push_str(&text);
                    done(Ok(()))
                }),
                Some(Piece::Dynamic(single)) => single,
                None => step(|_| done(Ok(()))),
            },
            _ => {
                let pieces = Arc::new(self.0);
                step(move |frame| {
                    let pieces = Arc::clone(&pieces);
                    async move {
                        for piece in pieces.iter() {
                            match piece {
                                Piece::Literal(text) => frame.out.push_str(text),
                                Piece::Dynamic(step) => step(frame).await?,
                            }
                        }
                        Ok::<_, RenderError>(())
                    }
                    .boxed()
                })
            }
        }
    }
}

/// A template compiled to a render routine plus metadata.
///
/// Immutable once built. Rendering never mutates it, so one instance is
/// shared by every render and across threads.
pub struct CompiledTemplate {
    name: String,
    source_hash: String,
    render: Step,
    setup: Vec<Assignment>,
    filters: Arc<FilterRegistry>,
    undefined: UndefinedBehavior,
    static_parts: BTreeMap<String, String>,
    bindings: BTreeMap<String, String>,
    events: BTreeMap<String, String>,
    component_names: Vec<String>,
    imports: Vec<String>,
}

impl CompiledTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hash of the canonical AST serialization.
    pub fn source_hash(&self) -> &str {
        &self.source_hash
    }

    /// Prerendered static elements, keyed `s0`, `s1`, ... in document order.
    pub fn static_parts(&self) -> &BTreeMap<String, String> {
        &self.static_parts
    }

    /// Every `:attr` binding in the template: attribute to expression text.
    pub fn bindings(&self) -> &BTreeMap<String, String> {
        &self.bindings
    }

    /// Every `@event` binding in the template: event to handler text.
    pub fn events(&self) -> &BTreeMap<String, String> {
        &self.events
    }

    /// Distinct component names, in order of first use.
    pub fn component_names(&self) -> &[String] {
        &self.component_names
    }

    /// `import` lines found in setup blocks.
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// Renders the template against `ctx`.
    pub async fn render(&self, ctx: Context) -> Result<String, RenderError> {
        self.render_with_blocks(ctx).await.map(|(html, _)| html)
    }

    /// Blocking form of [`render`](Self::render) for callers outside an
    /// async runtime.
    pub fn render_sync(&self, ctx: Context) -> Result<String, RenderError> {
        pollster::block_on(self.render(ctx))
    }

    /// Renders and also returns the output of each block, by name.
    pub async fn render_with_blocks(
        &self,
        ctx: Context,
    ) -> Result<(String, HashMap<String, String>), RenderError> {
        let mut frame = Frame {
            out: String::new(),
            scopes: vec![Map::new()],
            ctx,
            filters: Arc::clone(&self.filters),
            undefined: self.undefined,
            blocks: HashMap::new(),
        };
        for assignment in &self.setup {
            let value = frame.eval(&assignment.value)?;
            if let Some(scope) = frame.scopes.first_mut() {
                scope.insert(assignment.name.clone(), value);
            }
        }
        (self.render)(&mut frame).await?;
        Ok((frame.out, frame.blocks))
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("source_hash", &self.source_hash)
            .field("static_parts", &self.static_parts.len())
            .field("bindings", &self.bindings)
            .field("events", &self.events)
            .field("component_names", &self.component_names)
            .finish_non_exhaustive()
    }
}

/// Compiles a parsed template.
///
/// # Errors
///
/// Fails with [`CompileError`] when an expression, loop header or setup line
/// does not parse, or when a node appears where it cannot be compiled.
pub fn compile(
    ast: &TemplateAst,
    name: &str,
    config: &EngineConfig,
    filters: Arc<FilterRegistry>,
) -> Result<CompiledTemplate, CompileError> {
    let source_hash = ast_hash(&ast.root)?;
    let mut compiler = Compiler::new(config);

    let render = match &ast.root {
        Node::Root { children } => compiler.compile_body(children)?,
        other => {
            return Err(malformed(
                other.kind_name(),
                "a template must start at a Root node",
                other.span(),
            ))
        }
    };

    debug!(
        template = name,
        hash = %source_hash,
        static_parts = compiler.static_parts.len(),
        components = compiler.component_names.len(),
        "compiled template"
    );

    Ok(CompiledTemplate {
        name: name.to_string(),
        source_hash,
        render,
        setup: compiler.setup,
        filters,
        undefined: config.undefined,
        static_parts: compiler.static_parts,
        bindings: compiler.bindings,
        events: compiler.events,
        component_names: compiler.component_names,
        imports: ast.imports.clone(),
    })
}

fn malformed(kind: &'static str, reason: impl Into<String>, span: Option<Span>) -> CompileError {
    let span = span.unwrap_or_default();
    CompileError::MalformedNode {
        kind,
        reason: reason.into(),
        line: span.line,
        column: span.column,
    }
}

fn invalid_expression(source: &str, err: ExprError, span: Span) -> CompileError {
    CompileError::InvalidExpression {
        source_text: source.trim().to_string(),
        reason: err.message,
        line: span.line,
        column: span.column,
    }
}

struct Compiler<'c> {
    config: &'c EngineConfig,
    static_parts: BTreeMap<String, String>,
    bindings: BTreeMap<String, String>,
    events: BTreeMap<String, String>,
    component_names: Vec<String>,
    setup: Vec<Assignment>,
}

impl<'c> Compiler<'c> {
    fn new(config: &'c EngineConfig) -> Self {
        Self {
            config,
            static_parts: BTreeMap::new(),
            bindings: BTreeMap::new(),
            events: BTreeMap::new(),
            component_names: Vec::new(),
            setup: Vec::new(),
        }
    }

    fn expr(&self, source: &str, span: Span) -> Result<Expr, CompileError> {
        parse_expr(source.trim()).map_err(|err| invalid_expression(source, err, span))
    }

    fn compile_body(&mut self, nodes: &[Node]) -> Result<Step, CompileError> {
        let mut pieces = Pieces::default();
        for node in nodes {
            self.compile_node(node, &mut pieces)?;
        }
        Ok(pieces.into_step())
    }

    fn compile_node(&mut self, node: &Node, out: &mut Pieces) -> Result<(), CompileError> {
        match node {
            Node::Text { content } | Node::Raw { content } => out.literal(content),
            Node::Comment { .. } => {}
            Node::SetupCode { content, span } => {
                self.setup.extend(parse_setup(content, span.line)?);
            }
            Node::Expression { source, span } => {
                let step = self.compile_expression(source, *span)?;
                out.dynamic(step);
            }
            Node::Element(el) if el.is_static => {
                let html = self.render_static(el)?;
                let key = format!("s{}", self.static_parts.len());
                out.literal(&html);
                self.static_parts.insert(key, html);
            }
            Node::Element(el) => self.compile_element(el, out)?,
            Node::If(cond) => {
                let step = self.compile_conditional(cond)?;
                out.dynamic(step);
            }
            Node::Elif(cond) => {
                return Err(malformed(
                    "Elif",
                    "`elif` outside an `if` chain",
                    Some(cond.span),
                ))
            }
            Node::Else { .. } => {
                return Err(malformed("Else", "`else` outside an `if` chain", None))
            }
            Node::For {
                iterator,
                children,
                span,
            } => {
                let step = self.compile_for(iterator, children, *span)?;
                out.dynamic(step);
            }
            Node::Component {
                name,
                attributes,
                bindings,
                children,
                span,
            } => {
                let step = self.compile_component(name, attributes, bindings, children, *span)?;
                out.dynamic(step);
            }
            Node::Slot { name, children } => {
                let fallback = self.compile_body(children)?;
                let name = name.clone();
                out.dynamic(step(move |frame| {
                    if let Some(html) = frame.ctx.slot(&name) {
                        frame.out.push_str(html);
                        return done(Ok(()));
                    }
                    fallback(frame)
                }));
            }
            Node::Block { name, children } => {
                let body = self.compile_body(children)?;
                let name = name.clone();
                out.dynamic(step(move |frame| {
                    if let Some(html) = frame.ctx.block(&name) {
                        frame.out.push_str(html);
                        frame.blocks.insert(name.clone(), html.to_string());
                        return done(Ok(()));
                    }
                    let body = Arc::clone(&body);
                    let name = name.clone();
                    async move {
                        let html = capture(frame, &body).await?;
                        frame.out.push_str(&html);
                        frame.blocks.insert(name, html);
                        Ok::<_, RenderError>(())
                    }
                    .boxed()
                }));
            }
            Node::Root { .. } => {
                return Err(malformed(
                    "Root",
                    "a Root node can only appear at the top of a template",
                    None,
                ))
            }
        }
        Ok(())
    }

    fn compile_expression(&self, source: &str, span: Span) -> Result<Step, CompileError> {
        let expr = self.expr(source, span)?;
        let escape = self.config.autoescape
            && !expr
                .terminal_filter()
                .is_some_and(|name| ESCAPING_FILTERS.contains(&name));
        Ok(step(move |frame| {
            let result = frame.eval(&expr).map(|value| {
                let text = value.to_display();
                if escape {
                    frame.out.push_str(&escape_html(&text));
                } else {
                    frame.out.push_str(&text);
                }
            });
            done(result)
        }))
    }

    // ---- elements ----

    /// `<tag` plus the static attributes.
    fn open_tag(&self, el: &Element) -> String {
        let mut html = format!("<{}", el.tag);
        for (name, value) in &el.attributes {
            match value {
                AttrValue::Flag => {
                    html.push_str(&format!(" {name}"));
                }
                AttrValue::Text(text) => {
                    html.push_str(&format!(" {name}=\"{}\"", escape_html(text)));
                }
            }
        }
        html
    }

    /// Event and ref attributes, then `>` or ` />`.
    fn tag_tail(&mut self, el: &Element) -> String {
        let mut html = String::new();
        for (event, handler) in &el.events {
            html.push_str(&format!(
                " {}{event}=\"{}\"",
                self.config.event_attribute_prefix,
                escape_html(handler)
            ));
            self.events.insert(event.clone(), handler.clone());
        }
        for reference in &el.refs {
            html.push_str(&format!(
                " {}=\"{}\"",
                self.config.ref_attribute,
                escape_html(reference)
            ));
        }
        html.push_str(if el.is_void() { " />" } else { ">" });
        html
    }

    fn check_void(&self, el: &Element) -> Result<(), CompileError> {
        if el.is_void() && !el.children.is_empty() {
            return Err(malformed(
                "Element",
                format!("void element <{}> cannot have children", el.tag),
                Some(el.span),
            ));
        }
        Ok(())
    }

    fn render_static(&mut self, el: &Element) -> Result<String, CompileError> {
        self.check_void(el)?;
        let mut html = self.open_tag(el);
        html.push_str(&self.tag_tail(el));
        if el.is_void() {
            return Ok(html);
        }
        for child in &el.children {
            match child {
                Node::Text { content } | Node::Raw { content } => html.push_str(content),
                Node::Comment { .. } => {}
                Node::SetupCode { content, span } => {
                    self.setup.extend(parse_setup(content, span.line)?);
                }
                Node::Element(inner) if inner.is_static => {
                    html.push_str(&self.render_static(inner)?);
                }
                other => {
                    return Err(malformed(
                        other.kind_name(),
                        format!("dynamic node inside static element <{}>", el.tag),
                        other.span().or(Some(el.span)),
                    ))
                }
            }
        }
        html.push_str(&format!("</{}>", el.tag));
        Ok(html)
    }

    fn compile_element(&mut self, el: &Element, out: &mut Pieces) -> Result<(), CompileError> {
        self.check_void(el)?;
        out.literal(&self.open_tag(el));

        if !el.bindings.is_empty() {
            let mut bindings = Vec::with_capacity(el.bindings.len());
            for (name, source) in &el.bindings {
                bindings.push((name.clone(), self.expr(source, el.span)?));
                self.bindings.insert(name.clone(), source.clone());
            }
            out.dynamic(step(move |frame| {
                let result = bindings
                    .iter()
                    .try_for_each(|(name, expr)| write_binding(frame, name, expr));
                done(result)
            }));
        }

        let tail = self.tag_tail(el);
        out.literal(&tail);
        if el.is_void() {
            return Ok(());
        }
        for child in &el.children {
            self.compile_node(child, out)?;
        }
        out.literal(&format!("</{}>", el.tag));
        Ok(())
    }

    // ---- control flow ----

    fn compile_conditional(&mut self, first: &Conditional) -> Result<Step, CompileError> {
        let mut branches: Vec<(Expr, Step)> = Vec::new();
        let mut otherwise: Option<Step> = None;
        let mut current = first;
        loop {
            let condition = self.expr(&current.condition, current.span)?;
            let body = self.compile_body(&current.children)?;
            branches.push((condition, body));
            match current.alternative.as_deref() {
                None => break,
                Some(Node::Elif(next)) => current = next,
                Some(Node::Else { children }) => {
                    otherwise = Some(self.compile_body(children)?);
                    break;
                }
                Some(other) => {
                    return Err(malformed(
                        other.kind_name(),
                        "an `if` chain can only continue with `elif` or `else`",
                        Some(current.span),
                    ))
                }
            }
        }

        Ok(step(move |frame| match choose_branch(frame, &branches) {
            Ok(Some(body)) => body(frame),
            Ok(None) => match &otherwise {
                Some(body) => body(frame),
                None => done(Ok(())),
            },
            Err(err) => done(Err(err)),
        }))
    }

    fn compile_for(
        &mut self,
        iterator: &str,
        children: &[Node],
        span: Span,
    ) -> Result<Step, CompileError> {
        let LoopTarget { targets, iterable } =
            parse_loop(iterator.trim()).map_err(|err| invalid_expression(iterator, err, span))?;
        let body = self.compile_body(children)?;

        Ok(step(move |frame| {
            let scopes = match loop_scopes(frame, &targets, &iterable) {
                Ok(scopes) => scopes,
                Err(err) => return done(Err(err)),
            };
            let body = Arc::clone(&body);
            async move {
                for scope in scopes {
                    frame.scopes.push(scope);
                    let result = body(frame).await;
                    frame.scopes.pop();
                    result?;
                }
                Ok::<_, RenderError>(())
            }
            .boxed()
        }))
    }

    // ---- composition ----

    fn compile_component(
        &mut self,
        name: &str,
        attributes: &indexmap::IndexMap<String, AttrValue>,
        bindings: &indexmap::IndexMap<String, String>,
        children: &[Node],
        span: Span,
    ) -> Result<Step, CompileError> {
        if !self.component_names.iter().any(|n| n == name) {
            self.component_names.push(name.to_string());
        }

        let static_props: Map<String, Value> = attributes
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    AttrValue::Flag => Value::Bool(true),
                    AttrValue::Text(text) => Value::String(text.clone()),
                };
                (key.clone(), value)
            })
            .collect();
        let mut bound_props = Vec::with_capacity(bindings.len());
        for (key, source) in bindings {
            bound_props.push((key.clone(), self.expr(source, span)?));
            self.bindings.insert(key.clone(), source.clone());
        }

        // Direct `{% slot name %}` children fill the component's named
        // slots. Everything else becomes the `default` slot.
        let mut parts: Vec<(Option<String>, Step)> = Vec::new();
        let mut pending = Pieces::default();
        for child in children {
            if let Node::Slot { name, children } = child {
                if !pending.is_empty() {
                    parts.push((None, std::mem::take(&mut pending).into_step()));
                }
                parts.push((Some(name.clone()), self.compile_body(children)?));
            } else {
                self.compile_node(child, &mut pending)?;
            }
        }
        if !pending.is_empty() {
            parts.push((None, pending.into_step()));
        }

        let parts = Arc::new(parts);
        let name = name.to_string();
        Ok(step(move |frame| {
            let parts = Arc::clone(&parts);
            let Some(component) = frame.ctx.component(&name).cloned() else {
                // Unknown component: render the body in place.
                return async move {
                    for (_, part) in parts.iter() {
                        part(frame).await?;
                    }
                    Ok::<_, RenderError>(())
                }
                .boxed();
            };

            let mut props = static_props.clone();
            for (key, expr) in &bound_props {
                match frame.eval(expr) {
                    Ok(value) => {
                        props.insert(key.clone(), value);
                    }
                    Err(err) => return done(Err(err)),
                }
            }

            let name = name.clone();
            async move {
                let mut ctx = Context::from(props);
                ctx.inherit_components(frame.ctx.components());
                let mut default = String::new();
                for (slot, part) in parts.iter() {
                    let html = capture(frame, part).await?;
                    match slot {
                        Some(slot) => ctx.insert_slot(slot.clone(), html),
                        None => default.push_str(&html),
                    }
                }
                if !default.trim().is_empty() {
                    ctx.insert_slot("default", default);
                }

                let html = component
                    .render_component(ctx)
                    .await
                    .map_err(|source| RenderError::Component {
                        name,
                        source: Box::new(source),
                    })?;
                frame.out.push_str(&html);
                Ok::<_, RenderError>(())
            }
            .boxed()
        }))
    }
}

fn choose_branch<'s>(
    frame: &Frame,
    branches: &'s [(Expr, Step)],
) -> Result<Option<&'s Step>, RenderError> {
    for (condition, body) in branches {
        if frame.eval(condition)?.is_truthy() {
            return Ok(Some(body));
        }
    }
    Ok(None)
}

/// Writes ` name="value"` for a bound attribute, or nothing for `null`.
///
/// `class` accepts a list (truthy items) or an object (keys with truthy
/// values); `style` accepts an object of property to value.
fn write_binding(frame: &mut Frame, name: &str, expr: &Expr) -> StepResult {
    let value = frame.eval(expr)?;
    let text = match (name, &value) {
        (_, Value::Null) => return Ok(()),
        ("class", Value::Array(items)) => items
            .iter()
            .filter(|item| item.is_truthy())
            .map(ValueExt::to_display)
            .collect::<Vec<_>>()
            .join(" "),
        ("class", Value::Object(map)) => map
            .iter()
            .filter(|(_, on)| on.is_truthy())
            .map(|(class, _)| class.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        ("style", Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(property, v)| format!("{property}: {};", v.to_display()))
            .collect::<Vec<_>>()
            .join(" "),
        _ => value.to_display(),
    };
    frame.out.push_str(&format!(" {name}=\"{}\"", escape_html(&text)));
    Ok(())
}

/// One variable scope per iteration, each holding the targets and `loop`.
fn loop_scopes(
    frame: &Frame,
    targets: &[String],
    iterable: &Expr,
) -> Result<Vec<Map<String, Value>>, RenderError> {
    let items: Vec<Value> = match frame.eval(iterable)? {
        Value::Array(items) => items,
        Value::Object(map) if targets.len() == 2 => map
            .into_iter()
            .map(|(key, value)| Value::Array(vec![Value::String(key), value]))
            .collect(),
        Value::Object(map) => map.into_iter().map(|(key, _)| Value::String(key)).collect(),
        Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
        Value::Null if frame.undefined == UndefinedBehavior::Lenient => Vec::new(),
        other => {
            return Err(RenderError::NotIterable {
                type_name: other.type_name(),
            })
        }
    };

    let length = items.len();
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let mut scope = Map::new();
            bind_targets(&mut scope, targets, item)?;
            scope.insert(
                "loop".to_string(),
                json!({
                    "index": index,
                    "index1": index + 1,
                    "first": index == 0,
                    "last": index + 1 == length,
                    "length": length,
                }),
            );
            Ok(scope)
        })
        .collect()
}

fn bind_targets(
    scope: &mut Map<String, Value>,
    targets: &[String],
    item: Value,
) -> Result<(), RenderError> {
    if let [target] = targets {
        scope.insert(target.clone(), item);
        return Ok(());
    }
    match item {
        Value::Array(values) if values.len() == targets.len() => {
            for (target, value) in targets.iter().zip(values) {
                scope.insert(target.clone(), value);
            }
            Ok(())
        }
        other => Err(RenderError::TypeMismatch {
            context: "loop unpacking",
            expected: "a pair",
            found: other.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyxm_syntax::parse;

    fn compile_source(source: &str) -> Result<CompiledTemplate, CompileError> {
        let ast = parse(source).expect("parses");
        compile(
            &ast,
            "test",
            &EngineConfig::default(),
            Arc::new(FilterRegistry::default()),
        )
    }

    async fn render(source: &str, ctx: Context) -> Result<String, RenderError> {
        compile_source(source).expect("compiles").render(ctx).await
    }

    // ==================== Metadata Tests ====================

    mod metadata {
        use super::*;

        #[test]
        fn collects_bindings_events_and_components() {
            let compiled = compile_source(
                r#"<button :title="label" @click="save()">x</button>
{% component Card :item="item" %}{% endcomponent %}
{% component Card %}{% endcomponent %}
{% component Badge %}{% endcomponent %}"#,
            )
            .unwrap();
            assert_eq!(compiled.bindings().get("title").unwrap(), "label");
            assert_eq!(compiled.bindings().get("item").unwrap(), "item");
            assert_eq!(compiled.events().get("click").unwrap(), "save()");
            assert_eq!(compiled.component_names(), ["Card", "Badge"]);
        }

        #[test]
        fn static_parts_are_outermost_static_elements() {
            let compiled = compile_source("<ul><li>a</li></ul>{{ x }}<p>b</p>").unwrap();
            let parts: Vec<_> = compiled.static_parts().values().cloned().collect();
            assert_eq!(parts, vec!["<ul><li>a</li></ul>", "<p>b</p>"]);
            assert!(compiled.static_parts().contains_key("s0"));
            assert!(compiled.static_parts().contains_key("s1"));
        }

        #[test]
        fn imports_are_exposed() {
            let compiled = compile_source("<setup>\nimport json\nx = 1\n</setup>").unwrap();
            assert_eq!(compiled.imports(), ["import json"]);
        }
    }

    // ==================== Error Tests ====================

    mod errors {
        use super::*;

        #[test]
        fn invalid_expression_cites_position() {
            let err = compile_source("<p>\n  {{ 1 + }}</p>").err().unwrap();
            match err {
                CompileError::InvalidExpression {
                    source_text, line, ..
                } => {
                    assert_eq!(source_text, "1 +");
                    assert_eq!(line, 2);
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn invalid_loop_header() {
            let err = compile_source("{% for x in %}{% endfor %}").err().unwrap();
            assert!(matches!(err, CompileError::InvalidExpression { .. }));
        }

        #[test]
        fn stray_elif_is_malformed() {
            let mut ast = parse("").unwrap();
            ast.root = Node::Root {
                children: vec![Node::Elif(Conditional {
                    condition: "x".into(),
                    children: vec![],
                    alternative: None,
                    span: Span::new(3, 1),
                })],
            };
            let err = compile(
                &ast,
                "t",
                &EngineConfig::default(),
                Arc::new(FilterRegistry::default()),
            )
            .err()
            .unwrap();
            assert!(matches!(
                err,
                CompileError::MalformedNode { kind: "Elif", line: 3, .. }
            ));
        }

        #[test]
        fn void_element_with_children_is_malformed() {
            let mut ast = parse("").unwrap();
            let mut el = Element::new("br", Span::new(1, 1));
            el.children.push(Node::text("x"));
            el.compute_static();
            ast.root = Node::Root {
                children: vec![Node::Element(el)],
            };
            let err = compile(
                &ast,
                "t",
                &EngineConfig::default(),
                Arc::new(FilterRegistry::default()),
            )
            .err()
            .unwrap();
            assert!(matches!(err, CompileError::MalformedNode { kind: "Element", .. }));
        }
    }

    // ==================== Render Tests ====================

    mod rendering {
        use super::*;

        #[test]
        fn render_sync_matches_async() {
            let compiled = compile_source("<p>{{ n + 1 }}</p>").expect("compiles");
            let html = compiled.render_sync(Context::new().with("n", 1)).unwrap();
            assert_eq!(html, "<p>2</p>");
        }

        #[tokio::test]
        async fn literal_runs_merge() {
            let html = render("a<b>c</b>{# gone #}d", Context::new()).await.unwrap();
            assert_eq!(html, "a<b>c</b>d");
        }

        #[tokio::test]
        async fn bindings_skip_null() {
            let html = render(
                r#"<a :href="url" :title="missing">x</a>"#,
                Context::new().with("url", "/x?a=1&b=2").with("missing", Value::Null),
            )
            .await
            .unwrap();
            assert_eq!(html, r#"<a href="/x?a=1&amp;b=2">x</a>"#);
        }

        #[tokio::test]
        async fn class_and_style_objects() {
            let html = render(
                r#"<div :class="{'on': active, 'off': not active}" :style="{'color': 'red'}"></div>"#,
                Context::new().with("active", true),
            )
            .await
            .unwrap();
            assert_eq!(html, r#"<div class="on" style="color: red;"></div>"#);
        }

        #[tokio::test]
        async fn events_and_refs() {
            let html = render(
                r#"<input @input="update(value)" #field>"#,
                Context::new(),
            )
            .await
            .unwrap();
            assert_eq!(html, r#"<input data-on-input="update(value)" data-ref="field" />"#);
        }

        #[tokio::test]
        async fn setup_names_shadow_context() {
            let html = render(
                "<setup>\ngreeting = 'hi ' ~ name\nname = 'setup'\n</setup>{{ greeting }} {{ name }}",
                Context::new().with("name", "ctx"),
            )
            .await
            .unwrap();
            assert_eq!(html, "hi ctx setup");
        }

        #[tokio::test]
        async fn loop_over_dict_pairs() {
            let html = render(
                "{% for k, v in d %}{{ k }}={{ v }};{% endfor %}",
                Context::new().with("d", json!({"a": 1, "b": 2})),
            )
            .await
            .unwrap();
            assert_eq!(html, "a=1;b=2;");
        }

        #[tokio::test]
        async fn loop_scope_is_popped() {
            let html = render(
                "{% for x in [1] %}{% endfor %}{{ x }}",
                Context::new().with("x", "outer"),
            )
            .await
            .unwrap();
            assert_eq!(html, "outer");
        }

        #[tokio::test]
        async fn not_iterable() {
            let err = render("{% for x in 3 %}{% endfor %}", Context::new())
                .await
                .unwrap_err();
            assert!(matches!(err, RenderError::NotIterable { type_name: "int" }));
        }

        #[tokio::test]
        async fn blocks_are_reported() {
            let compiled = compile_source("{% block title %}T{% endblock %}").unwrap();
            let (html, blocks) = compiled.render_with_blocks(Context::new()).await.unwrap();
            assert_eq!(html, "T");
            assert_eq!(blocks.get("title").map(String::as_str), Some("T"));
        }
    }
}
