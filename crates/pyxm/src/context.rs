//! Render context passed to compiled templates.
//!
//! A [`Context`] carries the variables expressions evaluate against plus
//! three typed registries used by composition:
//!
//! - **components**: name to [`Renderable`], looked up by
//!   `{% component Name %}`
//! - **slots**: name to rendered HTML, read by `{% slot name %}`
//! - **blocks**: name to rendered HTML, read by `{% block name %}` when a
//!   child template overrides it
//!
//! # Example
//!
//! ```rust
//! use pyxm::Context;
//! use serde_json::json;
//!
//! let ctx = Context::new()
//!     .with("title", "Home")
//!     .with("items", json!([1, 2, 3]))
//!     .with_slot("footer", "<small>fin</small>");
//!
//! assert_eq!(ctx.get("title"), Some(&json!("Home")));
//! assert_eq!(ctx.slot("footer"), Some("<small>fin</small>"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::TemplateError;

/// Anything that can be rendered as a component.
///
/// [`Template`](crate::Template) implements this. A blanket implementation
/// covers async closures, which is handy for components backed by code
/// rather than markup:
///
/// ```rust
/// use pyxm::{Context, Renderable, TemplateError};
///
/// let badge = |ctx: Context| async move {
///     let label = ctx.get("label").and_then(|v| v.as_str()).unwrap_or("?").to_string();
///     Ok::<_, TemplateError>(format!("<span class=\"badge\">{label}</span>"))
/// };
/// let _: &dyn Renderable = &badge;
/// ```
pub trait Renderable: Send + Sync {
    /// Renders with `ctx`, which holds the props, the caller's components
    /// and the `default` slot.
    fn render_component(&self, ctx: Context) -> BoxFuture<'_, Result<String, TemplateError>>;
}

impl<F, Fut> Renderable for F
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, TemplateError>> + Send + 'static,
{
    fn render_component(&self, ctx: Context) -> BoxFuture<'_, Result<String, TemplateError>> {
        (self)(ctx).boxed()
    }
}

/// Variables and composition registries for one render.
#[derive(Clone, Default)]
pub struct Context {
    vars: Map<String, Value>,
    components: HashMap<String, Arc<dyn Renderable>>,
    slots: HashMap<String, String>,
    blocks: HashMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from any value that serializes to a JSON object.
    ///
    /// # Errors
    ///
    /// Fails if serialization fails or the value is not an object.
    pub fn from_serialize<T: Serialize>(data: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(data)? {
            Value::Object(vars) => Ok(Self::from(vars)),
            other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "template context must serialize to an object, got {other}"
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Adds a variable, returning `self` for chaining.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.vars
    }

    /// Inserts every entry of `vars` that is not already set.
    pub fn merge_defaults(&mut self, vars: &Map<String, Value>) {
        for (name, value) in vars {
            if !self.vars.contains_key(name) {
                self.vars.insert(name.clone(), value.clone());
            }
        }
    }

    // ---- components ----

    pub fn component(&self, name: &str) -> Option<&Arc<dyn Renderable>> {
        self.components.get(name)
    }

    pub fn insert_component(&mut self, name: impl Into<String>, component: Arc<dyn Renderable>) {
        self.components.insert(name.into(), component);
    }

    pub fn with_component(
        mut self,
        name: impl Into<String>,
        component: impl Renderable + 'static,
    ) -> Self {
        self.insert_component(name, Arc::new(component));
        self
    }

    /// Adds each component whose name is not registered yet.
    pub fn inherit_components<'a, I>(&mut self, components: I)
    where
        I: IntoIterator<Item = (&'a String, &'a Arc<dyn Renderable>)>,
    {
        for (name, component) in components {
            self.components
                .entry(name.clone())
                .or_insert_with(|| Arc::clone(component));
        }
    }

    pub fn components(&self) -> &HashMap<String, Arc<dyn Renderable>> {
        &self.components
    }

    // ---- slots ----

    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }

    pub fn insert_slot(&mut self, name: impl Into<String>, html: impl Into<String>) {
        self.slots.insert(name.into(), html.into());
    }

    pub fn with_slot(mut self, name: impl Into<String>, html: impl Into<String>) -> Self {
        self.insert_slot(name, html);
        self
    }

    // ---- blocks ----

    pub fn block(&self, name: &str) -> Option<&str> {
        self.blocks.get(name).map(String::as_str)
    }

    pub fn insert_block(&mut self, name: impl Into<String>, html: impl Into<String>) {
        self.blocks.insert(name.into(), html.into());
    }

    pub fn with_block(mut self, name: impl Into<String>, html: impl Into<String>) -> Self {
        self.insert_block(name, html);
        self
    }

    pub fn blocks(&self) -> &HashMap<String, String> {
        &self.blocks
    }

    pub(crate) fn set_blocks(&mut self, blocks: HashMap<String, String>) {
        self.blocks = blocks;
    }
}

impl From<Map<String, Value>> for Context {
    fn from(vars: Map<String, Value>) -> Self {
        Self {
            vars,
            ..Self::default()
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut components: Vec<&String> = self.components.keys().collect();
        components.sort();
        f.debug_struct("Context")
            .field("vars", &self.vars)
            .field("components", &components)
            .field("slots", &self.slots)
            .field("blocks", &self.blocks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Page {
        title: String,
        count: u32,
    }

    #[test]
    fn from_serialize_struct() {
        let ctx = Context::from_serialize(&Page {
            title: "Hi".into(),
            count: 2,
        })
        .unwrap();
        assert_eq!(ctx.get("title"), Some(&json!("Hi")));
        assert_eq!(ctx.get("count"), Some(&json!(2)));
    }

    #[test]
    fn from_serialize_rejects_non_objects() {
        assert!(Context::from_serialize(&vec![1, 2]).is_err());
    }

    #[test]
    fn merge_defaults_keeps_existing() {
        let mut ctx = Context::new().with("a", 1);
        let defaults = json!({"a": 0, "b": 2});
        ctx.merge_defaults(defaults.as_object().unwrap());
        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(ctx.get("b"), Some(&json!(2)));
    }

    #[test]
    fn inherit_components_keeps_existing() {
        let own = |_: Context| async { Ok::<_, TemplateError>("own".to_string()) };
        let other = |_: Context| async { Ok::<_, TemplateError>("other".to_string()) };
        let parent = Context::new()
            .with_component("Card", other)
            .with_component("Icon", other);
        let mut ctx = Context::new().with_component("Card", own);
        ctx.inherit_components(parent.components());
        assert_eq!(ctx.components().len(), 2);
    }

    #[test]
    fn debug_lists_component_names() {
        let ctx = Context::new()
            .with_component("B", |_: Context| async { Ok::<_, TemplateError>(String::new()) })
            .with_slot("default", "x");
        let debug = format!("{ctx:?}");
        assert!(debug.contains("\"B\""));
        assert!(debug.contains("default"));
    }

    #[tokio::test]
    async fn closure_components_render() {
        let ctx = Context::new().with_component("Hello", |ctx: Context| async move {
            let name = ctx.get("name").cloned().unwrap_or(Value::Null);
            Ok::<_, TemplateError>(format!("hello {name}"))
        });
        let component = ctx.component("Hello").unwrap();
        let html = component
            .render_component(Context::new().with("name", "ada"))
            .await
            .unwrap();
        assert_eq!(html, "hello \"ada\"");
    }
}
