//! # PYXM - Compiled HTML Templates
//!
//! `pyxm` compiles PYXM markup into a tree of render closures and renders it
//! asynchronously against a JSON-shaped context. Source is lexed and parsed
//! by [`pyxm-syntax`](syntax) and compiled once; the compiled form is cached
//! by name and content hash and shared between renders.
//!
//! ## Core Concepts
//!
//! - [`Template`]: a compiled template with inheritance and components
//! - [`Context`]: variables plus component, slot and block registries
//! - [`Environment`]: named templates sharing config, filters and a cache
//! - [`EngineConfig`]: escaping, undefined-name handling, cache size
//! - [`FilterRegistry`]: the `| name` functions expressions can call
//! - [`Renderable`]: anything usable as a component
//!
//! ## Quick Start
//!
//! ```rust
//! use pyxm::{Context, Template};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> pyxm::Result<()> {
//! let template = Template::compile(
//!     "list",
//!     r#"<ul>{% for item in items %}<li>{{ item | upper }}</li>{% endfor %}</ul>"#,
//! )?;
//!
//! let html = template
//!     .render(Context::new().with("items", json!(["a", "b"])))
//!     .await?;
//! assert_eq!(html, "<ul><li>A</li><li>B</li></ul>");
//! # Ok(())
//! # }
//! ```
//!
//! ## Blocking Renders
//!
//! [`Template::render_sync`], [`Environment::render_sync`] and
//! [`CompiledTemplate::render_sync`] drive the same future on the calling
//! thread for code that has no async runtime:
//!
//! ```rust
//! use pyxm::{Context, Template};
//!
//! let template = Template::compile("hello", "Hello, {{ who }}!").unwrap();
//! let html = template.render_sync(Context::new().with("who", "world")).unwrap();
//! assert_eq!(html, "Hello, world!");
//! ```
//!
//! ## Escaping
//!
//! Expression output is HTML-escaped unless the last filter is `safe` (or
//! `escape`, which already escaped it). Static markup is written verbatim.
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> pyxm::Result<()> {
//! use pyxm::{render, Context};
//!
//! let ctx = Context::new().with("html", "<b>hi</b>");
//! assert_eq!(render("{{ html }}", ctx.clone()).await?, "&lt;b&gt;hi&lt;/b&gt;");
//! assert_eq!(render("{{ html | safe }}", ctx).await?, "<b>hi</b>");
//! # Ok(())
//! # }
//! ```
//!
//! ## Hydration Metadata
//!
//! Elements with `:attr` bindings, `@event` handlers or `#ref` names are
//! rendered with plain attributes (`data-on-click="..."`, `data-ref="..."`)
//! and recorded on the [`CompiledTemplate`], which client code can use to
//! attach behaviour after the HTML arrives.

pub mod cache;
pub mod compiler;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod expr;
pub mod filters;
pub mod hash;
pub mod loader;
mod setup;
pub mod template;
pub mod value;

pub use pyxm_syntax as syntax;
pub use pyxm_syntax::UnknownStatements;

pub use cache::{LruCache, TemplateCache};
pub use compiler::{compile, CompiledTemplate};
pub use config::{EngineConfig, UndefinedBehavior};
pub use context::{Context, Renderable};
pub use environment::Environment;
pub use error::{BuildError, CompileError, FilterError, RenderError, Result, TemplateError};
pub use filters::{Filter, FilterRegistry};
pub use loader::{LoaderError, TemplateLoader};
pub use template::{render, render_file, CompileOptions, Template};
pub use value::{escape_html, ValueExt};
