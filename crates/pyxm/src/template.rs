//! The caller-facing template type.
//!
//! [`Template`] ties the pipeline together. It parses and compiles source
//! (or fetches the compiled form from a cache), then renders it with
//! inheritance and component composition applied.
//!
//! # Inheritance
//!
//! A child template declares `{% block name %}` overrides and points at its
//! parent with [`Template::extends`]. Rendering the child renders its own
//! body first to capture each block's output, then renders the parent with
//! those blocks as overrides. Chains of any depth resolve innermost first.
//!
//! ```rust
//! use pyxm::{Context, Template};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> pyxm::Result<()> {
//! let base = Template::compile(
//!     "base",
//!     "<title>{% block title %}Site{% endblock %}</title>",
//! )?;
//! let page = Template::compile("page", "{% block title %}About{% endblock %}")?
//!     .extends(base);
//!
//! assert_eq!(page.render(Context::new()).await?, "<title>About</title>");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use pyxm_syntax::parse_with;
use rapidhash::fast::RapidHasher;
use tracing::debug;

use crate::cache::TemplateCache;
use crate::compiler::{compile, CompiledTemplate};
use crate::config::EngineConfig;
use crate::context::{Context, Renderable};
use crate::error::{Result, TemplateError};
use crate::filters::FilterRegistry;
use crate::hash::cache_key;
use crate::loader::LoaderError;

/// Everything compilation depends on besides the source text.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub config: EngineConfig,
    pub filters: Arc<FilterRegistry>,
    /// Shared cache of compiled templates. `None` compiles every time.
    pub cache: Option<Arc<TemplateCache>>,
}

impl CompileOptions {
    /// Options for `config` with the built-in filters and a cache sized by
    /// `config.cache_capacity`.
    pub fn new(config: EngineConfig) -> Self {
        let cache = (config.cache_capacity > 0)
            .then(|| Arc::new(TemplateCache::new(config.cache_capacity)));
        Self {
            config,
            filters: Arc::new(FilterRegistry::with_builtins()),
            cache,
        }
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    pub fn with_cache(mut self, cache: Arc<TemplateCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Hash of the configuration and the registered filters.
    ///
    /// Filters are identified by name and by the shared function they hold,
    /// so replacing a filter changes the fingerprint.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = RapidHasher::default();
        self.config.hash(&mut hasher);
        for name in self.filters.names() {
            name.hash(&mut hasher);
            if let Some(filter) = self.filters.get(name) {
                (Arc::as_ptr(filter) as *const () as usize).hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Key under which a template compiled with these options is cached.
    pub fn cache_key(&self, name: &str, source: &str) -> String {
        cache_key(name, source, self.fingerprint())
    }
}

/// A compiled template ready to render.
///
/// Cloning is cheap: the compiled form and the parent are shared.
#[derive(Clone)]
pub struct Template {
    name: String,
    source: Arc<str>,
    compiled: Arc<CompiledTemplate>,
    parent: Option<Arc<Template>>,
    components: HashMap<String, Arc<dyn Renderable>>,
}

impl Template {
    /// Compiles `source` with default options and no cache.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Syntax`] if the source does not lex, parse or
    /// compile.
    pub fn compile(name: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        Self::compile_with(name, source, &CompileOptions::default())
    }

    /// Compiles `source`, reusing a cached compilation when the options
    /// carry a cache that already holds this name and source.
    ///
    /// Failed compilations are never cached.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Syntax`] if the source does not lex, parse or
    /// compile.
    pub fn compile_with(
        name: impl Into<String>,
        source: impl Into<String>,
        options: &CompileOptions,
    ) -> Result<Self> {
        let name = name.into();
        let source: Arc<str> = Arc::from(source.into());
        let key = options.cache_key(&name, &source);

        let cached = options.cache.as_ref().and_then(|cache| cache.get(&key));
        let compiled = match cached {
            Some(compiled) => {
                debug!(template = %name, key = %key, "template cache hit");
                compiled
            }
            None => {
                debug!(template = %name, key = %key, "template cache miss");
                let compiled = Arc::new(build(&name, &source, options)?);
                if let Some(cache) = &options.cache {
                    cache.set(key, Arc::clone(&compiled));
                }
                compiled
            }
        };

        Ok(Self {
            name,
            source,
            compiled,
            parent: None,
            components: HashMap::new(),
        })
    }

    /// Reads and compiles a template file. The path becomes the name.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::NotFound`] if the file does not exist,
    /// [`LoaderError::Read`] if it cannot be read, and
    /// [`TemplateError::Syntax`] if it does not compile.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_with(path, &CompileOptions::default())
    }

    pub fn from_file_with<P: AsRef<Path>>(path: P, options: &CompileOptions) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let source = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoaderError::NotFound { name: name.clone() }
            } else {
                LoaderError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::compile_with(name, source, options)
    }

    /// Sets the parent template whose blocks this template overrides.
    pub fn extends(mut self, parent: Template) -> Self {
        self.parent = Some(Arc::new(parent));
        self
    }

    /// Makes `component` available to `{% component name %}` in this
    /// template. A component of the same name passed in the render context
    /// takes precedence.
    pub fn register_component(
        &mut self,
        name: impl Into<String>,
        component: impl Renderable + 'static,
    ) -> &mut Self {
        self.components.insert(name.into(), Arc::new(component));
        self
    }

    /// Builder form of [`register_component`](Self::register_component).
    pub fn with_component(
        mut self,
        name: impl Into<String>,
        component: impl Renderable + 'static,
    ) -> Self {
        self.register_component(name, component);
        self
    }

    pub(crate) fn insert_shared_component(&mut self, name: &str, component: Arc<dyn Renderable>) {
        self.components
            .entry(name.to_string())
            .or_insert(component);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn compiled(&self) -> &Arc<CompiledTemplate> {
        &self.compiled
    }

    pub fn parent(&self) -> Option<&Template> {
        self.parent.as_deref()
    }

    /// Renders the template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Render`] naming the template that failed,
    /// which is the parent when the failure happens there.
    pub async fn render(&self, mut ctx: Context) -> Result<String> {
        ctx.inherit_components(self.components.iter());

        let parent_ctx = self.parent.as_ref().map(|_| ctx.clone());
        let (html, blocks) = self
            .compiled
            .render_with_blocks(ctx)
            .await
            .map_err(|err| TemplateError::render(&self.name, err))?;

        match (&self.parent, parent_ctx) {
            (Some(parent), Some(mut parent_ctx)) => {
                let mut overrides = parent_ctx.blocks().clone();
                overrides.extend(blocks);
                debug!(
                    template = %self.name,
                    parent = %parent.name,
                    blocks = overrides.len(),
                    "rendering parent template"
                );
                parent_ctx.set_blocks(overrides);
                // Boxed so that inheritance chains do not make this future
                // recursive.
                parent.render_component(parent_ctx).await
            }
            _ => Ok(html),
        }
    }

    /// Renders on the current thread, blocking until the output is ready.
    ///
    /// The future is driven without an async runtime, so components that
    /// need one (timers, runtime I/O) must be rendered with
    /// [`render`](Self::render) instead.
    pub fn render_sync(&self, ctx: Context) -> Result<String> {
        pollster::block_on(self.render(ctx))
    }
}

fn build(name: &str, source: &str, options: &CompileOptions) -> Result<CompiledTemplate> {
    let ast = parse_with(source, &options.config.parse_options())
        .map_err(|err| TemplateError::syntax(name, err))?;
    compile(&ast, name, &options.config, Arc::clone(&options.filters))
        .map_err(|err| TemplateError::syntax(name, err))
}

impl Renderable for Template {
    fn render_component(&self, ctx: Context) -> BoxFuture<'_, Result<String>> {
        self.render(ctx).boxed()
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut components: Vec<&String> = self.components.keys().collect();
        components.sort();
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("source_hash", &self.compiled.source_hash())
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("components", &components)
            .finish()
    }
}

/// Compiles and renders a source string in one step, without caching.
pub async fn render(source: &str, ctx: Context) -> Result<String> {
    Template::compile("string", source)?.render(ctx).await
}

/// Reads, compiles and renders a template file in one step.
pub async fn render_file<P: AsRef<Path>>(path: P, ctx: Context) -> Result<String> {
    Template::from_file(path)?.render(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LruCache;
    use serde_json::json;

    fn cached_options(capacity: usize) -> (CompileOptions, Arc<TemplateCache>) {
        let cache = Arc::new(LruCache::new(capacity));
        let options = CompileOptions::default().with_cache(Arc::clone(&cache));
        (options, cache)
    }

    // ==================== Compile Tests ====================

    mod compiling {
        use super::*;

        #[test]
        fn cache_hit_reuses_compiled_template() {
            let (options, cache) = cached_options(4);
            let a = Template::compile_with("t", "<p>{{ x }}</p>", &options).unwrap();
            let b = Template::compile_with("t", "<p>{{ x }}</p>", &options).unwrap();
            assert!(Arc::ptr_eq(a.compiled(), b.compiled()));
            assert_eq!(cache.len(), 1);
        }

        #[test]
        fn different_source_is_a_different_entry() {
            let (options, cache) = cached_options(4);
            Template::compile_with("t", "<p>a</p>", &options).unwrap();
            Template::compile_with("t", "<p>b</p>", &options).unwrap();
            assert_eq!(cache.len(), 2);
        }

        #[test]
        fn failures_are_not_cached() {
            let (options, cache) = cached_options(4);
            let err = Template::compile_with("bad", "<div></span>", &options).unwrap_err();
            assert!(matches!(err, TemplateError::Syntax { .. }));
            assert!(cache.is_empty());
        }

        #[test]
        fn compile_errors_are_syntax_errors() {
            let err = Template::compile("bad", "{{ 1 + }}").unwrap_err();
            assert!(matches!(err, TemplateError::Syntax { ref name, .. } if name == "bad"));
        }

        #[test]
        fn options_from_config() {
            let options = CompileOptions::new(EngineConfig::default().with_cache_capacity(3));
            assert_eq!(options.cache.as_ref().map(|c| c.capacity()), Some(3));
            let disabled = CompileOptions::new(EngineConfig::default().with_cache_capacity(0));
            assert!(disabled.cache.is_none());
        }
    }

    // ==================== Render Tests ====================

    mod rendering {
        use super::*;

        #[test]
        fn render_sync_with_inheritance_and_components() {
            let base = Template::compile("base", "<main>{% block body %}{% endblock %}</main>").unwrap();
            let badge = Template::compile("badge", "<b>{{ label }}</b>").unwrap();
            let page = Template::compile(
                "page",
                r#"{% block body %}{% component Badge label="hi" %}{% endcomponent %}{% endblock %}"#,
            )
            .unwrap()
            .with_component("Badge", badge)
            .extends(base);
            assert_eq!(
                page.render_sync(Context::new()).unwrap(),
                "<main><b>hi</b></main>"
            );
        }

        #[tokio::test]
        async fn render_errors_name_the_template() {
            let template = Template::compile("card", "{{ user.name }}").unwrap();
            let err = template.render(Context::new()).await.unwrap_err();
            assert!(matches!(err, TemplateError::Render { ref name, .. } if name == "card"));
        }

        #[tokio::test]
        async fn registered_component_renders() {
            let badge = Template::compile("badge", "<b>{{ label }}</b>").unwrap();
            let page = Template::compile(
                "page",
                r#"{% component Badge label="new" %}{% endcomponent %}"#,
            )
            .unwrap()
            .with_component("Badge", badge);
            let html = page.render(Context::new()).await.unwrap();
            assert_eq!(html, "<b>new</b>");
        }

        #[tokio::test]
        async fn context_component_wins() {
            let registered = Template::compile("a", "registered").unwrap();
            let passed = Template::compile("b", "passed").unwrap();
            let page = Template::compile("page", "{% component X %}{% endcomponent %}")
                .unwrap()
                .with_component("X", registered);
            let html = page
                .render(Context::new().with_component("X", passed))
                .await
                .unwrap();
            assert_eq!(html, "passed");
        }

        #[tokio::test]
        async fn parent_receives_context() {
            let base = Template::compile("base", "{{ site }}|{% block body %}{% endblock %}")
                .unwrap();
            let page = Template::compile("page", "{% block body %}{{ title }}{% endblock %}")
                .unwrap()
                .extends(base);
            let ctx = Context::new().with("site", "S").with("title", json!("T"));
            assert_eq!(page.render(ctx).await.unwrap(), "S|T");
        }

        #[tokio::test]
        async fn free_render_function() {
            let html = render("{{ n + 1 }}", Context::new().with("n", 1)).await.unwrap();
            assert_eq!(html, "2");
        }
    }
}
