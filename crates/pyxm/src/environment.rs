//! Named templates with shared configuration.
//!
//! An [`Environment`] owns everything rendering by name needs: the
//! configuration, a [`TemplateLoader`], global variables, the filter
//! registry, components available to every template and the compiled
//! template cache. Nothing is process-wide; two environments never share
//! state unless the caller shares it.
//!
//! # Example
//!
//! ```rust
//! use pyxm::{Context, Environment};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> pyxm::Result<()> {
//! let mut env = Environment::new();
//! env.add_global("site", "Example");
//! env.add_template("home", "<h1>{{ site }}: {{ title }}</h1>");
//!
//! let html = env.render("home", Context::new().with("title", "Welcome")).await?;
//! assert_eq!(html, "<h1>Example: Welcome</h1>");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::cache::TemplateCache;
use crate::config::EngineConfig;
use crate::context::{Context, Renderable};
use crate::error::{FilterError, Result};
use crate::filters::FilterRegistry;
use crate::loader::{LoaderError, TemplateLoader};
use crate::template::{CompileOptions, Template};

/// A set of named templates sharing configuration, filters and a cache.
pub struct Environment {
    options: CompileOptions,
    loader: TemplateLoader,
    globals: Map<String, Value>,
    components: HashMap<String, Arc<dyn Renderable>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Creates an environment with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let loader =
            TemplateLoader::new().with_extensions(config.template_extensions.iter().cloned());
        Self {
            options: CompileOptions::new(config),
            loader,
            globals: Map::new(),
            components: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.options.config
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.options.filters
    }

    /// The compiled template cache, if caching is enabled.
    pub fn cache(&self) -> Option<&Arc<TemplateCache>> {
        self.options.cache.as_ref()
    }

    pub fn loader(&self) -> &TemplateLoader {
        &self.loader
    }

    /// Adds an in-memory template. It shadows files with the same name.
    pub fn add_template(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.loader.add_inline(name, source);
    }

    /// Adds a directory to search for template files.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::DirectoryNotFound`] if `path` is not a
    /// directory.
    pub fn add_template_dir<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> std::result::Result<(), LoaderError> {
        self.loader.add_template_dir(path)
    }

    /// Sets a variable visible to every render. Context variables with the
    /// same name take precedence.
    pub fn add_global(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }

    pub fn globals(&self) -> &Map<String, Value> {
        &self.globals
    }

    /// Registers a filter, replacing any existing filter of that name.
    ///
    /// Compiled templates keep the registry they were compiled with, so the
    /// cache is cleared.
    pub fn add_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value, &[Value]) -> std::result::Result<Value, FilterError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(filter = %name, "registering filter");
        Arc::make_mut(&mut self.options.filters).register(name, filter);
        if let Some(cache) = &self.options.cache {
            cache.clear();
        }
    }

    /// Makes a component available to every template in this environment.
    pub fn register_component(
        &mut self,
        name: impl Into<String>,
        component: impl Renderable + 'static,
    ) -> &mut Self {
        self.components.insert(name.into(), Arc::new(component));
        self
    }

    /// Loads and compiles a template by name.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Loader`](crate::TemplateError::Loader) if the
    /// name does not resolve and
    /// [`TemplateError::Syntax`](crate::TemplateError::Syntax) if it does not
    /// compile.
    pub fn get_template(&self, name: &str) -> Result<Template> {
        let source = self.loader.load(name)?;
        self.template_from_str(name, source)
    }

    /// Compiles `source` under `name` with this environment's options and
    /// components.
    pub fn template_from_str(
        &self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Template> {
        let mut template = Template::compile_with(name, source, &self.options)?;
        for (name, component) in &self.components {
            template.insert_shared_component(name, Arc::clone(component));
        }
        Ok(template)
    }

    /// Renders a named template with the globals merged under `ctx`.
    pub async fn render(&self, name: &str, mut ctx: Context) -> Result<String> {
        let template = self.get_template(name)?;
        ctx.merge_defaults(&self.globals);
        template.render(ctx).await
    }

    /// Blocking form of [`render`](Self::render).
    pub fn render_sync(&self, name: &str, ctx: Context) -> Result<String> {
        pollster::block_on(self.render(name, ctx))
    }

    /// Renders a source string with the globals merged under `ctx`.
    pub async fn render_str(&self, source: &str, mut ctx: Context) -> Result<String> {
        let template = self.template_from_str("string", source)?;
        ctx.merge_defaults(&self.globals);
        template.render(ctx).await
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut components: Vec<&String> = self.components.keys().collect();
        components.sort();
        f.debug_struct("Environment")
            .field("options", &self.options)
            .field("loader", &self.loader)
            .field("globals", &self.globals)
            .field("components", &components)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    // ==================== Lookup Tests ====================

    mod lookup {
        use super::*;

        #[test]
        fn missing_template_is_a_loader_error() {
            let env = Environment::new();
            let err = env.get_template("nope").unwrap_err();
            assert!(matches!(
                err,
                TemplateError::Loader(LoaderError::NotFound { .. })
            ));
        }

        #[tokio::test]
        async fn directory_templates_use_extensions() {
            let dir = TempDir::new().unwrap();
            fs::create_dir(dir.path().join("pages")).unwrap();
            fs::write(dir.path().join("pages/about.pyxm"), "<p>{{ who }}</p>").unwrap();

            let mut env = Environment::new();
            env.add_template_dir(dir.path()).unwrap();
            let html = env
                .render("pages/about", Context::new().with("who", "us"))
                .await
                .unwrap();
            assert_eq!(html, "<p>us</p>");
        }

        #[tokio::test]
        async fn inline_shadows_files() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("home.html"), "file").unwrap();

            let mut env = Environment::new();
            env.add_template_dir(dir.path()).unwrap();
            env.add_template("home", "inline");
            assert_eq!(env.render("home", Context::new()).await.unwrap(), "inline");
        }
    }

    // ==================== Render Tests ====================

    mod rendering {
        use super::*;

        #[tokio::test]
        async fn context_overrides_globals() {
            let mut env = Environment::new();
            env.add_global("who", "global");
            env.add_global("site", "S");
            env.add_template("t", "{{ site }}/{{ who }}");
            let html = env
                .render("t", Context::new().with("who", "local"))
                .await
                .unwrap();
            assert_eq!(html, "S/local");
        }

        #[tokio::test]
        async fn custom_filter_clears_cache() {
            let mut env = Environment::new();
            env.add_template("t", "{{ 'x' | shout }}");
            assert!(env.render("t", Context::new()).await.is_err());
            assert_eq!(env.cache().map(|c| c.len()), Some(1));

            env.add_filter("shout", |v: &Value, _: &[Value]| {
                Ok(json!(format!("{}!", v.as_str().unwrap_or_default())))
            });
            assert_eq!(env.cache().map(|c| c.len()), Some(0));
            assert_eq!(env.render("t", Context::new()).await.unwrap(), "x!");
        }

        #[tokio::test]
        async fn environment_components() {
            let mut env = Environment::new();
            let badge = env.template_from_str("badge", "<b>{{ label }}</b>").unwrap();
            env.register_component("Badge", badge);
            env.add_template(
                "page",
                r#"<div>{% component Badge label="hi" %}{% endcomponent %}</div>"#,
            );
            let html = env.render("page", Context::new()).await.unwrap();
            assert_eq!(html, "<div><b>hi</b></div>");
        }

        #[test]
        fn render_sync_uses_globals() {
            let mut env = Environment::new();
            env.add_global("site", "S");
            env.add_template("t", "<title>{{ site }}</title>");
            assert_eq!(
                env.render_sync("t", Context::new()).unwrap(),
                "<title>S</title>"
            );
        }

        #[tokio::test]
        async fn lenient_config() {
            let config = EngineConfig::default().with_undefined(crate::UndefinedBehavior::Lenient);
            let env = Environment::with_config(config);
            let html = env.render_str("[{{ missing }}]", Context::new()).await.unwrap();
            assert_eq!(html, "[]");
        }
    }
}
