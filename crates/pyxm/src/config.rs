//! Engine configuration.
//!
//! [`EngineConfig`] can be built in code or loaded from YAML. Every field has
//! a default, so a YAML document only needs the keys it changes:
//!
//! ```rust
//! use pyxm::{EngineConfig, UndefinedBehavior};
//!
//! let config = EngineConfig::from_yaml("
//! cache_capacity: 16
//! undefined: lenient
//! ").unwrap();
//!
//! assert_eq!(config.cache_capacity, 16);
//! assert_eq!(config.undefined, UndefinedBehavior::Lenient);
//! assert!(config.autoescape);
//! ```

use serde::{Deserialize, Serialize};

use pyxm_syntax::{ParseOptions, UnknownStatements};

/// What an expression yields for a name or attribute that does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndefinedBehavior {
    /// Fail the render with [`RenderError::UndefinedVariable`](crate::RenderError::UndefinedVariable)
    /// or [`RenderError::UndefinedAttribute`](crate::RenderError::UndefinedAttribute).
    #[default]
    Strict,
    /// Evaluate to `null`, which renders as the empty string.
    Lenient,
}

/// Compile and render settings shared by every template of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of compiled templates kept in the cache. `0` disables
    /// caching.
    pub cache_capacity: usize,
    pub unknown_statements: UnknownStatements,
    pub undefined: UndefinedBehavior,
    /// HTML-escape the output of `{{ }}` expressions.
    pub autoescape: bool,
    /// Prefix of the attribute emitted for `@event` bindings.
    pub event_attribute_prefix: String,
    /// Attribute emitted for `#ref` references.
    pub ref_attribute: String,
    /// Extensions the loader tries, in order, when a name has none.
    pub template_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            unknown_statements: UnknownStatements::Strict,
            undefined: UndefinedBehavior::Strict,
            autoescape: true,
            event_attribute_prefix: "data-on-".to_string(),
            ref_attribute: "data-ref".to_string(),
            template_extensions: vec![".pyxm".to_string(), ".html".to_string()],
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from YAML. Missing keys keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_unknown_statements(mut self, behavior: UnknownStatements) -> Self {
        self.unknown_statements = behavior;
        self
    }

    pub fn with_undefined(mut self, behavior: UndefinedBehavior) -> Self {
        self.undefined = behavior;
        self
    }

    pub fn with_autoescape(mut self, autoescape: bool) -> Self {
        self.autoescape = autoescape;
        self
    }

    pub fn with_event_attribute_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.event_attribute_prefix = prefix.into();
        self
    }

    pub fn with_ref_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.ref_attribute = attribute.into();
        self
    }

    pub fn with_template_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.template_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Parser settings derived from this configuration.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::default().unknown_statements(self.unknown_statements)
    }
}
