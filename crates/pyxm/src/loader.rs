//! Template lookup by name.
//!
//! [`TemplateLoader`] resolves a template name to its source text from two
//! kinds of sources:
//!
//! 1. Inline templates added with [`TemplateLoader::add_inline`], which take
//!    priority
//! 2. Template directories, searched in registration order
//!
//! # Name Resolution
//!
//! Within a directory a name is tried as given, then with each configured
//! extension appended (`.pyxm`, then `.html` by default). With directory
//! `./templates`:
//!
//! - `"home"` resolves to `./templates/home.pyxm`
//! - `"pages/about.html"` resolves to `./templates/pages/about.html`
//!
//! Names are relative paths. Absolute names and names containing `..` are
//! rejected, so a name can never escape its template directory.
//!
//! # Example
//!
//! ```rust
//! use pyxm::TemplateLoader;
//!
//! let mut loader = TemplateLoader::new();
//! loader.add_inline("greeting", "<p>Hello {{ name }}</p>");
//!
//! assert_eq!(loader.load("greeting").unwrap(), "<p>Hello {{ name }}</p>");
//! assert!(loader.load("missing").is_err());
//! ```

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::trace;

/// Extensions tried when a name does not resolve as given, in priority order.
pub const TEMPLATE_EXTENSIONS: &[&str] = &[".pyxm", ".html"];

/// Error type for template lookup.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// No source provides the template.
    #[error("template not found: \"{name}\"")]
    NotFound { name: String },

    /// The name is absolute or climbs out of the template directory.
    #[error("invalid template name \"{name}\": names must be relative paths without `..`")]
    InvalidName { name: String },

    /// A registered directory does not exist.
    #[error("template directory not found: {}", path.display())]
    DirectoryNotFound { path: PathBuf },

    /// The template file exists but could not be read.
    #[error("failed to read template \"{}\": {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where a resolved template's source lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTemplate {
    /// Source stored in memory.
    Inline(String),
    /// Source read from this file on load.
    File(PathBuf),
}

/// Resolves template names to source text.
#[derive(Debug, Clone)]
pub struct TemplateLoader {
    inline: HashMap<String, String>,
    dirs: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl Default for TemplateLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateLoader {
    /// Creates a loader with no sources and the default extensions.
    pub fn new() -> Self {
        Self {
            inline: HashMap::new(),
            dirs: Vec::new(),
            extensions: TEMPLATE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Replaces the extensions tried during resolution.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an inline template.
    ///
    /// Inline templates shadow file templates with the same name.
    pub fn add_inline(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.inline.insert(name.into(), source.into());
    }

    /// Adds a directory to search. Directories added earlier win.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::DirectoryNotFound`] if `path` is not a
    /// directory.
    pub fn add_template_dir<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LoaderError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(LoaderError::DirectoryNotFound {
                path: path.to_path_buf(),
            });
        }
        if !self.dirs.iter().any(|d| d == path) {
            self.dirs.push(path.to_path_buf());
        }
        Ok(())
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Finds where `name` comes from without reading it.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::InvalidName`] or [`LoaderError::NotFound`].
    pub fn resolve(&self, name: &str) -> Result<ResolvedTemplate, LoaderError> {
        if let Some(source) = self.inline.get(name) {
            return Ok(ResolvedTemplate::Inline(source.clone()));
        }

        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(LoaderError::InvalidName {
                name: name.to_string(),
            });
        }

        for dir in &self.dirs {
            let exact = dir.join(relative);
            if exact.is_file() {
                return Ok(ResolvedTemplate::File(exact));
            }
            for ext in &self.extensions {
                if name.ends_with(ext.as_str()) {
                    continue;
                }
                let candidate = dir.join(format!("{name}{ext}"));
                if candidate.is_file() {
                    return Ok(ResolvedTemplate::File(candidate));
                }
            }
        }

        Err(LoaderError::NotFound {
            name: name.to_string(),
        })
    }

    /// Returns the source text of `name`, reading it from disk if needed.
    ///
    /// # Errors
    ///
    /// Fails if the name cannot be resolved or the file cannot be read.
    pub fn load(&self, name: &str) -> Result<String, LoaderError> {
        match self.resolve(name)? {
            ResolvedTemplate::Inline(source) => Ok(source),
            ResolvedTemplate::File(path) => {
                trace!(template = name, path = %path.display(), "reading template file");
                std::fs::read_to_string(&path).map_err(|source| LoaderError::Read { path, source })
            }
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }
}
