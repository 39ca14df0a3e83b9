//! Input options for trace filtering.

use std::path::{Path, PathBuf};

/// Options for filtering a tracefile.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Directory that relative `SF:` paths are resolved against
    /// (None = the working directory)
    pub source_root: Option<PathBuf>,
    /// Memoize conditional lines per resolved source path
    pub cache_sources: bool,
}

impl FilterOptions {
    /// Create new default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative source paths against `root`.
    pub fn source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Reuse the conditional lines of a source file seen earlier in the run.
    pub fn cache_sources(mut self, enabled: bool) -> Self {
        self.cache_sources = enabled;
        self
    }

    /// Map an `SF:` path to the path that is actually read.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.source_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}
