//! Local directory source.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::SourceError;
use crate::models::{Item, SourceConfig};

/// Flat listing of the regular files directly inside one directory.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    /// Directory to list
    root: PathBuf,

    /// Lowercased extensions without the dot; empty accepts everything
    extensions: Vec<String>,

    /// Glob patterns matched against the full path
    exclude: Vec<glob::Pattern>,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &SourceConfig) -> Result<Self, SourceError> {
        Self::new(root)
            .with_extensions(config.extensions.as_slice())
            .with_exclude_patterns(config.exclude_patterns.as_slice())
    }

    #[must_use]
    pub fn with_extensions<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        self.extensions = extensions
            .iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn with_exclude_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self, SourceError> {
        self.exclude = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p.as_ref())
                    .map_err(|_| SourceError::InvalidPattern(p.as_ref().to_string()))
            })
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List eligible files, sorted by file name.
    ///
    /// Subdirectories are not descended into and symlinks are never reported.
    pub fn enumerate(&self) -> Result<Vec<Item>, SourceError> {
        let unavailable = |reason: String| SourceError::Unavailable {
            path: self.root.clone(),
            reason,
        };

        let metadata = std::fs::metadata(&self.root).map_err(|e| unavailable(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(unavailable("not a directory".to_string()));
        }

        let mut items = Vec::new();
        let mut skipped = 0usize;

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| unavailable(e.to_string()))?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if self.is_eligible(path) {
                items.push(Item::new(path));
            } else {
                skipped += 1;
            }
        }

        debug!(
            root = %self.root.display(),
            found = items.len(),
            skipped,
            "enumerated source directory"
        );

        Ok(items)
    }

    fn is_eligible(&self, path: &Path) -> bool {
        if !self.extensions.is_empty() {
            let matches_ext = path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| self.extensions.contains(&ext));
            if !matches_ext {
                return false;
            }
        }

        let path_str = path.to_string_lossy();
        !self.exclude.iter().any(|p| p.matches(&path_str))
    }
}
