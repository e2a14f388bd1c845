//! Paths the endpoint never reports: its own marker files, OS litter, and
//! editor temporaries, plus user patterns in gitignore syntax.

use crate::identity::MARKER_FILE;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tandem_core::{Result, TandemError};
use tracing::debug;

/// Patterns applied on top of whatever the user configures.
const DEFAULT_PATTERNS: &[&str] = &[
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    "*.swp",
    "*.swx",
    "*~",
    "~$*",
    ".~lock.*#",
];

/// Compiled ignore patterns, matched against canonical paths.
#[derive(Debug, Clone)]
pub struct IgnoreList {
    matcher: Gitignore,
}

impl IgnoreList {
    /// Built-in patterns followed by `extra`.
    pub fn new(extra: &[String]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new("/");
        let builtin = std::iter::once(MARKER_FILE).chain(DEFAULT_PATTERNS.iter().copied());
        for pattern in builtin.chain(extra.iter().map(String::as_str)) {
            builder
                .add_line(None, pattern)
                .map_err(|e| TandemError::config(format!("Invalid ignore pattern '{}': {}", pattern, e)))?;
        }
        let matcher = builder
            .build()
            .map_err(|e| TandemError::config(format!("Failed to build ignore list: {}", e)))?;
        debug!("Ignore list compiled with {} patterns", matcher.num_ignores());
        Ok(Self { matcher })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(&[])
    }

    /// Whether `path` or one of its ancestors matches.
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }

    /// Whether `path` is ignored as a file or as a directory, for paths whose
    /// type cannot be known any more.
    pub fn is_ignored_any(&self, path: &str) -> bool {
        self.is_ignored(path, false) || self.is_ignored(path, true)
    }
}
