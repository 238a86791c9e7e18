//! Exclusion pattern matching.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use dirscan_core::ScanError;

/// Matches relative paths against a set of exclusion patterns.
///
/// Patterns behave like shell `fnmatch`: `*` also matches `/`, and a
/// backslash is an ordinary character.
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    set: GlobSet,
}

impl ExcludeMatcher {
    /// Compile the given patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let normalized = normalize_pattern(pattern.as_ref());
            let glob = GlobBuilder::new(&normalized)
                .literal_separator(false)
                .backslash_escape(false)
                .build()
                .map_err(|e| ScanError::InvalidPattern {
                    pattern: pattern.as_ref().to_string(),
                    reason: e.kind().to_string(),
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ScanError::InvalidPattern {
            pattern: e.glob().unwrap_or_default().to_string(),
            reason: e.kind().to_string(),
        })?;
        Ok(Self { set })
    }

    /// Check a path relative to its tree root. The root itself is `.`.
    pub fn is_match(&self, relpath: &Path) -> bool {
        self.set.is_match(relpath)
    }
}

/// Strip a leading `./` and trailing `/` so patterns line up with the
/// relative paths produced by the walker.
pub fn normalize_pattern(pattern: &str) -> String {
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    let pattern = pattern.trim_end_matches('/');
    if pattern.is_empty() {
        ".".to_string()
    } else {
        pattern.to_string()
    }
}
