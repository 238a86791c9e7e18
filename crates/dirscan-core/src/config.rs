//! Walk configuration types.

use derive_builder::Builder;
use globset::Glob;
use serde::{Deserialize, Serialize};

/// Configuration for a tandem walk.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct WalkConfig {
    /// Visit siblings in descending name order.
    #[builder(default = "false")]
    #[serde(default)]
    pub reverse: bool,

    /// Glob patterns matched against the relative path of each entry.
    #[builder(default)]
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Exclude entries living on another device than their tree's root.
    #[builder(default = "false")]
    #[serde(default)]
    pub one_filesystem: bool,

    /// Descend into directories present in only some of the trees.
    ///
    /// `None` picks the default: true for a single tree, false otherwise.
    #[builder(default)]
    #[serde(default)]
    pub traverse_one_sided: Option<bool>,

    /// Release each directory's children once they have been expanded.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub close_during: bool,

    /// Walk each root on its own, one after the other.
    #[builder(default = "false")]
    #[serde(default)]
    pub sequential: bool,
}

fn default_true() -> bool {
    true
}

impl WalkConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref excludes) = self.excludes {
            for pattern in excludes {
                Glob::new(pattern)
                    .map_err(|e| format!("Invalid exclude pattern '{pattern}': {e}"))?;
            }
        }
        Ok(())
    }
}

impl WalkConfig {
    /// Create a new walk config builder.
    pub fn builder() -> WalkConfigBuilder {
        WalkConfigBuilder::default()
    }

    /// Configuration with every option at its default.
    pub fn new() -> Self {
        Self {
            reverse: false,
            excludes: Vec::new(),
            one_filesystem: false,
            traverse_one_sided: None,
            close_during: true,
            sequential: false,
        }
    }

    /// Effective one-sided traversal flag for a walk over `tree_count` trees.
    pub fn one_sided_for(&self, tree_count: usize) -> bool {
        if tree_count < 2 {
            return true;
        }
        self.traverse_one_sided.unwrap_or(false)
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = WalkConfig::builder()
            .reverse(true)
            .excludes(vec!["*.o".to_string()])
            .build()
            .unwrap();

        assert!(config.reverse);
        assert!(config.close_during);
        assert_eq!(config.excludes, vec!["*.o"]);
    }

    #[test]
    fn test_config_rejects_bad_glob() {
        let result = WalkConfig::builder()
            .excludes(vec!["a[".to_string()])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_one_sided_default() {
        let config = WalkConfig::new();
        assert!(config.one_sided_for(1));
        assert!(!config.one_sided_for(2));

        let config = WalkConfig {
            traverse_one_sided: Some(true),
            ..WalkConfig::new()
        };
        assert!(config.one_sided_for(2));
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: WalkConfig = serde_json::from_str("{}").unwrap();
        assert!(config.close_during);
        assert!(!config.sequential);
    }
}
