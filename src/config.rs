// src/config.rs
//! Engine configuration.
//!
//! Loaded with priority (lowest first): built-in defaults, a TOML file,
//! environment variables. The binary applies CLI flags on top.

use crate::error::{AlignError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Canonical number of verse references in a scripture corpus.
pub const CANONICAL_VREF_COUNT: usize = 41_899;

pub const CACHE_DIR_ENV: &str = "VERSE_ALIGN_CACHE_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Jaccard similarity a pair must exceed to enter the match dictionary.
    pub jaccard_threshold: f64,
    /// Co-occurrence count a pair must exceed to enter the match dictionary.
    pub count_threshold: u32,
    /// Top-source scores below this are checked against baselines.
    pub missing_threshold: f64,
    /// Translation scores below this are treated as absent.
    pub translation_floor: f64,
    pub is_bible: bool,
    /// Rebuild caches even when a persisted copy exists.
    pub refresh: bool,
    pub cache_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jaccard_threshold: 0.05,
            count_threshold: 0,
            missing_threshold: 0.1,
            translation_floor: 1e-5,
            is_bible: false,
            refresh: false,
            cache_dir: PathBuf::from(".align_cache"),
        }
    }
}

impl EngineConfig {
    /// Defaults, overlaid by `path` when given, overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.is_empty() {
                config.cache_dir = PathBuf::from(dir);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AlignError::io(path, e))?;
        toml::from_str(&content)
            .map_err(|e| AlignError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.jaccard_threshold) {
            return Err(AlignError::Config(format!(
                "jaccard_threshold must be within [0, 1], got {}",
                self.jaccard_threshold
            )));
        }
        if self.missing_threshold < 0.0 {
            return Err(AlignError::Config(format!(
                "missing_threshold must be non-negative, got {}",
                self.missing_threshold
            )));
        }
        if self.translation_floor < 0.0 {
            return Err(AlignError::Config(format!(
                "translation_floor must be non-negative, got {}",
                self.translation_floor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str("jaccard_threshold = 0.4\nis_bible = true\n").unwrap();
        assert_eq!(config.jaccard_threshold, 0.4);
        assert!(config.is_bible);
        assert_eq!(config.count_threshold, 0);
        assert_eq!(config.missing_threshold, 0.1);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let config = EngineConfig { jaccard_threshold: 1.5, ..EngineConfig::default() };
        assert!(matches!(config.validate(), Err(AlignError::Config(_))));
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("align.toml");
        std::fs::write(&path, "count_threshold = 3\ncache_dir = \"/tmp/x\"\n").unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.count_threshold, 3);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/x"));
    }
}
