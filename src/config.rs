//! Configuration loading and management
//!
//! Handles parsing of `todo.toml` configuration files kept next to the
//! data file. A missing file yields defaults; a malformed file is an error.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the optional config file, looked up next to the data file
pub const CONFIG_FILE: &str = "todo.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Task id generation
    #[serde(default)]
    pub ids: IdConfig,

    /// Undo history
    #[serde(default)]
    pub history: HistoryConfig,

    /// Search scoring
    #[serde(default)]
    pub search: SearchConfig,

    /// Persistence behavior
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ids: IdConfig::default(),
            history: HistoryConfig::default(),
            search: SearchConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

/// Task id configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdConfig {
    /// Prefix for generated task ids
    #[serde(default = "default_id_prefix")]
    pub prefix: String,

    /// Minimum random suffix length for generated ids
    #[serde(default = "default_id_min_len")]
    pub min_len: usize,
}

fn default_id_prefix() -> String {
    "task".to_string()
}

fn default_id_min_len() -> usize {
    4
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            prefix: default_id_prefix(),
            min_len: default_id_min_len(),
        }
    }
}

/// Undo history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum retained operation records; oldest are evicted beyond this
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    100
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

/// Search scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Weight applied to title matches
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,

    /// Weight applied to description matches
    #[serde(default = "default_description_weight")]
    pub description_weight: f64,

    /// Weight applied to tag matches
    #[serde(default = "default_tags_weight")]
    pub tags_weight: f64,

    /// Results scoring below this are dropped (suggestions kick in)
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    /// Regex patterns longer than this are rejected
    #[serde(default = "default_max_pattern_len")]
    pub max_pattern_len: usize,

    /// Number of fallback suggestions when nothing clears the threshold
    #[serde(default = "default_suggestion_count")]
    pub suggestion_count: usize,
}

fn default_title_weight() -> f64 {
    0.5
}

fn default_description_weight() -> f64 {
    0.3
}

fn default_tags_weight() -> f64 {
    0.2
}

fn default_min_score() -> f64 {
    0.3
}

fn default_max_pattern_len() -> usize {
    256
}

fn default_suggestion_count() -> usize {
    3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            title_weight: default_title_weight(),
            description_weight: default_description_weight(),
            tags_weight: default_tags_weight(),
            min_score: default_min_score(),
            max_pattern_len: default_max_pattern_len(),
            suggestion_count: default_suggestion_count(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Write through to disk on every mutation (vs explicit batch flush)
    #[serde(default = "default_immediate")]
    pub immediate: bool,

    /// Lock acquisition timeout in milliseconds
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_immediate() -> bool {
    true
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            immediate: default_immediate(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `todo.toml` in the given directory.
    ///
    /// Returns defaults if the file does not exist.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.ids.prefix.trim().is_empty() {
            return Err(Error::InvalidConfig("ids.prefix must not be empty".into()));
        }
        if self.history.max_depth == 0 {
            return Err(Error::InvalidConfig(
                "history.max_depth must be at least 1".into(),
            ));
        }
        let weights = [
            self.search.title_weight,
            self.search.description_weight,
            self.search.tags_weight,
        ];
        if weights.iter().any(|w| *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(Error::InvalidConfig(
                "search weights must be non-negative and sum above zero".into(),
            ));
        }
        Ok(())
    }
}
