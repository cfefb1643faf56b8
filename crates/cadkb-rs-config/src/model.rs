//! Configuration schema for the knowledge store.

use crate::ConfigError;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory under the home directory holding user config and data.
pub const DEFAULT_HOME_DIR: &str = ".cadkb";
/// Subdirectory holding the record database.
const DEFAULT_STORAGE_SUBDIR: &str = "knowledge";

/// Root config for the knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KnowledgeConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub recall: RecallConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl KnowledgeConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> KnowledgeConfigBuilder {
        KnowledgeConfigBuilder::new()
    }

    /// Resolve the storage directory.
    ///
    /// Relative `store.path` values resolve against `cwd`; without a path the
    /// store lives in `~/.cadkb/knowledge`, falling back to `cwd/.cadkb/knowledge`.
    pub fn storage_dir(&self, cwd: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(path) = self.store.path.as_deref() {
            let trimmed = path.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::UnresolvedStorage(
                    "store.path is empty".to_string(),
                ));
            }
            let path = PathBuf::from(trimmed);
            return Ok(if path.is_absolute() {
                path
            } else {
                cwd.join(path)
            });
        }
        let base = BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .unwrap_or_else(|| cwd.to_path_buf());
        Ok(base.join(DEFAULT_HOME_DIR).join(DEFAULT_STORAGE_SUBDIR))
    }
}

/// Builder for assembling a `KnowledgeConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct KnowledgeConfigBuilder {
    config: KnowledgeConfig,
}

impl KnowledgeConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: KnowledgeConfig::default(),
        }
    }

    /// Replace the store configuration.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Replace the embedding configuration.
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    /// Replace the recall configuration.
    pub fn recall(mut self, recall: RecallConfig) -> Self {
        self.config.recall = recall;
        self
    }

    /// Replace the analysis configuration.
    pub fn analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.config.analysis = analysis;
        self
    }

    /// Finalize and return the built `KnowledgeConfig`.
    pub fn build(self) -> KnowledgeConfig {
        self.config
    }
}

/// Record store location and locking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Default wait on a database lock held by another process.
fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Embedding provider selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local deterministic feature hashing.
    #[default]
    Hashing,
    /// Remote embedding endpoint over HTTP.
    Http,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            dimension: default_dimension(),
            timeout_ms: default_embedding_timeout_ms(),
            endpoint: None,
            model: None,
        }
    }
}

/// Default embedding width, matching all-MiniLM-L6-v2.
fn default_dimension() -> usize {
    384
}

/// Default upper bound on a single embedding call.
fn default_embedding_timeout_ms() -> u64 {
    5_000
}

/// Similarity query defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    #[serde(default = "default_results")]
    pub default_results: usize,
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            default_results: default_results(),
            min_score: None,
        }
    }
}

fn default_results() -> usize {
    5
}

/// Pattern analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_top_tags")]
    pub top_tags: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_tags: default_top_tags(),
        }
    }
}

fn default_top_tags() -> usize {
    10
}
