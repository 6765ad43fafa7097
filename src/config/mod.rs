//! Configuration management.
//!
//! Settings resolve in three layers: built-in defaults, an optional TOML file,
//! then `NEWSDEDUP_*` environment variables. The result is a plain value the
//! binary builds once and passes down; nothing in the library reads a global.
//!
//! ```toml
//! data_dir = "/var/lib/newsdedup"
//!
//! [dedup]
//! similarity_threshold = 0.85
//! max_age_days = 7
//! cache_ttl_days = 30
//! tie_break = "most_recently_published"
//!
//! [embedding]
//! disk_cache = true
//! max_concurrent = 4
//!
//! [observability.logging]
//! format = "json"
//! level = "debug"
//!
//! [observability.metrics]
//! enabled = true
//! port = 9090
//! ```

use crate::embedding::EmbeddingBulkheadConfig;
use crate::services::deduplication::{DeduplicationConfig, TieBreak, days};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for newsdedup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsdedupConfig {
    /// Directory holding the item store and the embedding cache.
    pub data_dir: PathBuf,
    /// JSON-lines item store path.
    pub store_path: PathBuf,
    /// Deduplication engine settings.
    pub dedup: DeduplicationConfig,
    /// Embedding provider settings.
    pub embedding: EmbeddingSettings,
    /// Logging and metrics settings.
    #[serde(skip)]
    pub observability: ObservabilitySettings,
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddingSettings {
    /// Directory for on-disk vectors.
    pub cache_dir: PathBuf,
    /// Whether vectors are cached on disk.
    pub disk_cache_enabled: bool,
    /// Maximum concurrent provider calls.
    pub max_concurrent: usize,
    /// Permit acquire timeout in milliseconds.
    pub acquire_timeout_ms: u64,
    /// Fail immediately when all permits are taken.
    pub fail_fast: bool,
}

impl EmbeddingSettings {
    fn defaults(data_dir: &Path) -> Self {
        let bulkhead = EmbeddingBulkheadConfig::default();
        Self {
            cache_dir: data_dir.join("embeddings"),
            disk_cache_enabled: true,
            max_concurrent: bulkhead.max_concurrent,
            acquire_timeout_ms: bulkhead.acquire_timeout_ms,
            fail_fast: bulkhead.fail_fast,
        }
    }

    /// Returns the concurrency guard configuration.
    #[must_use]
    pub const fn bulkhead(&self) -> EmbeddingBulkheadConfig {
        EmbeddingBulkheadConfig::new()
            .with_max_concurrent(self.max_concurrent)
            .with_acquire_timeout_ms(self.acquire_timeout_ms)
            .with_fail_fast(self.fail_fast)
    }
}

/// Observability section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: Option<LoggingSettings>,
    /// Metrics settings.
    pub metrics: Option<MetricsSettings>,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `newsdedup=debug`.
    pub level: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

/// Metrics settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetricsSettings {
    /// Whether the Prometheus recorder is installed.
    pub enabled: Option<bool>,
    /// Port for the scrape endpoint.
    pub port: Option<u16>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Item store path.
    pub store_path: Option<String>,
    /// Deduplication section.
    pub dedup: Option<ConfigFileDedup>,
    /// Embedding section.
    pub embedding: Option<ConfigFileEmbedding>,
    /// Observability section.
    pub observability: Option<ObservabilitySettings>,
}

/// Dedup section in config file. Durations are whole days.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileDedup {
    /// Enable deduplication.
    pub enabled: Option<bool>,
    /// Semantic duplicate threshold.
    pub similarity_threshold: Option<f32>,
    /// Store lookback and semantic recency window.
    pub max_age_days: Option<u32>,
    /// Similarity cache capacity.
    pub cache_capacity: Option<usize>,
    /// Similarity cache lifetime in days.
    pub cache_ttl_days: Option<u64>,
    /// Recent-item index capacity.
    pub index_max_items: Option<usize>,
    /// Recent-item index horizon in days.
    pub index_max_age_days: Option<u64>,
    /// Embedding prefetch workers.
    pub max_concurrent_embeddings: Option<usize>,
    /// Equal-score tie-break.
    pub tie_break: Option<String>,
    /// Body characters used for similarity text.
    pub content_chars_for_similarity: Option<usize>,
}

/// Embedding section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileEmbedding {
    /// On-disk cache directory.
    pub cache_dir: Option<String>,
    /// Enable the on-disk cache.
    pub disk_cache: Option<bool>,
    /// Maximum concurrent provider calls.
    pub max_concurrent: Option<usize>,
    /// Permit acquire timeout in milliseconds.
    pub acquire_timeout_ms: Option<u64>,
    /// Fail immediately when all permits are taken.
    pub fail_fast: Option<bool>,
}

impl Default for NewsdedupConfig {
    fn default() -> Self {
        Self::with_data_dir_defaults(default_data_dir())
    }
}

impl NewsdedupConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults rooted at `data_dir`.
    fn with_data_dir_defaults(data_dir: PathBuf) -> Self {
        Self {
            store_path: data_dir.join("items.jsonl"),
            embedding: EmbeddingSettings::defaults(&data_dir),
            data_dir,
            dedup: DeduplicationConfig::default(),
            observability: ObservabilitySettings::default(),
        }
    }

    /// Loads configuration from a file path, then applies env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting values are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::load_from_str(&contents)
    }

    /// Parses TOML configuration, then applies env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or values are out of range.
    pub fn load_from_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        let config = Self::from_config_file(file)?.with_env_overrides();
        config.dedup.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location, or defaults plus env
    /// overrides if there is no config file.
    ///
    /// Checks `NEWSDEDUP_CONFIG`, then the platform config dir
    /// (`~/.config/newsdedup/config.toml` on Linux).
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but is invalid.
    pub fn load_default() -> Result<Self> {
        if let Ok(path) = std::env::var("NEWSDEDUP_CONFIG") {
            return Self::load_from_file(Path::new(&path));
        }
        if let Some(path) = default_config_path()
            && path.exists()
        {
            return Self::load_from_file(&path);
        }
        let config = Self::default().with_env_overrides();
        config.dedup.validate()?;
        Ok(config)
    }

    /// Converts a `ConfigFile` to `NewsdedupConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = file
            .data_dir
            .map_or_else(Self::default, |dir| Self::with_data_dir_defaults(dir.into()));

        if let Some(store_path) = file.store_path {
            config.store_path = PathBuf::from(store_path);
        }
        if let Some(dedup) = file.dedup {
            config.dedup = apply_dedup_section(config.dedup, dedup)?;
        }
        if let Some(embedding) = file.embedding {
            if let Some(dir) = embedding.cache_dir {
                config.embedding.cache_dir = PathBuf::from(dir);
            }
            if let Some(v) = embedding.disk_cache {
                config.embedding.disk_cache_enabled = v;
            }
            if let Some(v) = embedding.max_concurrent {
                config.embedding.max_concurrent = v.max(1);
            }
            if let Some(v) = embedding.acquire_timeout_ms {
                config.embedding.acquire_timeout_ms = v;
            }
            if let Some(v) = embedding.fail_fast {
                config.embedding.fail_fast = v;
            }
        }
        if let Some(observability) = file.observability {
            config.observability = observability;
        }
        Ok(config)
    }

    /// Applies `NEWSDEDUP_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("NEWSDEDUP_DATA_DIR") {
            self = Self {
                dedup: self.dedup,
                observability: self.observability,
                ..Self::with_data_dir_defaults(dir.into())
            };
        }
        if let Ok(path) = std::env::var("NEWSDEDUP_STORE_PATH") {
            self.store_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("NEWSDEDUP_EMBEDDING_CACHE_DIR") {
            self.embedding.cache_dir = PathBuf::from(dir);
        }
        if let Ok(v) = std::env::var("NEWSDEDUP_EMBEDDING_DISK_CACHE") {
            self.embedding.disk_cache_enabled = v.to_lowercase() != "false" && v != "0";
        }
        let bulkhead = self.embedding.bulkhead().with_env_overrides();
        self.embedding.max_concurrent = bulkhead.max_concurrent;
        self.embedding.acquire_timeout_ms = bulkhead.acquire_timeout_ms;
        self.embedding.fail_fast = bulkhead.fail_fast;

        self.dedup = self.dedup.with_env_overrides();
        self
    }

    /// Sets the data directory, moving the store and cache under it.
    #[must_use]
    pub fn with_data_dir(self, path: impl Into<PathBuf>) -> Self {
        Self {
            dedup: self.dedup,
            observability: self.observability,
            ..Self::with_data_dir_defaults(path.into())
        }
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&EffectiveConfig::from(self)).map_err(|e| Error::OperationFailed {
            operation: "serialize_config".to_string(),
            cause: e.to_string(),
        })
    }
}

fn apply_dedup_section(
    mut dedup: DeduplicationConfig,
    section: ConfigFileDedup,
) -> Result<DeduplicationConfig> {
    if let Some(v) = section.enabled {
        dedup.enabled = v;
    }
    if let Some(v) = section.similarity_threshold {
        dedup.similarity_threshold = v;
    }
    if let Some(v) = section.max_age_days {
        dedup.max_age_days = v;
    }
    if let Some(v) = section.cache_capacity {
        dedup.cache_capacity = v;
    }
    if let Some(v) = section.cache_ttl_days {
        dedup.cache_ttl = days(v);
    }
    if let Some(v) = section.index_max_items {
        dedup.index_max_items = v;
    }
    if let Some(v) = section.index_max_age_days {
        dedup.index_max_age = days(v);
    }
    if let Some(v) = section.max_concurrent_embeddings {
        dedup.max_concurrent_embeddings = v;
    }
    if let Some(name) = section.tie_break {
        dedup.tie_break = TieBreak::parse(&name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown tie_break '{name}'")))?;
    }
    if let Some(v) = section.content_chars_for_similarity {
        dedup.content_chars_for_similarity = v;
    }
    Ok(dedup)
}

/// TOML view of the effective configuration, durations in days.
#[derive(Serialize)]
struct EffectiveConfig<'a> {
    data_dir: &'a Path,
    store_path: &'a Path,
    dedup: EffectiveDedup,
    embedding: &'a EmbeddingSettings,
}

#[derive(Serialize)]
struct EffectiveDedup {
    enabled: bool,
    similarity_threshold: f32,
    max_age_days: u32,
    cache_capacity: usize,
    cache_ttl_days: u64,
    index_max_items: usize,
    index_max_age_days: u64,
    max_concurrent_embeddings: usize,
    tie_break: TieBreak,
    content_chars_for_similarity: usize,
}

impl<'a> From<&'a NewsdedupConfig> for EffectiveConfig<'a> {
    fn from(config: &'a NewsdedupConfig) -> Self {
        let dedup = &config.dedup;
        Self {
            data_dir: &config.data_dir,
            store_path: &config.store_path,
            dedup: EffectiveDedup {
                enabled: dedup.enabled,
                similarity_threshold: dedup.similarity_threshold,
                max_age_days: dedup.max_age_days,
                cache_capacity: dedup.cache_capacity,
                cache_ttl_days: dedup.cache_ttl.as_secs() / 86_400,
                index_max_items: dedup.index_max_items,
                index_max_age_days: dedup.index_max_age.as_secs() / 86_400,
                max_concurrent_embeddings: dedup.max_concurrent_embeddings,
                tie_break: dedup.tie_break,
                content_chars_for_similarity: dedup.content_chars_for_similarity,
            },
            embedding: &config.embedding,
        }
    }
}

/// Returns the platform data directory, or `.newsdedup` if there is none.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "newsdedup").map_or_else(
        || PathBuf::from(".newsdedup"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

/// Returns the platform config file path, if the platform has one.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "newsdedup")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
