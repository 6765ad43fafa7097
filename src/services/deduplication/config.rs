//! Deduplication configuration.
//!
//! A plain value object constructed once at startup and handed to the engine,
//! the similarity cache and the recent-item index. Nothing reads settings
//! from a global.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SECS_PER_DAY: u64 = 86_400;

/// How to choose between semantic candidates with exactly equal scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Prefer the most recently published item.
    #[default]
    MostRecentlyPublished,
    /// Prefer the earliest published item.
    EarliestPublished,
}

impl TieBreak {
    /// Parses a tie-break name as used in env vars and config files.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "most_recently_published" | "newest" | "latest" => Some(Self::MostRecentlyPublished),
            "earliest_published" | "oldest" | "earliest" => Some(Self::EarliestPublished),
            _ => None,
        }
    }
}

/// Configuration for the deduplication engine.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `NEWSDEDUP_DEDUP_ENABLED` | bool | `true` | Enable deduplication |
/// | `NEWSDEDUP_DEDUP_SIMILARITY_THRESHOLD` | f32 | `0.85` | Semantic duplicate threshold |
/// | `NEWSDEDUP_DEDUP_MAX_AGE_DAYS` | u32 | `7` | Store lookback and semantic recency window |
/// | `NEWSDEDUP_DEDUP_CACHE_CAPACITY` | usize | `10000` | Similarity cache entries |
/// | `NEWSDEDUP_DEDUP_CACHE_TTL_DAYS` | u64 | `30` | Similarity cache entry lifetime |
/// | `NEWSDEDUP_DEDUP_INDEX_MAX_ITEMS` | usize | `5000` | Recent-item index capacity |
/// | `NEWSDEDUP_DEDUP_INDEX_MAX_AGE_DAYS` | u64 | `30` | Recent-item index horizon |
/// | `NEWSDEDUP_DEDUP_MAX_CONCURRENT_EMBEDDINGS` | usize | `4` | Embedding prefetch workers |
/// | `NEWSDEDUP_DEDUP_TIE_BREAK` | string | `most_recently_published` | Equal-score tie-break |
/// | `NEWSDEDUP_DEDUP_CONTENT_CHARS` | usize | `500` | Body chars used for similarity text |
///
/// # Example
///
/// ```rust
/// use newsdedup::DeduplicationConfig;
///
/// let config = DeduplicationConfig::default().with_similarity_threshold(0.9);
/// assert!(config.enabled);
/// assert_eq!(config.max_age_days, 7);
/// assert!((config.similarity_threshold - 0.9).abs() < f32::EPSILON);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeduplicationConfig {
    /// Enable/disable entire deduplication.
    pub enabled: bool,

    /// Minimum normalized similarity for a semantic duplicate (inclusive).
    pub similarity_threshold: f32,

    /// Lookback for store lookups and recency window for semantic candidates.
    pub max_age_days: u32,

    /// Similarity cache capacity.
    pub cache_capacity: usize,

    /// Similarity cache entry lifetime.
    pub cache_ttl: Duration,

    /// Maximum number of items held by the recent-item index.
    pub index_max_items: usize,

    /// Maximum age (by publication time) of items held by the index.
    pub index_max_age: Duration,

    /// Number of workers computing embeddings ahead of the sequential pass.
    pub max_concurrent_embeddings: usize,

    /// Tie-break for semantic candidates with equal scores.
    pub tie_break: TieBreak,

    /// Body characters included in the similarity text.
    pub content_chars_for_similarity: usize,
}

impl DeduplicationConfig {
    /// Creates a new configuration from environment variables.
    ///
    /// Falls back to defaults for any unset or unparseable variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `NEWSDEDUP_DEDUP_*` overrides on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("NEWSDEDUP_DEDUP_ENABLED") {
            self.enabled = v.to_lowercase() != "false" && v != "0";
        }
        if let Some(tie_break) = std::env::var("NEWSDEDUP_DEDUP_TIE_BREAK")
            .ok()
            .and_then(|v| TieBreak::parse(&v))
        {
            self.tie_break = tie_break;
        }
        if let Some(v) = env_parse("NEWSDEDUP_DEDUP_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = v;
        }
        if let Some(v) = env_parse("NEWSDEDUP_DEDUP_MAX_AGE_DAYS") {
            self.max_age_days = v;
        }
        if let Some(v) = env_parse("NEWSDEDUP_DEDUP_CACHE_CAPACITY") {
            self.cache_capacity = v;
        }
        if let Some(v) = env_parse("NEWSDEDUP_DEDUP_CACHE_TTL_DAYS") {
            self.cache_ttl = days(v);
        }
        if let Some(v) = env_parse("NEWSDEDUP_DEDUP_INDEX_MAX_ITEMS") {
            self.index_max_items = v;
        }
        if let Some(v) = env_parse("NEWSDEDUP_DEDUP_INDEX_MAX_AGE_DAYS") {
            self.index_max_age = days(v);
        }
        if let Some(v) = env_parse("NEWSDEDUP_DEDUP_MAX_CONCURRENT_EMBEDDINGS") {
            self.max_concurrent_embeddings = v;
        }
        if let Some(v) = env_parse("NEWSDEDUP_DEDUP_CONTENT_CHARS") {
            self.content_chars_for_similarity = v;
        }
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the threshold is outside `[0, 1]` or a
    /// capacity or window is zero.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidInput(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.max_age_days == 0 {
            return Err(Error::InvalidInput("max_age_days must be > 0".to_string()));
        }
        if self.cache_capacity == 0 || self.index_max_items == 0 {
            return Err(Error::InvalidInput(
                "cache_capacity and index_max_items must be > 0".to_string(),
            ));
        }
        if self.cache_ttl.is_zero() || self.index_max_age.is_zero() {
            return Err(Error::InvalidInput(
                "cache_ttl and index_max_age must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the recency window as a chrono duration.
    #[must_use]
    pub fn recency_window(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::days(i64::from(self.max_age_days))
    }

    /// Builder method to set enabled state.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the semantic threshold.
    #[must_use]
    pub const fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Builder method to set the recency window in days.
    #[must_use]
    pub const fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    /// Builder method to set the similarity cache capacity.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Builder method to set the similarity cache TTL.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Builder method to set the index capacity.
    #[must_use]
    pub const fn with_index_max_items(mut self, max_items: usize) -> Self {
        self.index_max_items = max_items;
        self
    }

    /// Builder method to set the index horizon.
    #[must_use]
    pub const fn with_index_max_age(mut self, max_age: Duration) -> Self {
        self.index_max_age = max_age;
        self
    }

    /// Builder method to set the embedding prefetch worker count.
    #[must_use]
    pub const fn with_max_concurrent_embeddings(mut self, workers: usize) -> Self {
        self.max_concurrent_embeddings = workers;
        self
    }

    /// Builder method to set the tie-break rule.
    #[must_use]
    pub const fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Builder method to set how much body text feeds the similarity text.
    #[must_use]
    pub const fn with_content_chars_for_similarity(mut self, chars: usize) -> Self {
        self.content_chars_for_similarity = chars;
        self
    }
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.85,
            max_age_days: 7,
            cache_capacity: 10_000,
            cache_ttl: days(30),
            index_max_items: 5_000,
            index_max_age: days(30),
            max_concurrent_embeddings: 4,
            tie_break: TieBreak::default(),
            content_chars_for_similarity: 500,
        }
    }
}

/// Converts whole days to a [`Duration`], saturating on overflow.
#[must_use]
pub const fn days(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(SECS_PER_DAY))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
