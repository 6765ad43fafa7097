//! News item types and identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared, immutable embedding vector.
///
/// Vectors are handed out as reference-counted slices so a cache eviction can
/// never invalidate a vector a caller is still holding.
pub type Embedding = Arc<[f32]>;

/// Deterministic digest of normalized title + body text.
///
/// Two items with the same fingerprint are duplicates regardless of their
/// embeddings. Fingerprints also key the embedding cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an already computed digest.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Returns the digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short prefix for log output.
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A normalized item produced by a feed parser.
///
/// Immutable input to the deduplication engine. The engine derives all
/// identity (canonical URL key, fingerprint) from these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Article URL as published by the feed.
    pub url: String,
    /// Article title.
    pub title: String,
    /// Best available text: full content or summary.
    pub body: String,
    /// Identifier of the feed the item came from.
    pub source_id: String,
    /// Publication instant.
    pub published_at: DateTime<Utc>,
    /// Category tags reported by the feed.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Comma separated author list, if the feed carries one.
    #[serde(default)]
    pub authors: Option<String>,
}

impl CandidateItem {
    /// Creates a candidate with no tags or authors.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        source_id: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            body: body.into(),
            source_id: source_id.into(),
            published_at,
            tags: Vec::new(),
            authors: None,
        }
    }

    /// Builder method to set tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Builder method to set authors.
    #[must_use]
    pub fn with_authors(mut self, authors: impl Into<String>) -> Self {
        self.authors = Some(authors.into());
        self
    }
}

/// An accepted, non-duplicate item.
///
/// Stored in the recent-item index and in the persistent store. Never mutated
/// after creation; a missing embedding is resolved through the similarity
/// cache when the item is first used as a semantic comparison target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedItem {
    /// Normalized URL (scheme and host lowercased, tracking params removed).
    pub url: String,
    /// Scheme-insensitive comparison key derived from `url`.
    pub url_key: String,
    /// Content fingerprint.
    pub fingerprint: Fingerprint,
    /// Article title, kept for provenance in logs and CLI output.
    pub title: String,
    /// Feed the item came from.
    pub source_id: String,
    /// Text the embedding is computed from.
    pub similarity_text: String,
    /// Embedding, when it was computed at acceptance time.
    #[serde(skip)]
    pub embedding: Option<Embedding>,
    /// Publication instant.
    pub published_at: DateTime<Utc>,
    /// When the engine accepted the item.
    pub accepted_at: DateTime<Utc>,
}

impl IndexedItem {
    /// Returns a copy without the embedding vector, for compact output.
    #[must_use]
    pub fn without_embedding(&self) -> Self {
        Self {
            embedding: None,
            ..self.clone()
        }
    }
}

impl PartialEq for IndexedItem {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.url_key == other.url_key
            && self.published_at == other.published_at
            && self.accepted_at == other.accepted_at
    }
}
