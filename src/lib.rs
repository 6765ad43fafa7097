//! # Newsdedup
//!
//! Incremental, multi-strategy deduplication for AI/ML news feeds.
//!
//! Each collection cycle hands a batch of normalized candidate items to the
//! [`DeduplicationEngine`], which decides per item whether it repeats a story
//! that was already accepted. Matching runs in increasing cost order:
//!
//! 1. Canonical URL identity
//! 2. Content fingerprint (SHA-256 of normalized title + body)
//! 3. Embedding cosine similarity within a recency window
//!
//! ## Example
//!
//! ```rust,ignore
//! use newsdedup::{DeduplicationConfig, DeduplicationEngine, FastEmbedEmbedder, InMemoryStore};
//! use std::sync::Arc;
//!
//! let engine = DeduplicationEngine::new(
//!     Arc::new(FastEmbedEmbedder::new()),
//!     Arc::new(InMemoryStore::new()),
//!     DeduplicationConfig::default(),
//! );
//! let result = engine.check_batch(&items, chrono::Utc::now());
//! for decision in &result.decisions {
//!     println!("{} -> {}", decision.is_duplicate, decision.reason);
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod collectors;
pub mod config;
pub mod embedding;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::NewsdedupConfig;
pub use embedding::{Embedder, FastEmbedEmbedder};
pub use models::{CandidateItem, CanonicalUrl, Fingerprint, IndexedItem};
pub use services::deduplication::{
    BatchResult, CancelFlag, DedupCounters, DeduplicationConfig, DeduplicationEngine,
    DuplicateMatch, MatchStrategy, RecentItemIndex, SimilarityCache,
};
pub use storage::{InMemoryStore, ItemStore, JsonlStore};

/// Error type for newsdedup operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty text handed to an embedder, bad config values |
/// | `OperationFailed` | I/O errors, parse failures, lock poisoning |
/// | `EmbeddingUnavailable` | Provider failed, timed out, or returned a bad vector |
/// | `StoreUnavailable` | Persistent store lookup or write failed |
/// | `MalformedCandidate` | Unusable URL or empty text after normalization |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The embedding provider failed or timed out.
    ///
    /// Recovered inside the engine by skipping the semantic stage for the
    /// affected item.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The persistent store could not be reached.
    ///
    /// Recovered inside the engine by falling back to in-memory matching and
    /// marking the batch result as partial.
    #[error("store unavailable during '{operation}': {cause}")]
    StoreUnavailable {
        /// The store operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A candidate item cannot be matched meaningfully.
    #[error("malformed candidate: {reason}")]
    MalformedCandidate {
        /// Why the candidate was rejected.
        reason: String,
    },
}

/// Result type alias for newsdedup operations.
pub type Result<T> = std::result::Result<T, Error>;
