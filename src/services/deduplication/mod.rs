//! Deduplication engine for candidate news items.
//!
//! Three-stage matching, cheapest first:
//! 1. **URL**: canonical URL key lookup in the recent-item index, then the store
//! 2. **Hash**: SHA-256 fingerprint of normalized title + body, same scope
//! 3. **Semantic**: cosine similarity of embeddings against recent items
//!
//! The engine short-circuits on the first match and inserts accepted items
//! into the index immediately, so duplicates inside one batch are caught too.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      DeduplicationEngine                         │
//! │  ┌──────────────────┐  ┌─────────────────┐  ┌─────────────────┐  │
//! │  │ RecentItemIndex  │  │ SimilarityCache │  │ ItemStore       │  │
//! │  │                  │  │                 │  │ (external)      │  │
//! │  │ url / fp / age   │  │ LRU + TTL over  │  │ long-tail URL,  │  │
//! │  │ bounded window   │  │ the Embedder    │  │ fp, cold start  │  │
//! │  └──────────────────┘  └─────────────────┘  └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
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
//!
//! let result = engine.check_batch(&items, chrono::Utc::now());
//! for decision in result.decisions.iter().filter(|d| d.is_duplicate) {
//!     println!("Skipping duplicate: {}", decision.reason);
//! }
//! ```

mod cache;
mod config;
mod hasher;
mod index;
mod semantic;
mod service;
mod types;

pub use cache::{CacheStats, EmbeddingRecord, SimilarityCache};
pub use config::{DeduplicationConfig, TieBreak, days};
pub use hasher::ContentHasher;
pub use index::RecentItemIndex;
pub use semantic::{SemanticMatch, SemanticTarget, best_match, similarity_score, similarity_text};
pub use service::DeduplicationEngine;
pub use types::{BatchResult, CancelFlag, DedupCounters, DuplicateMatch, MatchStrategy};
