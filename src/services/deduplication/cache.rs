//! Similarity cache.
//!
//! Maps content fingerprints to embedding vectors so that previously seen
//! content is never embedded twice. Bounded by capacity (LRU) and by a TTL
//! that is enforced lazily on access.

use crate::embedding::Embedder;
use crate::models::{Embedding, Fingerprint};
use crate::{Error, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::instrument;

use super::config::DeduplicationConfig;

/// A cached embedding.
///
/// Never mutated after creation apart from the access timestamp.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    /// The embedding vector.
    pub vector: Embedding,
    /// When the vector was computed.
    pub created_at: Instant,
    /// When the record was last returned to a caller.
    pub last_used_at: Instant,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to compute or found nothing.
    pub misses: u64,
    /// Entries removed by capacity or TTL.
    pub evictions: u64,
    /// Current number of entries.
    pub len: usize,
}

/// Bounded, TTL-aware embedding cache.
///
/// # Thread Safety
///
/// The LRU map sits behind a `Mutex` (even a read updates recency). The lock
/// is never held while the embedding provider runs, so concurrent misses for
/// different fingerprints compute in parallel. Two concurrent misses for the
/// same fingerprint may both compute; the second insert overwrites the first
/// with an identical vector.
///
/// Vectors are returned as shared [`Embedding`] handles, so evicting an entry
/// never invalidates a vector a caller already holds.
///
/// # Example
///
/// ```rust,ignore
/// use newsdedup::{FastEmbedEmbedder, SimilarityCache};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let cache = SimilarityCache::new(Arc::new(FastEmbedEmbedder::new()), 10_000, Duration::from_secs(86_400 * 30));
/// let fp = newsdedup::services::deduplication::ContentHasher::fingerprint("title", "body");
/// let vector = cache.get_or_compute(&fp, "Title: title")?;
/// ```
pub struct SimilarityCache {
    entries: Mutex<LruCache<Fingerprint, EmbeddingRecord>>,
    embedder: Arc<dyn Embedder>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SimilarityCache {
    /// Creates a cache in front of `embedder`.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            embedder,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Creates a cache sized from the deduplication config.
    #[must_use]
    pub fn from_config(embedder: Arc<dyn Embedder>, config: &DeduplicationConfig) -> Self {
        Self::new(embedder, config.cache_capacity, config.cache_ttl)
    }

    /// Returns the dimensionality every cached vector has.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    /// Returns the cached vector for `fingerprint`, refreshing its recency.
    ///
    /// Expired entries are removed and reported as a miss.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Embedding> {
        let found = {
            let mut entries = self.lock();
            self.lookup(&mut entries, fingerprint, Instant::now())
        };
        self.record_lookup(found.is_some());
        found
    }

    /// Returns the vector for `fingerprint`, embedding `text` on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmbeddingUnavailable`] if the provider fails or returns a
    /// vector of the wrong dimension. Nothing is cached in that case.
    #[instrument(
        skip(self, text),
        fields(operation = "similarity_cache_get_or_compute", fingerprint = %fingerprint.short())
    )]
    pub fn get_or_compute(&self, fingerprint: &Fingerprint, text: &str) -> Result<Embedding> {
        if let Some(vector) = self.get(fingerprint) {
            return Ok(vector);
        }

        let start = Instant::now();
        let vector = self
            .embedder
            .embed(text)
            .map_err(|e| match e {
                Error::EmbeddingUnavailable(_) => e,
                other => Error::EmbeddingUnavailable(other.to_string()),
            })?;
        metrics::histogram!("similarity_cache_compute_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        self.insert(fingerprint.clone(), vector)
    }

    /// Stores a vector, evicting the least recently used entry when full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmbeddingUnavailable`] if the vector's dimension does
    /// not match the provider's.
    pub fn insert(&self, fingerprint: Fingerprint, vector: Vec<f32>) -> Result<Embedding> {
        let expected = self.dimensions();
        if vector.len() != expected {
            return Err(Error::EmbeddingUnavailable(format!(
                "expected {expected} dimensions, provider returned {}",
                vector.len()
            )));
        }

        let now = Instant::now();
        let vector: Embedding = Arc::from(vector);
        let record = EmbeddingRecord {
            vector: Arc::clone(&vector),
            created_at: now,
            last_used_at: now,
        };

        let (displaced, len) = {
            let mut entries = self.lock();
            let displaced = entries.push(fingerprint.clone(), record);
            (displaced, entries.len())
        };
        // `push` also hands back the old record when the key was already present.
        if let Some((key, _)) = displaced
            && key != fingerprint
        {
            self.count_eviction(1);
            tracing::debug!(fingerprint = %key.short(), "Evicted least recently used embedding");
        }
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("similarity_cache_size").set(len as f64);

        Ok(vector)
    }

    /// Removes every expired entry.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let removed = {
            let mut entries = self.lock();
            let expired: Vec<Fingerprint> = entries
                .iter()
                .filter(|(_, record)| self.is_expired(record, now))
                .map(|(fp, _)| fp.clone())
                .collect();
            for fp in &expired {
                entries.pop(fp);
            }
            expired.len()
        };
        self.count_eviction(removed);
        removed
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lock().clear();
        metrics::gauge!("similarity_cache_size").set(0.0);
    }

    /// Returns the number of entries, including not yet purged expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `fingerprint` is cached, without touching recency.
    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().contains(fingerprint)
    }

    /// Returns hit/miss/eviction counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.len(),
        }
    }

    fn lookup(
        &self,
        entries: &mut LruCache<Fingerprint, EmbeddingRecord>,
        fingerprint: &Fingerprint,
        now: Instant,
    ) -> Option<Embedding> {
        let expired = entries
            .peek(fingerprint)
            .is_some_and(|record| self.is_expired(record, now));
        if expired {
            entries.pop(fingerprint);
            self.count_eviction(1);
            tracing::debug!(fingerprint = %fingerprint.short(), "Evicted expired embedding");
            return None;
        }

        entries.get_mut(fingerprint).map(|record| {
            record.last_used_at = now;
            Arc::clone(&record.vector)
        })
    }

    fn is_expired(&self, record: &EmbeddingRecord, now: Instant) -> bool {
        now.saturating_duration_since(record.created_at) >= self.ttl
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("similarity_cache_hits_total").increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("similarity_cache_misses_total").increment(1);
        }
    }

    fn count_eviction(&self, n: usize) {
        if n == 0 {
            return;
        }
        let n = u64::try_from(n).unwrap_or(u64::MAX);
        self.evictions.fetch_add(n, Ordering::Relaxed);
        metrics::counter!("similarity_cache_evictions_total").increment(n);
    }

    /// Locks the map, recovering from poisoning.
    ///
    /// The map holds no invariants a panicking holder could break halfway, so
    /// a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, LruCache<Fingerprint, EmbeddingRecord>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SimilarityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
