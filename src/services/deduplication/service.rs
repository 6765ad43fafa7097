//! Deduplication engine.
//!
//! Runs the staged match pipeline over a batch of candidates:
//! 1. **URL**: canonical URL key against the index, then the store
//! 2. **Hash**: content fingerprint against the index, then the store
//! 3. **Semantic**: embedding similarity against recent indexed items
//!
//! Stages short-circuit on the first match. Items are decided strictly left to
//! right and accepted items enter the index before the next item is checked,
//! so a batch never accepts the same story twice. Store lookups and candidate
//! embeddings are prefetched by a bounded worker pool ahead of the sequential
//! pass; prefetching never reorders insertion.

use crate::embedding::Embedder;
use crate::models::{CandidateItem, CanonicalUrl, Embedding, Fingerprint, IndexedItem};
use crate::storage::ItemStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::instrument;

use super::cache::SimilarityCache;
use super::config::DeduplicationConfig;
use super::hasher::ContentHasher;
use super::index::RecentItemIndex;
use super::semantic::{SemanticTarget, best_match, similarity_text};
use super::types::{BatchResult, CancelFlag, DedupCounters, DuplicateMatch, MatchStrategy};

type StoreLookup = Result<Option<IndexedItem>>;

/// A well-formed candidate with its derived identity.
struct Prepared<'a> {
    item: &'a CandidateItem,
    url: CanonicalUrl,
    fingerprint: Fingerprint,
    similarity_text: String,
}

/// Work done ahead of the sequential pass for one candidate.
#[derive(Default)]
struct Prefetched {
    by_url: Option<StoreLookup>,
    by_fingerprint: Option<StoreLookup>,
    embedding: Option<Result<Embedding>>,
}

/// Mutable state of one batch run.
#[derive(Default)]
struct BatchState {
    counters: DedupCounters,
    partial: bool,
    store_ok: bool,
    /// Items accepted so far, in acceptance order. The index may evict an
    /// item in the same insert that adds it, so these are matched directly.
    accepted: Vec<IndexedItem>,
    accepted_urls: HashMap<String, usize>,
    accepted_fingerprints: HashMap<Fingerprint, usize>,
    /// Comparison targets whose embedding could not be obtained.
    unresolvable: HashSet<Fingerprint>,
}

impl BatchState {
    fn new() -> Self {
        Self {
            store_ok: true,
            ..Self::default()
        }
    }

    fn remember(&mut self, item: &IndexedItem) {
        let slot = self.accepted.len();
        self.accepted_urls.entry(item.url_key.clone()).or_insert(slot);
        self.accepted_fingerprints
            .entry(item.fingerprint.clone())
            .or_insert(slot);
        self.accepted.push(item.clone());
    }

    fn accepted_by_url(&self, url_key: &str) -> Option<IndexedItem> {
        let slot = *self.accepted_urls.get(url_key)?;
        self.accepted.get(slot).cloned()
    }

    fn accepted_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<IndexedItem> {
        let slot = *self.accepted_fingerprints.get(fingerprint)?;
        self.accepted.get(slot).cloned()
    }

    fn degrade(&mut self, operation: &str, err: &Error) {
        self.counters.store_unavailable += 1;
        self.partial = true;
        self.store_ok = false;
        metrics::counter!("dedup_store_unavailable_total", "operation" => operation.to_string())
            .increment(1);
        tracing::warn!(
            operation = operation,
            error = %err,
            "Store unavailable, continuing with in-memory matching only"
        );
    }
}

/// Orchestrates URL, hash and semantic matching over candidate batches.
///
/// The engine never fails a batch: embedding and store errors become counters
/// and flags on the [`BatchResult`].
///
/// # Example
///
/// ```rust,ignore
/// use newsdedup::{DeduplicationConfig, DeduplicationEngine, FastEmbedEmbedder, InMemoryStore};
/// use std::sync::Arc;
///
/// let engine = DeduplicationEngine::new(
///     Arc::new(FastEmbedEmbedder::new()),
///     Arc::new(InMemoryStore::new()),
///     DeduplicationConfig::default(),
/// );
///
/// let result = engine.check_batch(&items, chrono::Utc::now());
/// println!("{} duplicates", result.counters.duplicates());
/// ```
pub struct DeduplicationEngine {
    config: DeduplicationConfig,
    cache: Arc<SimilarityCache>,
    index: Arc<RecentItemIndex>,
    store: Arc<dyn ItemStore>,
    warmed: AtomicBool,
}

impl DeduplicationEngine {
    /// Creates an engine with a cache and index sized from `config`.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ItemStore>,
        config: DeduplicationConfig,
    ) -> Self {
        let cache = Arc::new(SimilarityCache::from_config(embedder, &config));
        let index = Arc::new(RecentItemIndex::from_config(&config));
        Self::with_components(cache, index, store, config)
    }

    /// Creates an engine around caller-constructed components.
    #[must_use]
    pub fn with_components(
        cache: Arc<SimilarityCache>,
        index: Arc<RecentItemIndex>,
        store: Arc<dyn ItemStore>,
        config: DeduplicationConfig,
    ) -> Self {
        Self {
            config,
            cache,
            index,
            store,
            warmed: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DeduplicationConfig {
        &self.config
    }

    /// Returns the similarity cache.
    #[must_use]
    pub fn cache(&self) -> &SimilarityCache {
        &self.cache
    }

    /// Returns the recent-item index.
    #[must_use]
    pub fn index(&self) -> &RecentItemIndex {
        &self.index
    }

    /// Checks a single candidate. Equivalent to a one-item batch.
    #[must_use]
    pub fn check(&self, item: &CandidateItem, as_of: DateTime<Utc>) -> DuplicateMatch {
        self.check_batch(std::slice::from_ref(item), as_of)
            .decisions
            .pop()
            .unwrap_or_else(|| DuplicateMatch::unique("not checked"))
    }

    /// Decides every candidate in `items`, in order.
    ///
    /// Returns exactly one decision per item.
    #[must_use]
    pub fn check_batch(&self, items: &[CandidateItem], as_of: DateTime<Utc>) -> BatchResult {
        self.check_batch_cancellable(items, as_of, &CancelFlag::new())
    }

    /// Like [`Self::check_batch`], but stops between items once `cancel` is set.
    ///
    /// Items accepted before cancellation stay indexed and persisted.
    #[instrument(
        skip(self, items, cancel),
        fields(operation = "check_batch", batch_size = items.len(), as_of = %as_of)
    )]
    pub fn check_batch_cancellable(
        &self,
        items: &[CandidateItem],
        as_of: DateTime<Utc>,
        cancel: &CancelFlag,
    ) -> BatchResult {
        let start = Instant::now();
        let mut state = BatchState::new();

        if !self.config.enabled {
            state.counters.items = items.len() as u64;
            return BatchResult {
                decisions: items
                    .iter()
                    .map(|_| DuplicateMatch::unique("deduplication disabled"))
                    .collect(),
                counters: state.counters,
                partial: false,
                cancelled: false,
            };
        }

        self.warm_up(as_of, &mut state);

        let since = as_of
            .checked_sub_signed(self.config.recency_window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let prepared: Vec<Result<Prepared<'_>>> =
            items.iter().map(|item| self.prepare(item)).collect();
        let mut prefetched = self.prefetch(&prepared, since, state.store_ok, cancel);

        let mut decisions = Vec::with_capacity(items.len());
        let mut cancelled = false;

        for (candidate, pre) in prepared.iter().zip(prefetched.iter_mut()) {
            if cancel.is_cancelled() {
                cancelled = true;
                tracing::info!(processed = decisions.len(), "Batch cancelled");
                break;
            }
            state.counters.items += 1;

            let decision = match candidate {
                Ok(candidate) => self.decide(candidate, std::mem::take(pre), as_of, since, &mut state),
                Err(err) => {
                    state.counters.malformed += 1;
                    metrics::counter!("dedup_malformed_total").increment(1);
                    tracing::debug!(error = %err, "Skipping malformed candidate");
                    DuplicateMatch::malformed(err.to_string())
                },
            };
            decisions.push(decision);
        }

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("dedup_batch_duration_ms").record(duration_ms);
        tracing::info!(
            items = state.counters.items,
            accepted = state.counters.accepted,
            duplicates = state.counters.duplicates(),
            embedding_failures = state.counters.embedding_failures,
            partial = state.partial,
            duration_ms = duration_ms,
            "Batch deduplicated"
        );

        BatchResult {
            decisions,
            counters: state.counters,
            partial: state.partial,
            cancelled,
        }
    }

    /// Drops all in-memory index and cache state.
    ///
    /// The next batch reloads recent items from the store.
    pub fn clear_memory(&self) {
        self.index.clear();
        self.cache.clear();
        self.warmed.store(false, Ordering::SeqCst);
        tracing::info!("Cleared deduplication memory");
    }

    /// Loads recent items from the store into the index once per process.
    ///
    /// A failed load is retried on the next batch.
    fn warm_up(&self, as_of: DateTime<Utc>, state: &mut BatchState) {
        if self.warmed.load(Ordering::SeqCst) {
            return;
        }
        let since = as_of
            .checked_sub_signed(self.config.recency_window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        match self.store.find_recent(since) {
            Ok(recent) => {
                let loaded = self.index.extend(recent, as_of);
                self.warmed.store(true, Ordering::SeqCst);
                tracing::info!(loaded, "Loaded recent items into index");
            },
            Err(err) => state.degrade("find_recent", &err),
        }
    }

    /// Derives identity for a candidate, rejecting unusable ones.
    fn prepare<'a>(&self, item: &'a CandidateItem) -> Result<Prepared<'a>> {
        let url = CanonicalUrl::parse(&item.url)?;
        if ContentHasher::is_blank(&item.title, &item.body) {
            return Err(Error::MalformedCandidate {
                reason: "empty title and body".to_string(),
            });
        }
        let fingerprint = ContentHasher::fingerprint(&item.title, &item.body);
        let similarity_text = similarity_text(
            &item.title,
            &item.body,
            url.host(),
            self.config.content_chars_for_similarity,
        );
        Ok(Prepared {
            item,
            url,
            fingerprint,
            similarity_text,
        })
    }

    /// Runs store lookups and candidate embeddings ahead of the sequential
    /// pass on up to `max_concurrent_embeddings` workers.
    ///
    /// Only candidates the index cannot already resolve are prefetched, and
    /// only the first occurrence of a URL or fingerprint in the batch (with no
    /// store hit) is embedded, so embeddings are computed only for items that
    /// reach the semantic stage. Workers stop taking candidates once `cancel`
    /// is set; the sequential pass computes anything left undone.
    fn prefetch(
        &self,
        prepared: &[Result<Prepared<'_>>],
        since: DateTime<Utc>,
        consult_store: bool,
        cancel: &CancelFlag,
    ) -> Vec<Prefetched> {
        let mut seen_urls = HashSet::new();
        let mut seen_fingerprints = HashSet::new();
        let mut work: Vec<(usize, &Prepared<'_>, bool)> = Vec::new();

        for (i, candidate) in prepared.iter().enumerate() {
            let Ok(candidate) = candidate else { continue };
            let first_url = seen_urls.insert(candidate.url.key());
            let first_fingerprint = seen_fingerprints.insert(&candidate.fingerprint);
            let in_index = self.index.lookup_url(candidate.url.key()).is_some()
                || self.index.lookup_fingerprint(&candidate.fingerprint).is_some();
            if !in_index {
                work.push((i, candidate, first_url && first_fingerprint));
            }
        }

        let mut results: Vec<Prefetched> = prepared.iter().map(|_| Prefetched::default()).collect();
        if work.is_empty() {
            return results;
        }

        let workers = self.config.max_concurrent_embeddings.clamp(1, work.len());
        let next = AtomicUsize::new(0);
        let run = || {
            let mut done = Vec::new();
            while !cancel.is_cancelled() {
                let slot = next.fetch_add(1, Ordering::Relaxed);
                let Some(&(i, candidate, embed)) = work.get(slot) else {
                    break;
                };
                done.push((i, self.prefetch_one(candidate, since, consult_store, embed)));
            }
            done
        };

        let finished: Vec<(usize, Prefetched)> = if workers == 1 {
            run()
        } else {
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..workers).map(|_| scope.spawn(run)).collect();
                handles
                    .into_iter()
                    .filter_map(|handle| handle.join().ok())
                    .flatten()
                    .collect()
            })
        };

        for (i, pre) in finished {
            if let Some(slot) = results.get_mut(i) {
                *slot = pre;
            }
        }
        results
    }

    fn prefetch_one(
        &self,
        candidate: &Prepared<'_>,
        since: DateTime<Utc>,
        consult_store: bool,
        embed: bool,
    ) -> Prefetched {
        let by_url = consult_store.then(|| self.store.find_by_url(candidate.url.key(), since));
        let url_hit = matches!(by_url, Some(Ok(Some(_))));
        let by_fingerprint = (consult_store && !url_hit)
            .then(|| self.store.find_by_fingerprint(&candidate.fingerprint, since));
        let hash_hit = matches!(by_fingerprint, Some(Ok(Some(_))));
        let embedding = (embed && !url_hit && !hash_hit).then(|| {
            self.cache
                .get_or_compute(&candidate.fingerprint, &candidate.similarity_text)
        });
        Prefetched {
            by_url,
            by_fingerprint,
            embedding,
        }
    }

    /// Runs the stages for one well-formed candidate.
    fn decide(
        &self,
        candidate: &Prepared<'_>,
        pre: Prefetched,
        as_of: DateTime<Utc>,
        since: DateTime<Utc>,
        state: &mut BatchState,
    ) -> DuplicateMatch {
        // URL stage
        state.counters.urls_checked += 1;
        let url_match = self
            .index
            .lookup_url(candidate.url.key())
            .or_else(|| state.accepted_by_url(candidate.url.key()))
            .or_else(|| {
                store_lookup(pre.by_url, state, "find_by_url", || {
                    self.store.find_by_url(candidate.url.key(), since)
                })
            });
        if let Some(matched) = url_match {
            state.counters.url_hits += 1;
            return duplicate(MatchStrategy::Url, matched, candidate);
        }
        record_miss(MatchStrategy::Url);

        // Hash stage
        state.counters.hash_checked += 1;
        let hash_match = self
            .index
            .lookup_fingerprint(&candidate.fingerprint)
            .or_else(|| state.accepted_by_fingerprint(&candidate.fingerprint))
            .or_else(|| {
                store_lookup(pre.by_fingerprint, state, "find_by_fingerprint", || {
                    self.store.find_by_fingerprint(&candidate.fingerprint, since)
                })
            });
        if let Some(matched) = hash_match {
            state.counters.hash_hits += 1;
            return duplicate(MatchStrategy::Hash, matched, candidate);
        }
        record_miss(MatchStrategy::Hash);

        // Semantic stage
        let embedding = pre.embedding.unwrap_or_else(|| {
            self.cache
                .get_or_compute(&candidate.fingerprint, &candidate.similarity_text)
        });
        let embedding = match embedding {
            Ok(embedding) => embedding,
            Err(err) => {
                state.counters.embedding_failures += 1;
                metrics::counter!("dedup_embedding_failures_total").increment(1);
                tracing::warn!(
                    fingerprint = %candidate.fingerprint.short(),
                    error = %err,
                    "Embedding unavailable, skipping semantic stage"
                );
                let decision = DuplicateMatch::unique("no URL or content match; semantic stage skipped")
                    .with_semantic_skipped();
                self.accept(candidate, None, as_of, state);
                return decision;
            },
        };

        state.counters.semantic_checked += 1;
        let targets = self.semantic_targets(since, state);
        let best = best_match(&embedding, &targets, self.config.tie_break);
        let threshold = self.config.similarity_threshold;

        if let Some(best) = best.as_ref().filter(|b| b.score >= threshold) {
            state.counters.semantic_hits += 1;
            metrics::counter!("dedup_checks_total", "strategy" => "semantic", "result" => "hit")
                .increment(1);
            tracing::info!(
                title = %candidate.item.title,
                matched = %best.item.title,
                score = best.score,
                "Duplicate found via semantic similarity"
            );
            return DuplicateMatch::semantic(best.item.clone(), best.score, threshold);
        }
        record_miss(MatchStrategy::Semantic);

        let best_score = best.map_or(0.0, |b| b.score);
        self.accept(candidate, Some(embedding), as_of, state);
        DuplicateMatch::unique(format!(
            "no match (best similarity {best_score:.3} < {threshold:.3})"
        ))
        .with_score(best_score)
    }

    /// Collects recent items with their embeddings for the semantic scan.
    ///
    /// Items accepted earlier in the batch are included even if the index has
    /// already evicted them. Items indexed without an embedding are resolved
    /// through the cache from their similarity text; one that fails is left out
    /// for the rest of the batch.
    fn semantic_targets(
        &self,
        since: DateTime<Utc>,
        state: &mut BatchState,
    ) -> Vec<SemanticTarget> {
        let mut items = self.index.candidates_since(since);
        let listed: HashSet<Fingerprint> =
            items.iter().map(|i| i.fingerprint.clone()).collect();
        let evicted: Vec<IndexedItem> = state
            .accepted
            .iter()
            .filter(|i| i.published_at >= since && !listed.contains(&i.fingerprint))
            .cloned()
            .collect();
        if !evicted.is_empty() {
            items.extend(evicted);
            items.sort_by_key(|i| i.published_at);
        }

        let mut targets = Vec::with_capacity(items.len());
        for item in items {
            if state.unresolvable.contains(&item.fingerprint) {
                continue;
            }
            let embedding = match &item.embedding {
                Some(embedding) => Arc::clone(embedding),
                None => match self
                    .cache
                    .get_or_compute(&item.fingerprint, &item.similarity_text)
                {
                    Ok(embedding) => embedding,
                    Err(err) => {
                        tracing::debug!(
                            fingerprint = %item.fingerprint.short(),
                            error = %err,
                            "Skipping comparison target without embedding"
                        );
                        state.unresolvable.insert(item.fingerprint);
                        continue;
                    },
                },
            };
            targets.push(SemanticTarget { item, embedding });
        }
        targets
    }

    /// Indexes and persists an accepted candidate.
    fn accept(
        &self,
        candidate: &Prepared<'_>,
        embedding: Option<Embedding>,
        as_of: DateTime<Utc>,
        state: &mut BatchState,
    ) {
        let indexed = IndexedItem {
            url: candidate.url.as_str().to_string(),
            url_key: candidate.url.key().to_string(),
            fingerprint: candidate.fingerprint.clone(),
            title: candidate.item.title.clone(),
            source_id: candidate.item.source_id.clone(),
            similarity_text: candidate.similarity_text.clone(),
            embedding,
            published_at: candidate.item.published_at,
            accepted_at: Utc::now(),
        };

        if state.store_ok
            && let Err(err) = self.store.persist(&indexed)
        {
            state.degrade("persist", &err);
        }
        state.remember(&indexed);
        self.index.insert(indexed, as_of);
        state.counters.accepted += 1;
        metrics::counter!("dedup_accepted_total").increment(1);
    }
}

/// Resolves a store lookup, preferring a prefetched result.
///
/// Once the store has failed in this batch it is not consulted again.
fn store_lookup(
    prefetched: Option<StoreLookup>,
    state: &mut BatchState,
    operation: &str,
    call: impl FnOnce() -> StoreLookup,
) -> Option<IndexedItem> {
    if !state.store_ok {
        return None;
    }
    match prefetched.unwrap_or_else(call) {
        Ok(found) => found,
        Err(err) => {
            state.degrade(operation, &err);
            None
        },
    }
}

fn duplicate(strategy: MatchStrategy, matched: IndexedItem, candidate: &Prepared<'_>) -> DuplicateMatch {
    metrics::counter!("dedup_checks_total", "strategy" => strategy.as_str(), "result" => "hit")
        .increment(1);
    tracing::info!(
        strategy = %strategy,
        title = %candidate.item.title,
        matched = %matched.title,
        "Duplicate found"
    );
    DuplicateMatch::exact(strategy, matched)
}

fn record_miss(strategy: MatchStrategy) {
    metrics::counter!("dedup_checks_total", "strategy" => strategy.as_str(), "result" => "miss")
        .increment(1);
}

impl std::fmt::Debug for DeduplicationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeduplicationEngine")
            .field("config", &self.config)
            .field("index_len", &self.index.len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use chrono::TimeDelta;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU64;

    /// Maps text to a vector by keyword so tests control similarity.
    struct KeywordEmbedder {
        calls: AtomicU64,
        texts: Mutex<Vec<String>>,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicU64::new(0),
                texts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Embedder for KeywordEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.lock().unwrap().push(text.to_string());
            if text.contains("quantum") {
                Ok(vec![0.0, 1.0])
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    /// Store whose every call fails.
    struct DownStore;

    impl ItemStore for DownStore {
        fn find_by_url(&self, _: &str, _: DateTime<Utc>) -> StoreLookup {
            Err(down("find_by_url"))
        }

        fn find_by_fingerprint(&self, _: &Fingerprint, _: DateTime<Utc>) -> StoreLookup {
            Err(down("find_by_fingerprint"))
        }

        fn find_recent(&self, _: DateTime<Utc>) -> Result<Vec<IndexedItem>> {
            Err(down("find_recent"))
        }

        fn persist(&self, _: &IndexedItem) -> Result<()> {
            Err(down("persist"))
        }
    }

    fn down(operation: &str) -> Error {
        Error::StoreUnavailable {
            operation: operation.to_string(),
            cause: "connection refused".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn candidate(url: &str, title: &str, body: &str) -> CandidateItem {
        CandidateItem::new(url, title, body, "test-feed", now())
    }

    fn engine_with(embedder: Arc<KeywordEmbedder>, store: Arc<dyn ItemStore>) -> DeduplicationEngine {
        DeduplicationEngine::new(embedder, store, DeduplicationConfig::default())
    }

    #[test]
    fn test_single_item_accepted_then_url_duplicate() {
        let engine = engine_with(Arc::new(KeywordEmbedder::new()), Arc::new(InMemoryStore::new()));
        let item = candidate("https://example.com/a", "Model launch", "A new model ships");

        let first = engine.check(&item, now());
        assert!(!first.is_duplicate);

        let second = engine.check(&item, now());
        assert!(second.is_duplicate);
        assert_eq!(second.strategy, Some(MatchStrategy::Url));
    }

    #[test]
    fn test_malformed_candidate_not_indexed() {
        let engine = engine_with(Arc::new(KeywordEmbedder::new()), Arc::new(InMemoryStore::new()));
        let batch = vec![
            candidate("not a url", "Title", "Body"),
            candidate("https://example.com/blank", "  ", "\n"),
        ];

        let result = engine.check_batch(&batch, now());
        assert!(result.decisions.iter().all(|d| d.malformed && !d.is_duplicate));
        assert_eq!(result.counters.malformed, 2);
        assert!(engine.index().is_empty());
    }

    #[test]
    fn test_embeddings_only_for_items_reaching_semantic_stage() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let engine = engine_with(embedder.clone(), Arc::new(InMemoryStore::new()));
        let batch = vec![
            candidate("https://example.com/a", "Quantum chips", "quantum advantage"),
            candidate("https://example.com/a?utm_source=rss", "Other", "other body"),
            candidate("https://example.com/b", "Quantum chips", "quantum advantage"),
        ];

        let result = engine.check_batch(&batch, now());
        let flags: Vec<bool> = result.flags().collect();
        assert_eq!(flags, vec![false, true, true]);
        assert_eq!(embedder.calls(), 1);
    }

    #[test]
    fn test_store_failure_marks_partial_and_continues() {
        let engine = engine_with(Arc::new(KeywordEmbedder::new()), Arc::new(DownStore));
        let batch = vec![
            candidate("https://example.com/a", "A", "alpha"),
            candidate("https://example.com/a", "A", "alpha"),
        ];

        let result = engine.check_batch(&batch, now());
        assert!(result.partial);
        assert_eq!(result.counters.store_unavailable, 1);
        let flags: Vec<bool> = result.flags().collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn test_cancelled_batch_returns_prefix() {
        let engine = engine_with(Arc::new(KeywordEmbedder::new()), Arc::new(InMemoryStore::new()));
        let cancel = CancelFlag::new();
        cancel.cancel();

        let batch = vec![candidate("https://example.com/a", "A", "alpha")];
        let result = engine.check_batch_cancellable(&batch, now(), &cancel);
        assert!(result.cancelled);
        assert!(result.decisions.is_empty());
        assert!(engine.index().is_empty());
    }

    #[test]
    fn test_disabled_accepts_everything_without_indexing() {
        let engine = DeduplicationEngine::new(
            Arc::new(KeywordEmbedder::new()),
            Arc::new(InMemoryStore::new()),
            DeduplicationConfig::default().with_enabled(false),
        );
        let item = candidate("https://example.com/a", "A", "alpha");
        let result = engine.check_batch(&[item.clone(), item], now());
        assert!(result.decisions.iter().all(|d| !d.is_duplicate));
        assert!(engine.index().is_empty());
    }

    #[test]
    fn test_warm_up_loads_recent_items_from_store() {
        let store = Arc::new(InMemoryStore::new());
        let seeded = IndexedItem {
            url: "https://example.com/old".to_string(),
            url_key: "example.com/old".to_string(),
            fingerprint: ContentHasher::fingerprint("Old", "story"),
            title: "Old".to_string(),
            source_id: "feed".to_string(),
            similarity_text: "Title: Old".to_string(),
            embedding: None,
            published_at: now() - TimeDelta::days(2),
            accepted_at: now() - TimeDelta::days(2),
        };
        store.persist(&seeded).unwrap();

        let engine = engine_with(Arc::new(KeywordEmbedder::new()), store);
        let result = engine.check_batch(&[], now());
        assert!(result.decisions.is_empty());
        assert_eq!(engine.index().len(), 1);
    }

    #[test]
    fn test_clear_memory() {
        let engine = engine_with(Arc::new(KeywordEmbedder::new()), Arc::new(InMemoryStore::new()));
        let _ = engine.check(&candidate("https://example.com/a", "A", "alpha"), now());
        assert_eq!(engine.index().len(), 1);
        assert_eq!(engine.cache().len(), 1);

        engine.clear_memory();
        assert!(engine.index().is_empty());
        assert!(engine.cache().is_empty());
    }
}
