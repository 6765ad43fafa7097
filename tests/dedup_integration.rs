//! Integration tests for the deduplication engine.
//!
//! Drive the public API with stub embedders and in-memory stores and check
//! the decision properties end to end.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{DateTime, TimeDelta, Utc};
use newsdedup::services::deduplication::ContentHasher;
use newsdedup::{
    CancelFlag, CandidateItem, DeduplicationConfig, DeduplicationEngine, Embedder, Error,
    IndexedItem, InMemoryStore, ItemStore, MatchStrategy, Result, SimilarityCache,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// ============================================================================
// Stubs
// ============================================================================

/// Returns a fixed vector per keyword found in the text.
struct KeywordEmbedder {
    calls: AtomicU64,
}

impl KeywordEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
        })
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
        let vector = if text.contains("alpha") {
            vec![1.0, 0.0]
        } else if text.contains("beta") {
            vec![0.0, 1.0]
        } else if text.contains("gamma") {
            vec![-0.001, 1.0]
        } else {
            vec![0.7, 0.7]
        };
        Ok(vector)
    }
}

/// Provider that is always down.
struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dimensions(&self) -> usize {
        2
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::EmbeddingUnavailable("model offline".to_string()))
    }
}

/// Requests cancellation from inside the first embedding call.
struct CancellingEmbedder {
    cancel: CancelFlag,
    calls: AtomicU64,
}

impl Embedder for CancellingEmbedder {
    fn dimensions(&self) -> usize {
        2
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        Ok(vec![1.0, 0.0])
    }
}

/// Fails only for texts mentioning "broken", counting those attempts.
struct BrokenTargetEmbedder {
    broken_calls: AtomicU64,
}

impl Embedder for BrokenTargetEmbedder {
    fn dimensions(&self) -> usize {
        2
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("broken") {
            self.broken_calls.fetch_add(1, Ordering::SeqCst);
            return Err(Error::EmbeddingUnavailable("bad input".to_string()));
        }
        Ok(vec![1.0, 0.0])
    }
}

fn as_of() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-10T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn item(url: &str, title: &str, body: &str) -> CandidateItem {
    CandidateItem::new(url, title, body, "integration-feed", as_of())
}

fn engine(embedder: Arc<dyn Embedder>, config: DeduplicationConfig) -> DeduplicationEngine {
    DeduplicationEngine::new(embedder, Arc::new(InMemoryStore::new()), config)
}

// ============================================================================
// Decision properties
// ============================================================================

#[test]
fn test_rechecking_accepted_item_is_url_duplicate() {
    let engine = engine(KeywordEmbedder::new(), DeduplicationConfig::default());
    let batch = vec![item("https://example.com/launch", "Model launch", "alpha release")];

    let first = engine.check_batch(&batch, as_of());
    assert_eq!(first.flags().collect::<Vec<_>>(), vec![false]);
    assert_eq!(first.counters.accepted, 1);

    let second = engine.check_batch(&batch, as_of());
    assert_eq!(second.flags().collect::<Vec<_>>(), vec![true]);
    assert_eq!(second.decisions[0].strategy, Some(MatchStrategy::Url));
}

#[test]
fn test_tracking_params_and_scheme_do_not_change_identity() {
    let engine = engine(KeywordEmbedder::new(), DeduplicationConfig::default());
    let batch = vec![
        item("https://Example.com/a/?utm_source=x", "First story", "alpha"),
        item("http://example.com/a", "Rewritten headline", "entirely different words"),
    ];

    let result = engine.check_batch(&batch, as_of());
    let second = &result.decisions[1];
    assert!(second.is_duplicate);
    assert_eq!(second.strategy, Some(MatchStrategy::Url));
    assert!((second.score - 1.0).abs() < f32::EPSILON);
    assert_eq!(
        second.matched_against.as_ref().unwrap().title,
        "First story"
    );
}

#[test]
fn test_same_content_under_new_url_is_hash_duplicate() {
    let engine = engine(KeywordEmbedder::new(), DeduplicationConfig::default());
    let batch = vec![
        item("https://blog.example.com/post", "Open weights", "The alpha model is out."),
        item("https://mirror.example.org/copy", "  OPEN   weights ", "the alpha model is out."),
    ];

    let result = engine.check_batch(&batch, as_of());
    assert!(result.decisions[1].is_duplicate);
    assert_eq!(result.decisions[1].strategy, Some(MatchStrategy::Hash));
    assert_eq!(result.counters.hash_hits, 1);
}

#[test]
fn test_score_equal_to_threshold_is_duplicate() {
    // Orthogonal vectors score exactly 0.5.
    let config = DeduplicationConfig::default().with_similarity_threshold(0.5);
    let engine = engine(KeywordEmbedder::new(), config);
    let batch = vec![
        item("https://example.com/one", "First", "alpha"),
        item("https://example.com/two", "Second", "beta"),
    ];

    let result = engine.check_batch(&batch, as_of());
    let second = &result.decisions[1];
    assert!(second.is_duplicate);
    assert_eq!(second.strategy, Some(MatchStrategy::Semantic));
    assert!((second.score - 0.5).abs() < f32::EPSILON);
}

#[test]
fn test_score_just_below_threshold_is_unique() {
    let config = DeduplicationConfig::default().with_similarity_threshold(0.5);
    let engine = engine(KeywordEmbedder::new(), config);
    let batch = vec![
        item("https://example.com/one", "First", "alpha"),
        item("https://example.com/two", "Second", "gamma"),
    ];

    let result = engine.check_batch(&batch, as_of());
    let second = &result.decisions[1];
    assert!(!second.is_duplicate);
    assert!(second.score < 0.5);
    assert!(second.score > 0.49);
}

#[test]
fn test_items_outside_recency_window_are_not_semantic_targets() {
    let embedder = KeywordEmbedder::new();
    let engine = engine(embedder, DeduplicationConfig::default());
    let published = as_of() - TimeDelta::days(10);
    engine.index().insert(
        IndexedItem {
            url: "https://example.com/old".to_string(),
            url_key: "example.com/old".to_string(),
            fingerprint: ContentHasher::fingerprint("Old alpha", "alpha story"),
            title: "Old alpha".to_string(),
            source_id: "integration-feed".to_string(),
            similarity_text: "Title: Old alpha\n\nContent: alpha story".to_string(),
            embedding: Some(Arc::from(vec![1.0_f32, 0.0])),
            published_at: published,
            accepted_at: published,
        },
        as_of(),
    );
    assert_eq!(engine.index().len(), 1);

    let result = engine.check_batch(&[item("https://example.com/new", "New", "alpha")], as_of());
    assert!(!result.decisions[0].is_duplicate);
    assert_eq!(result.counters.semantic_hits, 0);
}

#[test]
fn test_within_batch_duplicates_keep_order() {
    let engine = engine(KeywordEmbedder::new(), DeduplicationConfig::default());
    let batch = vec![
        item("https://example.com/a", "Chip export rules", "alpha"),
        item("https://example.org/b", "Robotics funding", "beta"),
        item("https://example.com/a", "Chip export rules", "alpha"),
    ];

    let result = engine.check_batch(&batch, as_of());
    assert_eq!(result.flags().collect::<Vec<_>>(), vec![false, false, true]);
    assert_eq!(result.decisions[2].strategy, Some(MatchStrategy::Url));
}

#[test]
fn test_old_item_stays_matchable_within_its_batch() {
    let engine = engine(KeywordEmbedder::new(), DeduplicationConfig::default());
    let old = CandidateItem::new(
        "https://arxiv.org/abs/2401.00001",
        "Back-catalog paper",
        "alpha",
        "integration-feed",
        as_of() - TimeDelta::days(40),
    );
    let batch = vec![
        old.clone(),
        item("https://example.org/b", "Robotics funding", "beta"),
        old,
    ];

    let result = engine.check_batch(&batch, as_of());
    assert_eq!(result.flags().collect::<Vec<_>>(), vec![false, false, true]);
    assert_eq!(result.decisions[2].strategy, Some(MatchStrategy::Url));
}

#[test]
fn test_item_evicted_by_capacity_stays_matchable_within_its_batch() {
    let engine = engine(
        KeywordEmbedder::new(),
        DeduplicationConfig::default().with_index_max_items(1),
    );
    let older = CandidateItem::new(
        "https://example.org/older",
        "Yesterday's story",
        "beta",
        "integration-feed",
        as_of() - TimeDelta::days(1),
    );
    let batch = vec![
        item("https://example.com/new", "Today's story", "alpha"),
        older.clone(),
        older,
    ];

    let result = engine.check_batch(&batch, as_of());
    assert_eq!(result.flags().collect::<Vec<_>>(), vec![false, false, true]);
    assert_eq!(result.decisions[2].strategy, Some(MatchStrategy::Url));
    assert_eq!(engine.index().len(), 1);
}

#[test]
fn test_failing_provider_degrades_to_exact_matching() {
    let engine = engine(Arc::new(FailingEmbedder), DeduplicationConfig::default());
    let batch = vec![
        item("https://example.com/1", "One", "first story"),
        item("https://example.com/2", "Two", "second story"),
        item("https://example.com/3", "Three", "third story"),
    ];

    let result = engine.check_batch(&batch, as_of());
    assert!(result.flags().all(|duplicate| !duplicate));
    assert!(result.decisions.iter().all(|d| d.semantic_skipped));
    assert_eq!(result.counters.embedding_failures, 3);
    assert_eq!(result.counters.accepted, 3);

    // Exact stages still work without a provider.
    let again = engine.check_batch(&batch[..1], as_of());
    assert_eq!(again.decisions[0].strategy, Some(MatchStrategy::Url));
}

#[test]
fn test_cancelled_batch_keeps_prefix_accepted() {
    let engine = engine(KeywordEmbedder::new(), DeduplicationConfig::default());
    let cancel = CancelFlag::new();
    let batch = vec![item("https://example.com/a", "A", "alpha")];
    assert!(!engine.check_batch_cancellable(&batch, as_of(), &cancel).cancelled);

    cancel.cancel();
    let result = engine.check_batch_cancellable(&batch, as_of(), &cancel);
    assert!(result.cancelled);
    assert!(result.decisions.is_empty());
    assert_eq!(engine.index().len(), 1);
}

#[test]
fn test_cancel_during_batch_stops_further_embedding() {
    let cancel = CancelFlag::new();
    let embedder = Arc::new(CancellingEmbedder {
        cancel: cancel.clone(),
        calls: AtomicU64::new(0),
    });
    let engine = engine(
        embedder.clone(),
        DeduplicationConfig::default().with_max_concurrent_embeddings(1),
    );
    let batch: Vec<CandidateItem> = (0..20)
        .map(|i| {
            item(
                &format!("https://example.com/{i}"),
                &format!("Story {i}"),
                &format!("body {i}"),
            )
        })
        .collect();

    let result = engine.check_batch_cancellable(&batch, as_of(), &cancel);
    assert!(result.cancelled);
    assert!(result.decisions.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    assert!(engine.index().is_empty());
}

#[test]
fn test_target_without_embedding_is_tried_once_per_batch() {
    let store = Arc::new(InMemoryStore::new());
    store
        .persist(&IndexedItem {
            url: "https://example.com/broken".to_string(),
            url_key: "example.com/broken".to_string(),
            fingerprint: ContentHasher::fingerprint("Broken", "broken story"),
            title: "Broken".to_string(),
            source_id: "integration-feed".to_string(),
            similarity_text: "Title: Broken\n\nContent: broken story".to_string(),
            embedding: None,
            published_at: as_of() - TimeDelta::days(2),
            accepted_at: as_of() - TimeDelta::days(2),
        })
        .unwrap();
    let embedder = Arc::new(BrokenTargetEmbedder {
        broken_calls: AtomicU64::new(0),
    });
    let engine = DeduplicationEngine::new(
        embedder.clone(),
        store,
        DeduplicationConfig::default().with_similarity_threshold(1.1),
    );
    let batch: Vec<CandidateItem> = (0..5)
        .map(|i| {
            item(
                &format!("https://example.org/{i}"),
                &format!("Story {i}"),
                &format!("body {i}"),
            )
        })
        .collect();

    let result = engine.check_batch(&batch, as_of());
    assert_eq!(result.counters.semantic_checked, 5);
    assert_eq!(embedder.broken_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_history_from_store_matches_across_engines() {
    let store = Arc::new(InMemoryStore::new());
    let batch = vec![item("https://example.com/a", "A", "alpha")];

    let first = DeduplicationEngine::new(
        KeywordEmbedder::new(),
        store.clone(),
        DeduplicationConfig::default(),
    );
    assert!(!first.check_batch(&batch, as_of()).decisions[0].is_duplicate);
    assert_eq!(store.len(), 1);

    let second = DeduplicationEngine::new(
        KeywordEmbedder::new(),
        store.clone(),
        DeduplicationConfig::default(),
    );
    let result = second.check_batch(&batch, as_of());
    assert!(result.decisions[0].is_duplicate);
    assert!(!result.partial);
    assert_eq!(store.find_recent(as_of() - TimeDelta::days(1)).unwrap().len(), 1);
}

#[test]
fn test_provider_called_once_per_distinct_story() {
    let embedder = KeywordEmbedder::new();
    let engine = engine(embedder.clone(), DeduplicationConfig::default());
    let batch = vec![
        item("https://example.com/1", "One", "alpha"),
        item("https://example.com/2", "Two", "beta"),
    ];

    let _ = engine.check_batch(&batch, as_of());
    let calls = embedder.calls();
    assert_eq!(calls, 2);

    let _ = engine.check_batch(&batch, as_of());
    assert_eq!(embedder.calls(), calls);
}

// ============================================================================
// Similarity cache
// ============================================================================

#[test]
fn test_cache_evicts_least_recently_used() {
    let cache = SimilarityCache::new(KeywordEmbedder::new(), 2, Duration::from_secs(3600));
    let first = ContentHasher::fingerprint("first", "alpha");
    let second = ContentHasher::fingerprint("second", "beta");
    let third = ContentHasher::fingerprint("third", "gamma");

    cache.get_or_compute(&first, "alpha").unwrap();
    cache.get_or_compute(&second, "beta").unwrap();
    cache.get_or_compute(&third, "gamma").unwrap();

    assert!(!cache.contains(&first));
    assert!(cache.contains(&second));
    assert!(cache.contains(&third));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_cache_access_refreshes_recency() {
    let cache = SimilarityCache::new(KeywordEmbedder::new(), 2, Duration::from_secs(3600));
    let first = ContentHasher::fingerprint("first", "alpha");
    let second = ContentHasher::fingerprint("second", "beta");
    let third = ContentHasher::fingerprint("third", "gamma");

    cache.get_or_compute(&first, "alpha").unwrap();
    cache.get_or_compute(&second, "beta").unwrap();
    assert!(cache.get(&first).is_some());
    cache.get_or_compute(&third, "gamma").unwrap();

    assert!(cache.contains(&first));
    assert!(!cache.contains(&second));
    assert!(cache.contains(&third));
}
