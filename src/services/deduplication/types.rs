//! Deduplication result types.

use crate::models::IndexedItem;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Which stage declared an item a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Canonical URL identity.
    Url,
    /// Content fingerprint identity.
    Hash,
    /// Embedding similarity at or above the threshold.
    Semantic,
}

impl MatchStrategy {
    /// Returns the strategy as a metrics label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Hash => "hash",
            Self::Semantic => "semantic",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decision for one candidate item.
///
/// # Example
///
/// ```rust
/// use newsdedup::{DuplicateMatch, MatchStrategy};
///
/// let accepted = DuplicateMatch::unique("no match");
/// assert!(!accepted.is_duplicate);
/// assert!(accepted.strategy.is_none());
/// assert_eq!(accepted.score, 0.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    /// Whether the candidate repeats an accepted item.
    pub is_duplicate: bool,

    /// The accepted item the candidate matched.
    pub matched_against: Option<IndexedItem>,

    /// The stage that matched.
    pub strategy: Option<MatchStrategy>,

    /// `1.0` for URL and hash matches, the normalized similarity for semantic
    /// matches, and the best similarity seen (or `0.0`) for unique items.
    pub score: f32,

    /// Human-readable explanation.
    pub reason: String,

    /// The candidate had no usable URL or text and was not indexed.
    #[serde(default)]
    pub malformed: bool,

    /// The semantic stage could not run because no embedding was available.
    #[serde(default)]
    pub semantic_skipped: bool,
}

impl DuplicateMatch {
    /// Creates a non-duplicate decision.
    #[must_use]
    pub fn unique(reason: impl Into<String>) -> Self {
        Self {
            is_duplicate: false,
            matched_against: None,
            strategy: None,
            score: 0.0,
            reason: reason.into(),
            malformed: false,
            semantic_skipped: false,
        }
    }

    /// Creates a duplicate decision from an exact (URL or hash) match.
    #[must_use]
    pub fn exact(strategy: MatchStrategy, matched: IndexedItem) -> Self {
        let reason = match strategy {
            MatchStrategy::Url => format!("same URL as '{}'", matched.title),
            MatchStrategy::Hash => format!("same content as '{}' ({})", matched.title, matched.url),
            MatchStrategy::Semantic => format!("similar to '{}'", matched.title),
        };
        Self {
            is_duplicate: true,
            matched_against: Some(matched.without_embedding()),
            strategy: Some(strategy),
            score: 1.0,
            reason,
            malformed: false,
            semantic_skipped: false,
        }
    }

    /// Creates a duplicate decision from a semantic match.
    #[must_use]
    pub fn semantic(matched: IndexedItem, score: f32, threshold: f32) -> Self {
        let reason = format!(
            "similar to '{}' (score {score:.3} >= {threshold:.3})",
            matched.title
        );
        Self {
            is_duplicate: true,
            matched_against: Some(matched.without_embedding()),
            strategy: Some(MatchStrategy::Semantic),
            score,
            reason,
            malformed: false,
            semantic_skipped: false,
        }
    }

    /// Creates a non-duplicate decision for a candidate that cannot be matched.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            malformed: true,
            ..Self::unique(reason)
        }
    }

    /// Builder method to record the best sub-threshold score.
    #[must_use]
    pub const fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Builder method to flag a skipped semantic stage.
    #[must_use]
    pub const fn with_semantic_skipped(mut self) -> Self {
        self.semantic_skipped = true;
        self
    }
}

/// Per-batch counters handed to the statistics collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupCounters {
    /// Items in the batch that were examined.
    pub items: u64,
    /// URL stage attempts.
    pub urls_checked: u64,
    /// URL stage matches.
    pub url_hits: u64,
    /// Hash stage attempts.
    pub hash_checked: u64,
    /// Hash stage matches.
    pub hash_hits: u64,
    /// Semantic stage attempts with an embedding available.
    pub semantic_checked: u64,
    /// Semantic stage matches.
    pub semantic_hits: u64,
    /// Candidates whose embedding could not be obtained.
    pub embedding_failures: u64,
    /// Failed persistent store calls.
    pub store_unavailable: u64,
    /// Malformed candidates.
    pub malformed: u64,
    /// Candidates accepted as unique.
    pub accepted: u64,
}

impl DedupCounters {
    /// Total duplicates found across all stages.
    #[must_use]
    pub const fn duplicates(&self) -> u64 {
        self.url_hits + self.hash_hits + self.semantic_hits
    }
}

/// Decisions for one batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// One decision per processed input item.
    pub decisions: Vec<DuplicateMatch>,
    /// Stage counters.
    pub counters: DedupCounters,
    /// The persistent store failed at some point, so long-tail duplicates may
    /// have been missed.
    pub partial: bool,
    /// The batch was cancelled; `decisions` covers only a prefix of the input.
    pub cancelled: bool,
}

impl BatchResult {
    /// Iterates over the `is_duplicate` flags.
    pub fn flags(&self) -> impl Iterator<Item = bool> + '_ {
        self.decisions.iter().map(|d| d.is_duplicate)
    }
}

/// Cooperative cancellation signal checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
