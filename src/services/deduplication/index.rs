//! Recent-item index.
//!
//! Bounded in-memory window of accepted items. The URL and hash stages look
//! items up here before falling back to the persistent store, and the semantic
//! stage scans it for comparison targets.

use crate::models::{Fingerprint, IndexedItem};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::instrument;

use super::config::DeduplicationConfig;

#[derive(Debug, Default)]
struct Inner {
    by_fingerprint: HashMap<Fingerprint, IndexedItem>,
    by_url: HashMap<String, Fingerprint>,
    /// Eviction order: oldest publication first, then insertion order.
    by_age: BTreeMap<(DateTime<Utc>, u64), Fingerprint>,
    next_seq: u64,
}

impl Inner {
    fn remove_oldest(&mut self) -> Option<IndexedItem> {
        let (_, fingerprint) = self.by_age.pop_first()?;
        let item = self.by_fingerprint.remove(&fingerprint)?;
        if self.by_url.get(&item.url_key) == Some(&fingerprint) {
            self.by_url.remove(&item.url_key);
        }
        Some(item)
    }

    fn oldest_published(&self) -> Option<DateTime<Utc>> {
        self.by_age.first_key_value().map(|((published, _), _)| *published)
    }
}

/// Bounded window of recently accepted items.
///
/// Bounded by item count and by publication age; whichever bound is exceeded,
/// the oldest published items go first. Never holds two entries with the same
/// fingerprint.
///
/// # Thread Safety
///
/// Lookups take a read lock and may run concurrently. Inserts and evictions
/// take the write lock, so they are serialized and every later lookup sees
/// them.
///
/// # Example
///
/// ```rust,ignore
/// use newsdedup::RecentItemIndex;
/// use std::time::Duration;
///
/// let index = RecentItemIndex::new(5_000, Duration::from_secs(30 * 86_400));
/// index.insert(item, chrono::Utc::now());
/// assert!(index.lookup_url("example.com/a").is_some());
/// ```
#[derive(Debug)]
pub struct RecentItemIndex {
    inner: RwLock<Inner>,
    max_items: usize,
    max_age: TimeDelta,
}

impl RecentItemIndex {
    /// Creates an empty index.
    ///
    /// A `max_items` of zero is treated as one.
    #[must_use]
    pub fn new(max_items: usize, max_age: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_items: max_items.max(1),
            max_age: TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Creates an index sized from the deduplication config.
    #[must_use]
    pub fn from_config(config: &DeduplicationConfig) -> Self {
        Self::new(config.index_max_items, config.index_max_age)
    }

    /// Looks an item up by canonical URL key.
    #[must_use]
    pub fn lookup_url(&self, url_key: &str) -> Option<IndexedItem> {
        let inner = self.read();
        let fingerprint = inner.by_url.get(url_key)?;
        inner.by_fingerprint.get(fingerprint).cloned()
    }

    /// Looks an item up by content fingerprint.
    #[must_use]
    pub fn lookup_fingerprint(&self, fingerprint: &Fingerprint) -> Option<IndexedItem> {
        self.read().by_fingerprint.get(fingerprint).cloned()
    }

    /// Returns items published at or after `since`.
    ///
    /// Ordered by publication time, then insertion order, both ascending.
    #[must_use]
    pub fn candidates_since(&self, since: DateTime<Utc>) -> Vec<IndexedItem> {
        let inner = self.read();
        inner
            .by_age
            .range((since, 0)..)
            .filter_map(|(_, fingerprint)| inner.by_fingerprint.get(fingerprint))
            .cloned()
            .collect()
    }

    /// Inserts an accepted item, then enforces the age and count bounds
    /// relative to `now`.
    ///
    /// Returns `false` without changes if the fingerprint is already present.
    #[instrument(
        skip(self, item),
        fields(operation = "recent_index_insert", fingerprint = %item.fingerprint.short())
    )]
    pub fn insert(&self, item: IndexedItem, now: DateTime<Utc>) -> bool {
        let len = {
            let mut inner = self.write();
            if inner.by_fingerprint.contains_key(&item.fingerprint) {
                tracing::debug!("Fingerprint already indexed");
                return false;
            }

            let seq = inner.next_seq;
            inner.next_seq += 1;
            let fingerprint = item.fingerprint.clone();
            inner.by_age.insert((item.published_at, seq), fingerprint.clone());
            inner
                .by_url
                .entry(item.url_key.clone())
                .or_insert_with(|| fingerprint.clone());
            inner.by_fingerprint.insert(fingerprint, item);

            self.enforce_bounds(&mut inner, now);
            inner.by_fingerprint.len()
        };
        record_size(len);
        true
    }

    /// Inserts many items, e.g. when warming up from the persistent store.
    ///
    /// Returns the number of items actually added.
    pub fn extend(&self, items: impl IntoIterator<Item = IndexedItem>, now: DateTime<Utc>) -> usize {
        items
            .into_iter()
            .map(|item| self.insert(item, now))
            .filter(|added| *added)
            .count()
    }

    /// Removes items published before `now - max_age`.
    ///
    /// Returns the number of items removed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let (removed, len) = {
            let mut inner = self.write();
            let removed = self.evict_by_age(&mut inner, now);
            (removed, inner.by_fingerprint.len())
        };
        record_size(len);
        removed
    }

    /// Returns the number of indexed items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().by_fingerprint.len()
    }

    /// Returns true if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every item.
    pub fn clear(&self) {
        *self.write() = Inner::default();
        record_size(0);
    }

    fn enforce_bounds(&self, inner: &mut Inner, now: DateTime<Utc>) {
        let aged_out = self.evict_by_age(inner, now);
        let mut over_capacity = 0;
        while inner.by_fingerprint.len() > self.max_items {
            if inner.remove_oldest().is_none() {
                break;
            }
            over_capacity += 1;
        }
        if aged_out + over_capacity > 0 {
            tracing::debug!(aged_out, over_capacity, "Evicted items from recent index");
        }
    }

    fn evict_by_age(&self, inner: &mut Inner, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.max_age) else {
            return 0;
        };
        let mut removed = 0;
        while inner.oldest_published().is_some_and(|published| published < cutoff) {
            if inner.remove_oldest().is_none() {
                break;
            }
            removed += 1;
        }
        removed
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_size(len: usize) {
    metrics::gauge!("recent_index_size").set(len as f64);
}
