//! In-memory store.

use crate::models::{Fingerprint, IndexedItem};
use crate::storage::ItemStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// In-memory store for tests and one-shot runs.
///
/// Data is not persisted between runs.
///
/// # Example
///
/// ```rust
/// use newsdedup::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// assert!(store.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<Vec<IndexedItem>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `items`.
    #[must_use]
    pub const fn with_items(items: Vec<IndexedItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    /// Returns the number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the most recently persisted item matching `predicate`.
    fn find_latest(
        &self,
        operation: &str,
        since: DateTime<Utc>,
        predicate: impl Fn(&IndexedItem) -> bool,
    ) -> Result<Option<IndexedItem>> {
        let items = self.items.read().map_err(|_| poisoned(operation))?;
        Ok(items
            .iter()
            .rev()
            .find(|item| item.published_at >= since && predicate(item))
            .cloned())
    }
}

fn poisoned(operation: &str) -> Error {
    Error::StoreUnavailable {
        operation: operation.to_string(),
        cause: "lock poisoned".to_string(),
    }
}

impl ItemStore for InMemoryStore {
    fn find_by_url(&self, url_key: &str, since: DateTime<Utc>) -> Result<Option<IndexedItem>> {
        self.find_latest("find_by_url", since, |item| item.url_key == url_key)
    }

    fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        since: DateTime<Utc>,
    ) -> Result<Option<IndexedItem>> {
        self.find_latest("find_by_fingerprint", since, |item| {
            &item.fingerprint == fingerprint
        })
    }

    fn find_recent(&self, since: DateTime<Utc>) -> Result<Vec<IndexedItem>> {
        let items = self.items.read().map_err(|_| poisoned("find_recent"))?;
        let mut recent: Vec<IndexedItem> = items
            .iter()
            .filter(|item| item.published_at >= since)
            .cloned()
            .collect();
        recent.sort_by_key(|item| item.published_at);
        Ok(recent)
    }

    fn persist(&self, item: &IndexedItem) -> Result<()> {
        let mut items = self.items.write().map_err(|_| poisoned("persist"))?;
        items.push(item.without_embedding());
        Ok(())
    }
}
