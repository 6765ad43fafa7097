//! Store trait.

use crate::Result;
use crate::models::{Fingerprint, IndexedItem};
use chrono::{DateTime, Utc};

/// Trait for persistent stores of accepted items.
///
/// Lookups only consider items published at or after `since`. Any error is
/// reported as [`crate::Error::StoreUnavailable`] so the engine can degrade to
/// in-memory matching.
pub trait ItemStore: Send + Sync {
    /// Finds an accepted item by its scheme-insensitive URL key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_by_url(&self, url_key: &str, since: DateTime<Utc>) -> Result<Option<IndexedItem>>;

    /// Finds an accepted item by content fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        since: DateTime<Utc>,
    ) -> Result<Option<IndexedItem>>;

    /// Returns every item published at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_recent(&self, since: DateTime<Utc>) -> Result<Vec<IndexedItem>>;

    /// Records an accepted item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be written.
    fn persist(&self, item: &IndexedItem) -> Result<()>;
}
