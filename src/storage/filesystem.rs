//! JSON-lines store.
//!
//! Accepted items are appended to a single file, one JSON object per line.
//! The whole file is loaded on open and served from memory afterwards.
//!
//! # Robustness
//!
//! - Lines that fail to parse are skipped with a warning, so one torn write
//!   does not make the history unreadable.
//! - Files larger than 256MB are refused on open.

use super::memory::InMemoryStore;
use crate::models::{Fingerprint, IndexedItem};
use crate::storage::ItemStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Maximum size of the backing file (256MB).
const MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Append-only JSON-lines store.
pub struct JsonlStore {
    path: PathBuf,
    items: InMemoryStore,
    writer: Mutex<()>,
}

impl JsonlStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the file
    /// cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_store_dir".to_string(),
                cause: e.to_string(),
            })?;
        }

        let items = if path.exists() {
            Self::load(&path)?
        } else {
            Vec::new()
        };
        tracing::debug!(path = %path.display(), items = items.len(), "Opened JSON-lines store");

        Ok(Self {
            path,
            items: InMemoryStore::with_items(items),
            writer: Mutex::new(()),
        })
    }

    fn load(path: &Path) -> Result<Vec<IndexedItem>> {
        let read_failed = |e: std::io::Error| Error::OperationFailed {
            operation: "read_store_file".to_string(),
            cause: e.to_string(),
        };

        let metadata = fs::metadata(path).map_err(read_failed)?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(Error::InvalidInput(format!(
                "store file exceeds maximum size of {MAX_FILE_SIZE} bytes: {}",
                path.display()
            )));
        }

        let reader = BufReader::new(File::open(path).map_err(read_failed)?);
        let mut items = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(read_failed)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<IndexedItem>(&line) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(line = number + 1, error = %e, "Skipping unreadable store line");
                },
            }
        }
        Ok(items)
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn append(&self, item: &IndexedItem) -> Result<()> {
        let unavailable = |cause: String| Error::StoreUnavailable {
            operation: "persist".to_string(),
            cause,
        };

        let mut line = serde_json::to_string(item).map_err(|e| unavailable(e.to_string()))?;
        line.push('\n');

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| unavailable(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| unavailable(e.to_string()))
    }
}

impl ItemStore for JsonlStore {
    fn find_by_url(&self, url_key: &str, since: DateTime<Utc>) -> Result<Option<IndexedItem>> {
        self.items.find_by_url(url_key, since)
    }

    fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        since: DateTime<Utc>,
    ) -> Result<Option<IndexedItem>> {
        self.items.find_by_fingerprint(fingerprint, since)
    }

    fn find_recent(&self, since: DateTime<Utc>) -> Result<Vec<IndexedItem>> {
        self.items.find_recent(since)
    }

    fn persist(&self, item: &IndexedItem) -> Result<()> {
        self.append(item)?;
        self.items.persist(item)
    }
}
