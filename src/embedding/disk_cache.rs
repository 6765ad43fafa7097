//! On-disk embedding cache.
//!
//! Vectors survive process restarts so a fresh run does not re-embed every
//! recent item during warm-up. Files are sharded by the first two hex digits
//! of the key:
//!
//! ```text
//! <dir>/ab/ab3f...e1.json   {"model":"...","vector":[...]}
//! ```

use super::Embedder;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Maximum size of one cache file (1MB).
const MAX_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct StoredEmbedding {
    model: String,
    vector: Vec<f32>,
}

/// Embedder wrapper that persists vectors under a cache directory.
pub struct DiskCachedEmbedder<E: Embedder> {
    inner: E,
    dir: PathBuf,
}

impl<E: Embedder> DiskCachedEmbedder<E> {
    /// Wraps `inner`, storing vectors under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(inner: E, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::OperationFailed {
            operation: "create_embedding_cache_dir".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self { inner, dir })
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the wrapped embedder.
    #[must_use]
    pub const fn inner(&self) -> &E {
        &self.inner
    }

    /// Cache key for `text` under the wrapped model.
    #[must_use]
    pub fn key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.inner.model_name().as_bytes());
        hasher.update(b":");
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(&key[..2]).join(format!("{key}.json"))
    }

    /// Reads a cached vector. Unreadable or stale files are removed.
    fn load(&self, path: &Path) -> Option<Vec<f32>> {
        let metadata = fs::metadata(path).ok()?;
        if metadata.len() > MAX_FILE_SIZE {
            remove_quietly(path);
            return None;
        }

        let parsed = fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<StoredEmbedding>(&bytes).ok());

        match parsed {
            Some(stored) if stored.vector.len() == self.inner.dimensions() => Some(stored.vector),
            _ => {
                tracing::debug!(path = %path.display(), "Discarding unusable cached embedding");
                remove_quietly(path);
                None
            },
        }
    }

    fn store(&self, path: &Path, vector: &[f32]) {
        let stored = StoredEmbedding {
            model: self.inner.model_name().to_string(),
            vector: vector.to_vec(),
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_vec(&stored)?;
            fs::write(path, json)
        };
        if let Err(e) = write() {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write cached embedding");
        }
    }

    /// Removes every cached vector. Returns the number of files deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be read.
    pub fn clear(&self) -> Result<usize> {
        self.remove_where(|_| true)
    }

    /// Removes vectors whose files were last written more than `max_age` ago.
    /// Returns the number of files deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be read.
    pub fn cleanup_older_than(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        self.remove_where(|metadata| {
            metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > max_age)
        })
    }

    fn remove_where(&self, predicate: impl Fn(&fs::Metadata) -> bool) -> Result<usize> {
        let read_dir = |dir: &Path| {
            fs::read_dir(dir).map_err(|e| Error::OperationFailed {
                operation: "read_embedding_cache_dir".to_string(),
                cause: e.to_string(),
            })
        };

        let mut removed = 0;
        for shard in read_dir(&self.dir)?.flatten() {
            let shard_path = shard.path();
            if !shard_path.is_dir() {
                continue;
            }
            for entry in read_dir(&shard_path)?.flatten() {
                let path = entry.path();
                let is_cache_file = path.extension().is_some_and(|ext| ext == "json");
                if is_cache_file
                    && entry.metadata().is_ok_and(|m| predicate(&m))
                    && fs::remove_file(&path).is_ok()
                {
                    removed += 1;
                }
            }
            // Only succeeds once the shard is empty.
            let _ = fs::remove_dir(&shard_path);
        }

        tracing::info!(removed, dir = %self.dir.display(), "Removed cached embeddings");
        Ok(removed)
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::debug!(path = %path.display(), error = %e, "Failed to remove cache file");
    }
}

impl<E: Embedder> Embedder for DiskCachedEmbedder<E> {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let path = self.path_for(&self.key(text));
        if let Some(vector) = self.load(&path) {
            metrics::counter!("embedding_disk_cache_hits_total").increment(1);
            return Ok(vector);
        }

        metrics::counter!("embedding_disk_cache_misses_total").increment(1);
        let vector = self.inner.embed(text)?;
        self.store(&path, &vector);
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn dimensions(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "counting"
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let len = text.len() as f32;
            Ok(vec![len, 1.0, 0.0])
        }
    }

    fn cached(dir: &TempDir) -> DiskCachedEmbedder<CountingEmbedder> {
        DiskCachedEmbedder::new(CountingEmbedder::default(), dir.path()).unwrap()
    }

    #[test]
    fn test_second_call_served_from_disk() {
        let dir = TempDir::new().unwrap();
        let embedder = cached(&dir);

        let first = embedder.embed("hello").unwrap();
        let second = embedder.embed("hello").unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_survives_new_instance() {
        let dir = TempDir::new().unwrap();
        cached(&dir).embed("persisted").unwrap();

        let fresh = cached(&dir);
        fresh.embed("persisted").unwrap();
        assert_eq!(fresh.inner().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sharded_layout() {
        let dir = TempDir::new().unwrap();
        let embedder = cached(&dir);
        embedder.embed("layout").unwrap();

        let key = embedder.key("layout");
        assert_eq!(key.len(), 64);
        assert!(dir.path().join(&key[..2]).join(format!("{key}.json")).exists());
    }

    #[test]
    fn test_corrupt_file_is_recomputed() {
        let dir = TempDir::new().unwrap();
        let embedder = cached(&dir);
        embedder.embed("corrupt").unwrap();

        let path = embedder.path_for(&embedder.key("corrupt"));
        fs::write(&path, b"not json").unwrap();

        let vector = embedder.embed("corrupt").unwrap();
        assert_eq!(vector.len(), 3);
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wrong_dimensions_are_recomputed() {
        let dir = TempDir::new().unwrap();
        let embedder = cached(&dir);
        let path = embedder.path_for(&embedder.key("short"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"model":"counting","vector":[1.0]}"#).unwrap();

        assert_eq!(embedder.embed("short").unwrap().len(), 3);
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let embedder = cached(&dir);
        embedder.embed("a").unwrap();
        embedder.embed("b").unwrap();

        assert_eq!(embedder.clear().unwrap(), 2);
        embedder.embed("a").unwrap();
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cleanup_keeps_fresh_files() {
        let dir = TempDir::new().unwrap();
        let embedder = cached(&dir);
        embedder.embed("fresh").unwrap();

        assert_eq!(embedder.cleanup_older_than(Duration::from_secs(3600)).unwrap(), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(embedder.cleanup_older_than(Duration::from_millis(1)).unwrap(), 1);
    }

    #[test]
    fn test_key_depends_on_model() {
        let dir = TempDir::new().unwrap();
        let embedder = cached(&dir);
        let other = DiskCachedEmbedder::new(
            crate::embedding::FastEmbedEmbedder::new(),
            dir.path().join("other"),
        )
        .unwrap();
        assert_ne!(embedder.key("same"), other.key("same"));
    }
}
