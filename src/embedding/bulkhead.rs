//! Concurrency guard for embedding providers.
//!
//! Embedding is CPU and memory heavy. The engine's prefetch workers may all
//! call the provider at once, so the provider is wrapped in a semaphore that
//! caps in-flight calls. A caller that cannot get a permit in time sees
//! [`Error::EmbeddingUnavailable`], which the engine turns into a skipped
//! semantic stage rather than a stalled batch.
//!
//! # Usage
//!
//! ```rust,ignore
//! use newsdedup::embedding::{BulkheadEmbedder, EmbeddingBulkheadConfig, FastEmbedEmbedder};
//!
//! let guarded = BulkheadEmbedder::new(FastEmbedEmbedder::new(), EmbeddingBulkheadConfig::default());
//! let embedding = guarded.embed("Hello world")?;
//! ```

use super::Embedder;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Poll interval while waiting for a permit.
const ACQUIRE_POLL: Duration = Duration::from_millis(5);

/// Upper bound on waiting when no timeout is configured.
const MAX_WAIT: Duration = Duration::from_secs(120);

/// Configuration for the embedding concurrency guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingBulkheadConfig {
    /// Maximum concurrent embedding calls.
    pub max_concurrent: usize,

    /// Timeout for acquiring a permit in milliseconds (0 = wait up to two minutes).
    pub acquire_timeout_ms: u64,

    /// Fail immediately instead of waiting when all permits are taken.
    pub fail_fast: bool,
}

impl Default for EmbeddingBulkheadConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingBulkheadConfig {
    /// Creates the default configuration: 4 permits, 30 second wait.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_concurrent: 4,
            acquire_timeout_ms: 30_000,
            fail_fast: false,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `NEWSDEDUP_EMBEDDING_MAX_CONCURRENT` | Max concurrent calls | 4 |
    /// | `NEWSDEDUP_EMBEDDING_ACQUIRE_TIMEOUT_MS` | Permit timeout | 30000 |
    /// | `NEWSDEDUP_EMBEDDING_FAIL_FAST` | Fail when full | false |
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("NEWSDEDUP_EMBEDDING_MAX_CONCURRENT")
            && let Ok(parsed) = v.parse::<usize>()
        {
            self.max_concurrent = parsed.max(1);
        }
        if let Ok(v) = std::env::var("NEWSDEDUP_EMBEDDING_ACQUIRE_TIMEOUT_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.acquire_timeout_ms = parsed;
        }
        if let Ok(v) = std::env::var("NEWSDEDUP_EMBEDDING_FAIL_FAST") {
            self.fail_fast = v.to_lowercase() == "true" || v == "1";
        }
        self
    }

    /// Sets the maximum concurrent calls.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the acquire timeout in milliseconds.
    #[must_use]
    pub const fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Sets whether to fail fast when all permits are taken.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    fn wait_limit(&self) -> Duration {
        if self.acquire_timeout_ms == 0 {
            MAX_WAIT
        } else {
            Duration::from_millis(self.acquire_timeout_ms)
        }
    }
}

/// Embedder wrapper that caps concurrent provider calls.
pub struct BulkheadEmbedder<E: Embedder> {
    inner: E,
    config: EmbeddingBulkheadConfig,
    semaphore: Arc<Semaphore>,
}

impl<E: Embedder> BulkheadEmbedder<E> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: E, config: EmbeddingBulkheadConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            inner,
            config,
            semaphore,
        }
    }

    /// Returns the current number of available permits.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns the wrapped embedder.
    #[must_use]
    pub const fn inner(&self) -> &E {
        &self.inner
    }

    /// Blocks (polling) until a permit is free, the wait limit passes, or,
    /// with `fail_fast`, immediately if none is free.
    ///
    /// Synchronous by design of the [`Embedder`] trait; the tokio semaphore is
    /// only used through its non-async `try_acquire_owned`.
    fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        metrics::gauge!("embedding_bulkhead_available_permits")
            .set(self.semaphore.available_permits() as f64);

        let limit = self.config.wait_limit();
        let start = Instant::now();
        loop {
            if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
                metrics::counter!("embedding_bulkhead_permits_acquired_total").increment(1);
                return Ok(permit);
            }

            let reason = if self.config.fail_fast {
                Some("full")
            } else if start.elapsed() >= limit {
                Some("timeout")
            } else {
                None
            };

            if let Some(reason) = reason {
                metrics::counter!("embedding_bulkhead_rejections_total", "reason" => reason)
                    .increment(1);
                return Err(Error::EmbeddingUnavailable(if reason == "full" {
                    format!(
                        "embedding bulkhead full ({} concurrent calls)",
                        self.config.max_concurrent
                    )
                } else {
                    format!(
                        "embedding bulkhead acquire timed out after {}ms",
                        limit.as_millis()
                    )
                }));
            }

            std::thread::sleep(ACQUIRE_POLL);
        }
    }

    fn execute<T>(&self, operation: &'static str, call: impl FnOnce() -> Result<T>) -> Result<T> {
        let _permit = self.acquire_permit()?;
        tracing::trace!(operation, "Acquired embedding permit");
        let result = call();
        tracing::trace!(operation, success = result.is_ok(), "Released embedding permit");
        result
    }
}

impl<E: Embedder> Embedder for BulkheadEmbedder<E> {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.execute("embed", || self.inner.embed(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.execute("embed_batch", || self.inner.embed_batch(texts))
    }
}
