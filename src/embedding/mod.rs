//! Embedding generation.
//!
//! The [`Embedder`] trait is the provider seam the similarity cache calls on a
//! miss. Providers compose by wrapping:
//!
//! ```text
//! BulkheadEmbedder ─▶ DiskCachedEmbedder ─▶ FastEmbedEmbedder
//!  (concurrency)       (on-disk vectors)      (model, loaded once)
//! ```

// Allow cast precision loss for hash-based embedding calculations.
#![allow(clippy::cast_precision_loss)]
// Allow cast possible truncation for hash index calculations on 32-bit platforms.
#![allow(clippy::cast_possible_truncation)]

mod bulkhead;
mod disk_cache;
mod fastembed;

pub use bulkhead::{BulkheadEmbedder, EmbeddingBulkheadConfig};
pub use disk_cache::DiskCachedEmbedder;
pub use fastembed::{FastEmbedEmbedder, cosine_similarity};

use crate::Result;

/// Embedding dimensions of all-MiniLM-L6-v2.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators.
///
/// Implementations must be deterministic for identical input (modulo the
/// floating-point reproducibility of the underlying model) and must always
/// return vectors of [`Embedder::dimensions`] length.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Returns a name identifying the model, used to key on-disk caches.
    fn model_name(&self) -> &str {
        "unknown"
    }

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}
