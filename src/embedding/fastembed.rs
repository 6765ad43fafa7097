//! FastEmbed-based embedder.
//!
//! With the `fastembed-embeddings` feature this runs all-MiniLM-L6-v2 through
//! ONNX. Without it, a deterministic character-trigram hashing embedder stands
//! in: it has no semantic understanding, but near-identical texts still land
//! close together, which is what duplicate detection needs.

use super::{DEFAULT_DIMENSIONS, Embedder};
use crate::{Error, Result};

// ============================================================================
// Native FastEmbed Implementation (with feature)
// ============================================================================

#[cfg(feature = "fastembed-embeddings")]
mod native {
    use super::{DEFAULT_DIMENSIONS, Embedder, Error, Result};
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::{Mutex, OnceLock, PoisonError};
    use std::time::Instant;

    const MODEL_NAME: &str = "all-MiniLM-L6-v2";

    /// Process-wide model, loaded on first use.
    static EMBEDDING_MODEL: OnceLock<Mutex<fastembed::TextEmbedding>> = OnceLock::new();

    /// `FastEmbed` embedder using all-MiniLM-L6-v2.
    ///
    /// The model is loaded lazily on the first embed call and shared by every
    /// instance for the rest of the process.
    pub struct FastEmbedEmbedder {
        model_name: &'static str,
    }

    impl FastEmbedEmbedder {
        /// Default embedding dimensions for all-MiniLM-L6-v2.
        pub const DEFAULT_DIMENSIONS: usize = DEFAULT_DIMENSIONS;

        /// Creates a new `FastEmbed` embedder. Does not load the model.
        #[must_use]
        pub const fn new() -> Self {
            Self {
                model_name: MODEL_NAME,
            }
        }

        /// Loads the model if needed.
        ///
        /// The first call blocks while the ONNX model loads. Call it at startup
        /// to keep that cost out of the first collection cycle.
        ///
        /// # Errors
        ///
        /// Returns an error if the model cannot be loaded.
        pub fn warm_up(&self) -> Result<()> {
            Self::get_model().map(|_| ())
        }

        fn get_model() -> Result<&'static Mutex<fastembed::TextEmbedding>> {
            if let Some(model) = EMBEDDING_MODEL.get() {
                return Ok(model);
            }

            tracing::info!(model = MODEL_NAME, "Loading embedding model (first use)");
            let start = Instant::now();

            let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(false);
            let model =
                fastembed::TextEmbedding::try_new(options).map_err(|e| Error::OperationFailed {
                    operation: "load_embedding_model".to_string(),
                    cause: e.to_string(),
                })?;

            tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                model = MODEL_NAME,
                "Embedding model loaded"
            );

            // Another thread may have won the race; either model is fine.
            let _ = EMBEDDING_MODEL.set(Mutex::new(model));
            EMBEDDING_MODEL.get().ok_or_else(|| Error::OperationFailed {
                operation: "get_embedding_model".to_string(),
                cause: "model missing after initialization".to_string(),
            })
        }

        fn run(operation: &str, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let model = Self::get_model()?;
            let batch_size = texts.len();

            // ONNX runtime can panic on malformed input; keep that contained.
            let result = catch_unwind(AssertUnwindSafe(|| {
                let mut guard = model.lock().unwrap_or_else(PoisonError::into_inner);
                guard.embed(texts, None)
            }));

            result
                .map_err(|panic_info| {
                    let panic_msg = panic_info
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic_info.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(
                        panic_message = %panic_msg,
                        batch_size,
                        "ONNX runtime panicked during embedding"
                    );
                    Error::EmbeddingUnavailable(format!("ONNX runtime panic: {panic_msg}"))
                })?
                .map_err(|e| Error::OperationFailed {
                    operation: operation.to_string(),
                    cause: e.to_string(),
                })
        }
    }

    impl Default for FastEmbedEmbedder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn dimensions(&self) -> usize {
            Self::DEFAULT_DIMENSIONS
        }

        fn model_name(&self) -> &str {
            self.model_name
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.trim().is_empty() {
                return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
            }
            Self::run("embed", vec![text.to_string()])?
                .into_iter()
                .next()
                .ok_or_else(|| Error::OperationFailed {
                    operation: "embed".to_string(),
                    cause: "No embedding returned from model".to_string(),
                })
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            if texts.iter().any(|t| t.trim().is_empty()) {
                return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
            }
            Self::run(
                "embed_batch",
                texts.iter().map(|s| (*s).to_string()).collect(),
            )
        }
    }
}

// ============================================================================
// Fallback Implementation (without feature)
// ============================================================================

#[cfg(not(feature = "fastembed-embeddings"))]
mod fallback {
    use super::{DEFAULT_DIMENSIONS, Embedder, Error, Result};
    use sha2::{Digest, Sha256};

    /// Bounds work on very long texts.
    const MAX_CHARS: usize = 8_192;

    /// Deterministic trigram-hashing embedder.
    ///
    /// Each lowercase character trigram is hashed with SHA-256 (stable across
    /// platforms and releases, unlike `DefaultHasher`) into a signed bucket; the vector is then
    /// L2-normalized. Texts that share most of their trigrams have high cosine
    /// similarity. Enable `fastembed-embeddings` for real semantic vectors.
    pub struct FastEmbedEmbedder {
        dimensions: usize,
    }

    impl FastEmbedEmbedder {
        /// Default embedding dimensions for all-MiniLM-L6-v2.
        pub const DEFAULT_DIMENSIONS: usize = DEFAULT_DIMENSIONS;

        /// Creates a new embedder with the model's dimensionality.
        #[must_use]
        pub const fn new() -> Self {
            Self {
                dimensions: Self::DEFAULT_DIMENSIONS,
            }
        }

        /// Creates a new embedder with custom dimensions (minimum 1).
        #[must_use]
        pub const fn with_dimensions(dimensions: usize) -> Self {
            Self {
                dimensions: if dimensions == 0 { 1 } else { dimensions },
            }
        }

        /// Nothing to load.
        ///
        /// # Errors
        ///
        /// Never fails.
        pub const fn warm_up(&self) -> Result<()> {
            Ok(())
        }

        fn gram_hash(chars: &[char]) -> u64 {
            let gram: String = chars.iter().collect();
            let digest = Sha256::digest(gram.as_bytes());
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&digest[..8]);
            u64::from_be_bytes(prefix)
        }

        fn pseudo_embed(&self, text: &str) -> Vec<f32> {
            let chars: Vec<char> = text
                .chars()
                .take(MAX_CHARS)
                .flat_map(char::to_lowercase)
                .collect();
            let mut embedding = vec![0.0f32; self.dimensions];

            let windows: Vec<&[char]> = if chars.len() < 3 {
                vec![chars.as_slice()]
            } else {
                chars.windows(3).collect()
            };
            for gram in windows {
                let hash = Self::gram_hash(gram);
                let idx = (hash % self.dimensions as u64) as usize;
                let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
                embedding[idx] += sign;
            }

            normalize(&mut embedding);
            embedding
        }
    }

    fn normalize(embedding: &mut [f32]) {
        let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
        if norm_sq <= 0.0 {
            return;
        }
        let inv_norm = norm_sq.sqrt().recip();
        for v in embedding.iter_mut() {
            *v *= inv_norm;
        }
    }

    impl Default for FastEmbedEmbedder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn model_name(&self) -> &str {
            // Distinct from the real model so on-disk caches never mix them.
            "trigram-sha256-v1"
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.trim().is_empty() {
                return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
            }
            tracing::trace!("Using trigram embedding (fastembed-embeddings feature not enabled)");
            Ok(self.pseudo_embed(text))
        }
    }
}

// ============================================================================
// Public Re-exports
// ============================================================================

#[cfg(feature = "fastembed-embeddings")]
pub use native::FastEmbedEmbedder;

#[cfg(not(feature = "fastembed-embeddings"))]
pub use fallback::FastEmbedEmbedder;

// ============================================================================
// Utility Functions
// ============================================================================

/// Computes cosine similarity between two embedding vectors.
///
/// # Returns
///
/// Cosine similarity in range [-1.0, 1.0], or 0.0 if vectors are invalid.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_dimensions() {
        let embedder = FastEmbedEmbedder::new();
        assert_eq!(embedder.dimensions(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_embed_empty_text_rejected() {
        let embedder = FastEmbedEmbedder::new();
        assert!(matches!(embedder.embed(""), Err(Error::InvalidInput(_))));
        assert!(embedder.embed("   ").is_err());
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_invalid_inputs() {
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[], &[]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[cfg(not(feature = "fastembed-embeddings"))]
    mod fallback_tests {
        use super::*;

        #[test]
        fn test_embed_deterministic_and_normalized() {
            let embedder = FastEmbedEmbedder::new();
            let a = embedder.embed("OpenAI releases a new reasoning model").unwrap();
            let b = embedder.embed("OpenAI releases a new reasoning model").unwrap();
            assert_eq!(a, b);

            let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }

        #[test]
        fn test_near_duplicates_score_higher_than_unrelated() {
            let embedder = FastEmbedEmbedder::new();
            let base = embedder
                .embed("Google DeepMind unveils Gemini 3 with improved reasoning")
                .unwrap();
            let near = embedder
                .embed("Google DeepMind unveils Gemini 3, with improved reasoning!")
                .unwrap();
            let far = embedder
                .embed("Stock markets close lower amid rate worries")
                .unwrap();

            assert!(cosine_similarity(&base, &near) > 0.8);
            assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
        }

        #[test]
        fn test_case_insensitive() {
            let embedder = FastEmbedEmbedder::new();
            assert_eq!(
                embedder.embed("Large Language Model").unwrap(),
                embedder.embed("large language model").unwrap()
            );
        }

        #[test]
        fn test_custom_dimensions() {
            let embedder = FastEmbedEmbedder::with_dimensions(16);
            assert_eq!(embedder.embed("short").unwrap().len(), 16);
            assert_eq!(FastEmbedEmbedder::with_dimensions(0).dimensions(), 1);
        }

        #[test]
        fn test_short_text() {
            let embedder = FastEmbedEmbedder::new();
            let v = embedder.embed("a").unwrap();
            assert_eq!(v.len(), DEFAULT_DIMENSIONS);
            assert!(v.iter().any(|x| *x != 0.0));
        }

        #[test]
        fn test_embed_batch_matches_single() {
            let embedder = FastEmbedEmbedder::new();
            let batch = embedder.embed_batch(&["one", "two"]).unwrap();
            assert_eq!(batch[0], embedder.embed("one").unwrap());
            assert_eq!(batch[1], embedder.embed("two").unwrap());
        }

        #[test]
        fn test_trigram_bucket_is_stable() {
            // SHA-256("abc") begins 0xba7816bf8f01cfea: high bit set, bucket 8 of 97.
            let v = FastEmbedEmbedder::with_dimensions(97).embed("abc").unwrap();
            assert!((v[8] + 1.0).abs() < 1e-6);
            assert_eq!(v.iter().filter(|x| x.abs() > f32::EPSILON).count(), 1);
        }

        #[test]
        fn test_model_name_distinct_from_real_model() {
            assert_ne!(FastEmbedEmbedder::new().model_name(), "all-MiniLM-L6-v2");
        }
    }
}
