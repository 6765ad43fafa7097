//! Content fingerprinting.
//!
//! Title and body are normalized before hashing so that casing and whitespace
//! differences between feeds do not produce distinct fingerprints.

use crate::models::Fingerprint;
use sha2::{Digest, Sha256};

/// Content hasher for the hash stage.
///
/// # Normalization
///
/// Before hashing, title and body are each:
/// - Trimmed of leading/trailing whitespace
/// - Converted to lowercase
/// - Collapsed so runs of whitespace become single spaces
///
/// The normalized title and body are joined with a newline so that moving
/// words across the boundary changes the fingerprint.
///
/// # Example
///
/// ```rust
/// use newsdedup::services::deduplication::ContentHasher;
///
/// let a = ContentHasher::fingerprint("GPT-5 Released", "OpenAI ships  a new model.");
/// let b = ContentHasher::fingerprint("  gpt-5 released ", "openai ships a new\nmodel.");
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 64);
/// ```
pub struct ContentHasher;

impl ContentHasher {
    /// Computes the lowercase hex SHA-256 of normalized content.
    #[must_use]
    pub fn hash(content: &str) -> String {
        let normalized = Self::normalize(content);
        Self::digest(&normalized)
    }

    /// Computes the fingerprint of an item's title and body.
    #[must_use]
    pub fn fingerprint(title: &str, body: &str) -> Fingerprint {
        let joined = format!("{}\n{}", Self::normalize(title), Self::normalize(body));
        Fingerprint::new(Self::digest(&joined))
    }

    /// Returns true when title and body normalize to nothing.
    ///
    /// Such items would all share one fingerprint, so the engine treats them
    /// as malformed instead of hashing them.
    #[must_use]
    pub fn is_blank(title: &str, body: &str) -> bool {
        title.trim().is_empty() && body.trim().is_empty()
    }

    /// Normalizes content for consistent hashing.
    ///
    /// # Example
    ///
    /// ```rust
    /// use newsdedup::services::deduplication::ContentHasher;
    ///
    /// assert_eq!(ContentHasher::normalize("  Hello   WORLD  "), "hello world");
    /// ```
    #[must_use]
    pub fn normalize(content: &str) -> String {
        content
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn digest(normalized: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }
}
