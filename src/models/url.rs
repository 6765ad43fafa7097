//! URL canonicalisation.
//!
//! Feeds link the same article with different schemes, host casing, trailing
//! slashes and campaign parameters. [`CanonicalUrl`] folds those variants into
//! one normalized URL plus a scheme-insensitive comparison key.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Query parameters that only carry tracking data.
pub const TRACKING_PARAMS: &[&str] = &[
    "_dt", "fbclid", "gclid", "mc_cid", "mc_eid", "modal", "ref", "ref_src",
];

/// Maximum accepted URL length.
const MAX_URL_LENGTH: usize = 2048;

/// Patterns that disqualify a URL outright.
const SUSPICIOUS_PATTERNS: &[&str] = &["javascript:", "vbscript:", "<script", "../", "%00", "%0d%0a"];

/// A normalized article URL.
///
/// # Example
///
/// ```rust
/// use newsdedup::CanonicalUrl;
///
/// let a = CanonicalUrl::parse("https://Example.com/a/?utm_source=x").unwrap();
/// let b = CanonicalUrl::parse("http://example.com/a").unwrap();
/// assert_eq!(a.key(), b.key());
/// assert_eq!(a.as_str(), "https://example.com/a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalUrl {
    normalized: String,
    key: String,
}

impl CanonicalUrl {
    /// Parses and normalizes a raw URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCandidate`] if the URL is empty, too long,
    /// unparseable, not http(s), has no host, or contains a suspicious pattern.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().replace('\0', "");
        if trimmed.is_empty() {
            return Err(malformed("missing url"));
        }
        if trimmed.len() > MAX_URL_LENGTH {
            return Err(malformed("url too long"));
        }

        let lower = trimmed.to_lowercase();
        if let Some(pattern) = SUSPICIOUS_PATTERNS.iter().find(|p| lower.contains(*p)) {
            return Err(malformed(&format!("suspicious pattern '{pattern}' in url")));
        }

        let mut parsed =
            Url::parse(&trimmed).map_err(|e| malformed(&format!("unparseable url: {e}")))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(malformed(&format!("unsupported scheme '{}'", parsed.scheme())));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(malformed("url has no host"));
        }

        parsed.set_fragment(None);
        strip_tracking_params(&mut parsed);

        // `Url` already lowercases scheme/host and drops default ports.
        let mut normalized = parsed.to_string();
        let path_end = normalized.find('?').unwrap_or(normalized.len());
        if normalized[..path_end].ends_with('/') {
            normalized.remove(path_end - 1);
        }

        let key = normalized
            .split_once("://")
            .map_or_else(|| normalized.clone(), |(_, rest)| rest.to_string());

        Ok(Self { normalized, key })
    }

    /// Returns the normalized URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Returns the scheme-insensitive comparison key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the host portion of the URL.
    #[must_use]
    pub fn host(&self) -> &str {
        self.key
            .split(['/', '?'])
            .next()
            .unwrap_or_default()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized)
    }
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

fn strip_tracking_params(parsed: &mut Url) {
    if parsed.query().is_none() {
        return;
    }

    let clean_pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(&key.to_lowercase()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if clean_pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(clean_pairs);
    }
}

fn malformed(reason: &str) -> Error {
    Error::MalformedCandidate {
        reason: reason.to_string(),
    }
}
