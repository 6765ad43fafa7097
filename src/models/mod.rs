//! Data models for newsdedup.
//!
//! Candidate items arrive from the collectors, accepted items are kept as
//! [`IndexedItem`]s in the recent-item index and the persistent store.

mod item;
mod url;

pub use item::{CandidateItem, Embedding, Fingerprint, IndexedItem};
pub use url::{CanonicalUrl, TRACKING_PARAMS};
