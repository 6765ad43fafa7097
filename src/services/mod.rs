//! Business logic services.
//!
//! Services orchestrate the embedding provider and the item store and provide
//! the high-level deduplication operations.

pub mod deduplication;

pub use deduplication::{DeduplicationConfig, DeduplicationEngine};
