//! Persistent item stores.
//!
//! The store is the system of record beyond the recent-item index's
//! in-memory horizon. The engine consults it for URL and fingerprint lookups,
//! loads recent items from it on cold start, and persists every accepted item.
//!
//! | Store | Backing | Use |
//! |-------|---------|-----|
//! | [`InMemoryStore`] | `RwLock<Vec<_>>` | Tests, one-shot runs |
//! | [`JsonlStore`] | JSON-lines file | CLI, small deployments |

// Allow significant_drop_tightening - lock guards are held for a single scan.
#![allow(clippy::significant_drop_tightening)]

mod filesystem;
mod memory;
mod traits;

pub use filesystem::JsonlStore;
pub use memory::InMemoryStore;
pub use traits::ItemStore;
