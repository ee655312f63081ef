//! kasgate-index — confirmed-transaction store and block indexer.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//!
//! The [`BlockIndexer`] consumes live block notifications and writes
//! idempotent per-output records, so the reconciled view can serve
//! confirmed history locally instead of asking a remote source.

pub mod indexer;
pub mod store;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use indexer::BlockIndexer;
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
pub use store::{StoreError, TransactionStore};
