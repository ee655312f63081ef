//! The durable confirmed-transaction store interface.

use async_trait::async_trait;
use thiserror::Error;

use kasgate_core::TransactionRecord;

/// Errors from a transaction store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

/// Store of confirmed [`TransactionRecord`]s, queried per address.
///
/// `upsert` must be idempotent: reconnection can replay delivery of an
/// already-seen block, so a write for an existing id is success, not an
/// error.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist one record. Duplicate ids are absorbed silently.
    async fn upsert(&self, record: &TransactionRecord) -> Result<(), StoreError>;

    /// Records for `address`, ordered daa_score descending then id
    /// ascending, paginated by `limit`/`offset`.
    async fn query_by_address(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Total records stored for `address`.
    async fn count_by_address(&self, address: &str) -> Result<u64, StoreError>;
}
