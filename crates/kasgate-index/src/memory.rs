//! In-memory store backend.
//!
//! Keeps all records in RAM. Useful for tests and for running the
//! gateway without a database file.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use kasgate_core::TransactionRecord;

use crate::store::{StoreError, TransactionStore};

/// In-memory transaction store. All data is lost when dropped.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, TransactionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all addresses.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn upsert(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        // First write wins; replays are success by contract
        records.entry(record.id.clone()).or_insert_with(|| record.clone());
        Ok(())
    }

    async fn query_by_address(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let records = self.records.lock().unwrap();
        let mut matched: Vec<TransactionRecord> = records
            .values()
            .filter(|r| r.address == address)
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.daa_score
                .cmp(&a.daa_score)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_by_address(&self, address: &str) -> Result<u64, StoreError> {
        let records = self.records.lock().unwrap();
        Ok(records.values().filter(|r| r.address == address).count() as u64)
    }
}
