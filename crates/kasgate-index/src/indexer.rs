//! The live block indexer.
//!
//! Consumes `blockAddedNotification` bodies from the node stream and
//! persists one confirmed [`TransactionRecord`] per address-bearing
//! output. Writes are idempotent, so replayed blocks after a
//! reconnection are absorbed by the store.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use kasgate_core::model::RpcBlock;
use kasgate_core::{Direction, TransactionRecord};

use crate::store::TransactionStore;

/// Indexes blocks pushed by the node into a [`TransactionStore`].
pub struct BlockIndexer {
    store: Arc<dyn TransactionStore>,
}

impl BlockIndexer {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    /// Spawn the indexing task. Runs until the notification channel
    /// closes (client shutdown).
    pub fn spawn(store: Arc<dyn TransactionStore>, notifications: UnboundedReceiver<Value>) {
        let indexer = Self::new(store);
        tokio::spawn(async move {
            indexer.run(notifications).await;
        });
    }

    /// Drain the notification channel, indexing each block as it arrives.
    pub async fn run(&self, mut notifications: UnboundedReceiver<Value>) {
        info!("block indexer started");
        while let Some(body) = notifications.recv().await {
            match serde_json::from_value::<RpcBlock>(body["block"].clone()) {
                Ok(block) => {
                    if let Err(e) = self.index_block(&block).await {
                        warn!(error = %e, "failed to index block");
                    }
                }
                Err(e) => warn!(error = %e, "malformed block notification"),
            }
        }
        info!("block indexer stopped");
    }

    /// Persist every address-bearing output of `block` as an incoming
    /// record. Outputs without a resolved address are skipped.
    pub async fn index_block(&self, block: &RpcBlock) -> Result<usize, crate::store::StoreError> {
        let daa_score = block.header.daa_score;
        let mut written = 0usize;

        for tx in &block.transactions {
            let tx_id = &tx.verbose_data.transaction_id;
            if tx_id.is_empty() {
                continue;
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                let address = &output.verbose_data.script_public_key_address;
                if address.is_empty() {
                    continue;
                }
                let record = TransactionRecord {
                    id: TransactionRecord::compose_id(tx_id, index as u32, Direction::Incoming),
                    address: address.clone(),
                    amount: output.amount,
                    direction: Direction::Incoming,
                    daa_score,
                    confirmed: true,
                };
                self.store.upsert(&record).await?;
                written += 1;
            }
        }

        debug!(
            hash = %block.verbose_data.hash,
            daa = daa_score,
            records = written,
            "block indexed"
        );
        Ok(written)
    }
}
