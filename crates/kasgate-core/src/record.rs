//! Canonical transaction view types shared by the indexer and reconciler.

use serde::{Deserialize, Serialize};

/// Whether an address received or spent funds in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    /// Short tag used in composite record ids (`IN` / `OUT`).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Incoming => "IN",
            Self::Outgoing => "OUT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incoming => write!(f, "incoming"),
            Self::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// One movement of funds affecting an address.
///
/// The id is `"{tx_id}:{output_index}:{IN|OUT}"` — globally unique per
/// (transaction, output-index, direction) triple, so the same fact seen
/// through the mempool, the local index, and the historical source
/// collapses to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub address: String,
    /// Amount in sompi (the native unit); always non-negative.
    pub amount: u64,
    pub direction: Direction,
    /// Chain-position proxy. Unconfirmed records carry 0 and sort before
    /// all confirmed records.
    pub daa_score: u64,
    pub confirmed: bool,
}

impl TransactionRecord {
    /// Build the composite record id.
    pub fn compose_id(tx_id: &str, output_index: u32, direction: Direction) -> String {
        format!("{tx_id}:{output_index}:{}", direction.tag())
    }
}

/// One page of the reconciled transaction view. Derived, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledPage {
    /// Pending first (receipt order), then confirmed newest-first.
    pub records: Vec<TransactionRecord>,
    /// Total confirmed transactions known for the address.
    pub total_count: u64,
}

/// Event published to live listeners when the node adds a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlockEvent {
    /// Always `"new_block"` on the wire.
    pub kind: String,
    pub hash: String,
    pub transaction_count: usize,
    pub daa_score: u64,
}

impl NewBlockEvent {
    pub fn new(hash: impl Into<String>, transaction_count: usize, daa_score: u64) -> Self {
        Self {
            kind: "new_block".into(),
            hash: hash.into(),
            transaction_count,
            daa_score,
        }
    }
}
