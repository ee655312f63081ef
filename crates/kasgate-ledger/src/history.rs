//! Historical transaction source backed by the explorer REST API.
//!
//! The explorer resolves input provenance
//! (`resolve_previous_outpoints=full`), which is what lets us classify a
//! transaction as outgoing: raw block data never says which address an
//! input spent from.

use serde::Deserialize;
use tracing::debug;

use kasgate_core::{Direction, TransactionRecord};

use crate::error::LedgerError;

/// Ensure the `kaspa:` prefix is present (API paths require it).
pub fn with_prefix(address: &str) -> String {
    if address.starts_with("kaspa:") {
        address.to_string()
    } else {
        format!("kaspa:{address}")
    }
}

/// Strip the `kaspa:` prefix for comparisons — sources disagree on
/// whether they include it.
pub fn bare(address: &str) -> &str {
    address.strip_prefix("kaspa:").unwrap_or(address)
}

// ─── Explorer payloads (snake_case) ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryTransaction {
    pub transaction_id: String,
    pub block_daa_score: u64,
    pub inputs: Vec<HistoryInput>,
    pub outputs: Vec<HistoryOutput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryInput {
    pub previous_outpoint_resolved: Option<HistoryResolvedOutpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryResolvedOutpoint {
    pub script_public_key_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryOutput {
    pub amount: u64,
    pub script_public_key_address: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    total: u64,
}

/// Derive the canonical records a historical transaction contributes for
/// `address`.
///
/// The address is the sender when any resolved input spent from it. A
/// sent transaction yields one aggregated outgoing record covering the
/// outputs that do not return to the address, keyed under the first such
/// output's index. A received transaction yields one incoming record per
/// output paying the address.
pub fn derive_records(tx: &HistoryTransaction, address: &str) -> Vec<TransactionRecord> {
    let me = bare(address);
    let canonical = with_prefix(address);

    let is_sender = tx.inputs.iter().any(|inp| {
        inp.previous_outpoint_resolved
            .as_ref()
            .map(|r| bare(&r.script_public_key_address) == me)
            .unwrap_or(false)
    });

    let mut records = Vec::new();
    if is_sender {
        let mut amount = 0u64;
        let mut first_external: Option<u32> = None;
        for (index, out) in tx.outputs.iter().enumerate() {
            if bare(&out.script_public_key_address) == me {
                continue;
            }
            amount = amount.saturating_add(out.amount);
            if first_external.is_none() {
                first_external = Some(index as u32);
            }
        }
        if let Some(index) = first_external {
            records.push(TransactionRecord {
                id: TransactionRecord::compose_id(&tx.transaction_id, index, Direction::Outgoing),
                address: canonical,
                amount,
                direction: Direction::Outgoing,
                daa_score: tx.block_daa_score,
                confirmed: true,
            });
        }
    } else {
        for (index, out) in tx.outputs.iter().enumerate() {
            if bare(&out.script_public_key_address) != me {
                continue;
            }
            records.push(TransactionRecord {
                id: TransactionRecord::compose_id(
                    &tx.transaction_id,
                    index as u32,
                    Direction::Incoming,
                ),
                address: canonical.clone(),
                amount: out.amount,
                direction: Direction::Incoming,
                daa_score: tx.block_daa_score,
                confirmed: true,
            });
        }
    }
    records
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// REST client for the explorer's per-address transaction history.
pub struct HistoryClient {
    base_url: String,
    http: reqwest::Client,
}

impl HistoryClient {
    /// `base_url` without a trailing slash, e.g. `https://api.kaspa.org`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One page of confirmed records for `address`, newest first.
    pub async fn confirmed_page(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let addr = with_prefix(address);
        let url = format!(
            "{}/addresses/{}/full-transactions?resolve_previous_outpoints=full&limit={}&offset={}",
            self.base_url, addr, limit, offset
        );

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;

        // 404 means the explorer has never seen the address
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(address = %addr, "no historical transactions");
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(LedgerError::Http(format!(
                "explorer responded with status {}",
                resp.status().as_u16()
            )));
        }

        let transactions: Vec<HistoryTransaction> = resp
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        debug!(address = %addr, count = transactions.len(), "historical page fetched");
        Ok(transactions
            .iter()
            .flat_map(|tx| derive_records(tx, &addr))
            .collect())
    }

    /// Total confirmed transactions the explorer knows for `address`.
    pub async fn total_count(&self, address: &str) -> Result<u64, LedgerError> {
        let addr = with_prefix(address);
        let url = format!("{}/addresses/{}/transactions-count", self.base_url, addr);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LedgerError::Http(format!(
                "explorer responded with status {}",
                resp.status().as_u16()
            )));
        }

        let count: CountResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        Ok(count.total)
    }
}
