//! The transaction reconciler.
//!
//! Merges three heterogeneous views of an address — unconfirmed mempool
//! entries, the locally indexed store, and the historical explorer API —
//! into one deterministic paginated page. The three sources describe
//! overlapping facts with different freshness; the merge keys on the
//! composite record id and keeps the most authoritative copy.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use kasgate_core::model::{RpcMempoolEntryByAddress, RpcUtxosByAddresses};
use kasgate_core::{Direction, ReconciledPage, TransactionRecord};
use kasgate_index::TransactionStore;
use kasgate_node::NodeClient;

use crate::error::LedgerError;
use crate::history::{bare, with_prefix, HistoryClient};

// ─── Source seams ────────────────────────────────────────────────────────────

/// Source of unconfirmed records (the node's mempool).
#[async_trait]
pub trait PendingSource: Send + Sync {
    async fn pending_records(&self, address: &str)
        -> Result<Vec<TransactionRecord>, LedgerError>;
}

/// Source of confirmed records when the local store has none.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn confirmed_page(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<TransactionRecord>, LedgerError>;

    async fn total_count(&self, address: &str) -> Result<u64, LedgerError>;
}

/// Last-resort confirmed source: the node's live UTXO set. Coarser than
/// real history (only unspent outputs survive), but available whenever
/// the node itself is.
#[async_trait]
pub trait UtxoSource: Send + Sync {
    async fn utxo_records(&self, address: &str) -> Result<Vec<TransactionRecord>, LedgerError>;
}

/// Derive pending records from one address's mempool entry.
///
/// Sending entries aggregate the outputs that leave the address into one
/// outgoing record under the first such output's index; receiving
/// entries yield one incoming record per output paying the address. Both
/// carry `daa_score == 0` so they sort ahead of every confirmed record.
pub fn pending_from_mempool(
    entry: &RpcMempoolEntryByAddress,
    address: &str,
) -> Vec<TransactionRecord> {
    let me = bare(address);
    let canonical = with_prefix(address);
    let mut records = Vec::new();

    for item in &entry.sending {
        let tx = &item.transaction;
        let tx_id = &tx.verbose_data.transaction_id;
        if tx_id.is_empty() {
            continue;
        }
        let mut amount = 0u64;
        let mut first_external: Option<u32> = None;
        for (index, out) in tx.outputs.iter().enumerate() {
            if bare(&out.verbose_data.script_public_key_address) == me {
                continue;
            }
            amount = amount.saturating_add(out.amount);
            if first_external.is_none() {
                first_external = Some(index as u32);
            }
        }
        if let Some(index) = first_external {
            records.push(TransactionRecord {
                id: TransactionRecord::compose_id(tx_id, index, Direction::Outgoing),
                address: canonical.clone(),
                amount,
                direction: Direction::Outgoing,
                daa_score: 0,
                confirmed: false,
            });
        }
    }

    for item in &entry.receiving {
        let tx = &item.transaction;
        let tx_id = &tx.verbose_data.transaction_id;
        if tx_id.is_empty() {
            continue;
        }
        for (index, out) in tx.outputs.iter().enumerate() {
            if bare(&out.verbose_data.script_public_key_address) != me {
                continue;
            }
            records.push(TransactionRecord {
                id: TransactionRecord::compose_id(tx_id, index as u32, Direction::Incoming),
                address: canonical.clone(),
                amount: out.amount,
                direction: Direction::Incoming,
                daa_score: 0,
                confirmed: false,
            });
        }
    }

    records
}

/// Derive confirmed incoming records from an address's unspent outputs.
///
/// Each UTXO is one output that paid the address and was never spent, so
/// the composite id lines up with the indexer's and the historical
/// source's incoming ids and dedup collapses them.
pub fn records_from_utxos(resp: &RpcUtxosByAddresses, address: &str) -> Vec<TransactionRecord> {
    let me = bare(address);
    let canonical = with_prefix(address);
    resp.entries
        .iter()
        .filter(|e| bare(&e.address) == me && !e.outpoint.transaction_id.is_empty())
        .map(|e| TransactionRecord {
            id: TransactionRecord::compose_id(
                &e.outpoint.transaction_id,
                e.outpoint.index,
                Direction::Incoming,
            ),
            address: canonical.clone(),
            amount: e.utxo_entry.amount,
            direction: Direction::Incoming,
            daa_score: e.utxo_entry.block_daa_score,
            confirmed: true,
        })
        .collect()
}

#[async_trait]
impl PendingSource for NodeClient {
    async fn pending_records(
        &self,
        address: &str,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let addr = with_prefix(address);
        let resp = self.get_mempool_entries_by_addresses(&[&addr]).await?;
        Ok(resp
            .entries
            .iter()
            .find(|e| bare(&e.address) == bare(&addr))
            .map(|e| pending_from_mempool(e, &addr))
            .unwrap_or_default())
    }
}

#[async_trait]
impl UtxoSource for NodeClient {
    async fn utxo_records(&self, address: &str) -> Result<Vec<TransactionRecord>, LedgerError> {
        let addr = with_prefix(address);
        let resp = self.get_utxos_by_addresses(&[&addr]).await?;
        Ok(records_from_utxos(&resp, &addr))
    }
}

#[async_trait]
impl HistorySource for HistoryClient {
    async fn confirmed_page(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        HistoryClient::confirmed_page(self, address, limit, offset).await
    }

    async fn total_count(&self, address: &str) -> Result<u64, LedgerError> {
        HistoryClient::total_count(self, address).await
    }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Merges pending, indexed, and historical records into one page.
pub struct Reconciler {
    pending: Arc<dyn PendingSource>,
    store: Option<Arc<dyn TransactionStore>>,
    history: Arc<dyn HistorySource>,
    utxo: Option<Arc<dyn UtxoSource>>,
}

impl Reconciler {
    pub fn new(
        pending: Arc<dyn PendingSource>,
        store: Option<Arc<dyn TransactionStore>>,
        history: Arc<dyn HistorySource>,
    ) -> Self {
        Self {
            pending,
            store,
            history,
            utxo: None,
        }
    }

    /// Consult the node's UTXO set when both the store and the
    /// historical source come up empty-handed.
    pub fn with_utxo_fallback(mut self, utxo: Arc<dyn UtxoSource>) -> Self {
        self.utxo = Some(utxo);
        self
    }

    /// One reconciled page for `address`.
    ///
    /// Pending records come first in receipt order, then confirmed
    /// records newest-first (ties broken by id). Duplicate ids collapse
    /// with precedence store > history > pending. Zero-amount records
    /// are dropped. Confirmed data cascades store → historical source →
    /// UTXO set (when configured). A mempool failure degrades to a
    /// confirmed-only page; [`LedgerError::UpstreamUnavailable`] is
    /// returned only when every confirmed source actually fails.
    pub async fn page(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> Result<ReconciledPage, LedgerError> {
        let addr = with_prefix(address);

        let pending = match self.pending.pending_records(&addr).await {
            Ok(records) => records,
            Err(e) => {
                warn!(address = %addr, error = %e, "mempool unavailable, serving confirmed only");
                Vec::new()
            }
        };

        let (confirmed, total_count) = self.confirmed(&addr, limit, offset).await?;

        // Confirmed sources win over the mempool view of the same fact
        let mut seen: HashSet<&str> = confirmed.iter().map(|r| r.id.as_str()).collect();
        let mut records: Vec<TransactionRecord> = Vec::with_capacity(pending.len() + confirmed.len());
        for record in &pending {
            if record.amount == 0 || !seen.insert(record.id.as_str()) {
                continue;
            }
            records.push(record.clone());
        }

        let mut sorted = confirmed;
        sorted.sort_by(|a, b| b.daa_score.cmp(&a.daa_score).then_with(|| a.id.cmp(&b.id)));
        records.extend(sorted.into_iter().filter(|r| r.amount != 0));

        debug!(
            address = %addr,
            records = records.len(),
            total = total_count,
            "page reconciled"
        );
        Ok(ReconciledPage {
            records,
            total_count,
        })
    }

    /// Confirmed records for one page, preferring the local store when it
    /// holds rows for the address.
    async fn confirmed(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<TransactionRecord>, u64), LedgerError> {
        let mut store_failed = false;

        if let Some(store) = &self.store {
            match store.count_by_address(address).await {
                Ok(0) => {}
                Ok(count) => match store.query_by_address(address, limit, offset).await {
                    Ok(records) => return Ok((records, count)),
                    Err(e) => {
                        warn!(address = %address, error = %e, "store query failed");
                        store_failed = true;
                    }
                },
                Err(e) => {
                    warn!(address = %address, error = %e, "store count failed");
                    store_failed = true;
                }
            }
        }

        match self.history.confirmed_page(address, limit, offset).await {
            Ok(records) => {
                let total = match self.history.total_count(address).await {
                    Ok(total) => total,
                    Err(e) => {
                        warn!(address = %address, error = %e, "transaction count unavailable");
                        0
                    }
                };
                Ok((records, total))
            }
            Err(e) if store_failed || self.store.is_none() => {
                warn!(address = %address, error = %e, "historical source failed");
                match self.from_utxos(address, limit, offset).await {
                    Some(page) => Ok(page),
                    None => Err(LedgerError::UpstreamUnavailable),
                }
            }
            Err(e) => {
                // Store reachable but empty; an empty confirmed section is
                // an honest answer for a fresh address
                warn!(address = %address, error = %e, "historical source failed, store is empty");
                Ok(self.from_utxos(address, limit, offset).await.unwrap_or((Vec::new(), 0)))
            }
        }
    }

    /// One page derived from the UTXO set, or `None` when the fallback is
    /// not configured or itself fails.
    async fn from_utxos(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> Option<(Vec<TransactionRecord>, u64)> {
        let utxo = self.utxo.as_ref()?;
        match utxo.utxo_records(address).await {
            Ok(mut records) => {
                warn!(address = %address, utxos = records.len(), "serving confirmed view from utxo set");
                let total = records.len() as u64;
                records.sort_by(|a, b| b.daa_score.cmp(&a.daa_score).then_with(|| a.id.cmp(&b.id)));
                let page = records
                    .into_iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .collect();
                Some((page, total))
            }
            Err(e) => {
                warn!(address = %address, error = %e, "utxo fallback failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasgate_index::MemoryStore;
    use serde_json::json;

    struct StubPending(Result<Vec<TransactionRecord>, ()>);

    #[async_trait]
    impl PendingSource for StubPending {
        async fn pending_records(
            &self,
            _address: &str,
        ) -> Result<Vec<TransactionRecord>, LedgerError> {
            self.0
                .clone()
                .map_err(|_| LedgerError::Http("mempool down".into()))
        }
    }

    struct StubHistory(Result<Vec<TransactionRecord>, ()>, u64);

    #[async_trait]
    impl HistorySource for StubHistory {
        async fn confirmed_page(
            &self,
            _address: &str,
            _limit: u64,
            _offset: u64,
        ) -> Result<Vec<TransactionRecord>, LedgerError> {
            self.0
                .clone()
                .map_err(|_| LedgerError::Http("explorer down".into()))
        }

        async fn total_count(&self, _address: &str) -> Result<u64, LedgerError> {
            Ok(self.1)
        }
    }

    fn pending(id: &str, amount: u64) -> TransactionRecord {
        TransactionRecord {
            id: id.into(),
            address: "kaspa:me".into(),
            amount,
            direction: Direction::Incoming,
            daa_score: 0,
            confirmed: false,
        }
    }

    fn confirmed(id: &str, amount: u64, daa: u64) -> TransactionRecord {
        TransactionRecord {
            id: id.into(),
            address: "kaspa:me".into(),
            amount,
            direction: Direction::Incoming,
            daa_score: daa,
            confirmed: true,
        }
    }

    #[tokio::test]
    async fn pending_sorts_before_confirmed() {
        let reconciler = Reconciler::new(
            Arc::new(StubPending(Ok(vec![pending("p1:0:IN", 500_000_000)]))),
            None,
            Arc::new(StubHistory(Ok(vec![confirmed("c1:0:IN", 200_000_000, 42)]), 1)),
        );

        let page = reconciler.page("kaspa:me", 10, 0).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].id, "p1:0:IN");
        assert!(!page.records[0].confirmed);
        assert_eq!(page.records[1].id, "c1:0:IN");
        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn duplicate_id_keeps_confirmed_copy() {
        // Same fact visible in the mempool and the historical source
        let reconciler = Reconciler::new(
            Arc::new(StubPending(Ok(vec![pending("abc:0:IN", 100)]))),
            None,
            Arc::new(StubHistory(Ok(vec![confirmed("abc:0:IN", 100, 42)]), 1)),
        );

        let page = reconciler.page("kaspa:me", 10, 0).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.records[0].confirmed);
        assert_eq!(page.records[0].daa_score, 42);
    }

    #[tokio::test]
    async fn confirmed_ordering_is_deterministic() {
        let history = vec![
            confirmed("bbb:0:IN", 1, 50),
            confirmed("aaa:0:IN", 2, 50),
            confirmed("ccc:0:IN", 3, 99),
        ];
        let reconciler = Reconciler::new(
            Arc::new(StubPending(Ok(vec![]))),
            None,
            Arc::new(StubHistory(Ok(history), 3)),
        );

        let first = reconciler.page("kaspa:me", 10, 0).await.unwrap();
        let second = reconciler.page("kaspa:me", 10, 0).await.unwrap();
        let ids: Vec<&str> = first.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["ccc:0:IN", "aaa:0:IN", "bbb:0:IN"]);
        assert_eq!(first.records, second.records);
    }

    #[tokio::test]
    async fn zero_amount_records_are_dropped() {
        let reconciler = Reconciler::new(
            Arc::new(StubPending(Ok(vec![pending("p1:0:IN", 0)]))),
            None,
            Arc::new(StubHistory(
                Ok(vec![confirmed("c1:0:IN", 0, 10), confirmed("c2:0:IN", 5, 9)]),
                2,
            )),
        );

        let page = reconciler.page("kaspa:me", 10, 0).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "c2:0:IN");
    }

    #[tokio::test]
    async fn mempool_failure_degrades_to_confirmed_only() {
        let reconciler = Reconciler::new(
            Arc::new(StubPending(Err(()))),
            None,
            Arc::new(StubHistory(Ok(vec![confirmed("c1:0:IN", 7, 3)]), 1)),
        );

        let page = reconciler.page("kaspa:me", 10, 0).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.records[0].confirmed);
    }

    #[tokio::test]
    async fn store_with_rows_shadows_history() {
        let store = Arc::new(MemoryStore::new());
        store.upsert(&confirmed("s1:0:IN", 11, 20)).await.unwrap();

        // History is down; the store alone must serve the page
        let reconciler = Reconciler::new(
            Arc::new(StubPending(Ok(vec![]))),
            Some(store),
            Arc::new(StubHistory(Err(()), 0)),
        );

        let page = reconciler.page("kaspa:me", 10, 0).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "s1:0:IN");
        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn empty_store_and_failing_history_yields_empty_confirmed() {
        let reconciler = Reconciler::new(
            Arc::new(StubPending(Ok(vec![pending("p1:0:IN", 3)]))),
            Some(Arc::new(MemoryStore::new())),
            Arc::new(StubHistory(Err(()), 0)),
        );

        let page = reconciler.page("kaspa:me", 10, 0).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "p1:0:IN");
        assert_eq!(page.total_count, 0);
    }

    struct StubUtxos(Result<Vec<TransactionRecord>, ()>);

    #[async_trait]
    impl UtxoSource for StubUtxos {
        async fn utxo_records(
            &self,
            _address: &str,
        ) -> Result<Vec<TransactionRecord>, LedgerError> {
            self.0
                .clone()
                .map_err(|_| LedgerError::Http("node down".into()))
        }
    }

    #[tokio::test]
    async fn utxo_set_serves_when_other_confirmed_sources_fail() {
        let reconciler = Reconciler::new(
            Arc::new(StubPending(Ok(vec![]))),
            None,
            Arc::new(StubHistory(Err(()), 0)),
        )
        .with_utxo_fallback(Arc::new(StubUtxos(Ok(vec![
            confirmed("u1:0:IN", 40, 5),
            confirmed("u2:1:IN", 60, 8),
        ]))));

        let page = reconciler.page("kaspa:me", 10, 0).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].id, "u2:1:IN");
        assert_eq!(page.records[1].id, "u1:0:IN");
        assert_eq!(page.total_count, 2);
    }

    #[tokio::test]
    async fn failing_utxo_fallback_is_still_upstream_unavailable() {
        let reconciler = Reconciler::new(
            Arc::new(StubPending(Ok(vec![]))),
            None,
            Arc::new(StubHistory(Err(()), 0)),
        )
        .with_utxo_fallback(Arc::new(StubUtxos(Err(()))));

        let err = reconciler.page("kaspa:me", 10, 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::UpstreamUnavailable));
    }

    #[test]
    fn utxo_record_derivation() {
        let resp: RpcUtxosByAddresses = serde_json::from_value(json!({
            "entries": [
                {
                    "address": "kaspa:me",
                    "outpoint": { "transactionId": "utx1", "index": 2 },
                    "utxoEntry": { "amount": "700", "blockDaaScore": "31" }
                },
                {
                    "address": "kaspa:other",
                    "outpoint": { "transactionId": "utx2", "index": 0 },
                    "utxoEntry": { "amount": "9", "blockDaaScore": "30" }
                }
            ]
        }))
        .unwrap();

        let records = records_from_utxos(&resp, "kaspa:me");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "utx1:2:IN");
        assert_eq!(records[0].amount, 700);
        assert_eq!(records[0].daa_score, 31);
        assert!(records[0].confirmed);
    }

    #[tokio::test]
    async fn all_confirmed_sources_failing_is_upstream_unavailable() {
        let reconciler = Reconciler::new(
            Arc::new(StubPending(Ok(vec![]))),
            None,
            Arc::new(StubHistory(Err(()), 0)),
        );

        let err = reconciler.page("kaspa:me", 10, 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::UpstreamUnavailable));
    }

    #[test]
    fn mempool_entry_derivation() {
        let entry: RpcMempoolEntryByAddress = serde_json::from_value(json!({
            "address": "kaspa:me",
            "sending": [{
                "transaction": {
                    "verboseData": { "transactionId": "out1" },
                    "outputs": [
                        { "amount": "10", "verboseData": { "scriptPublicKeyAddress": "kaspa:me" } },
                        { "amount": "300", "verboseData": { "scriptPublicKeyAddress": "kaspa:other" } }
                    ]
                },
                "fee": "1000",
                "isOrphan": false
            }],
            "receiving": [{
                "transaction": {
                    "verboseData": { "transactionId": "in1" },
                    "outputs": [
                        { "amount": "500000000", "verboseData": { "scriptPublicKeyAddress": "kaspa:me" } },
                        { "amount": "1", "verboseData": { "scriptPublicKeyAddress": "kaspa:other" } }
                    ]
                },
                "fee": "1000",
                "isOrphan": false
            }]
        }))
        .unwrap();

        let records = pending_from_mempool(&entry, "kaspa:me");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "out1:1:OUT");
        assert_eq!(records[0].amount, 300);
        assert_eq!(records[0].daa_score, 0);
        assert!(!records[0].confirmed);
        assert_eq!(records[1].id, "in1:0:IN");
        assert_eq!(records[1].amount, 500_000_000);
    }
}
