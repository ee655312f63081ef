//! Typed convenience calls over the raw stream client.
//!
//! Each method builds the request body, issues the call, and
//! deserializes the response payload into the matching model type.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use kasgate_core::model::{
    NetworkStats, RpcBalance, RpcBlockDagInfo, RpcCoinSupply, RpcConnectedPeerInfo,
    RpcGetBlockResponse, RpcHashrateEstimate, RpcMempoolEntriesByAddresses,
    RpcUtxosByAddresses,
};
use kasgate_core::NodeError;

use crate::client::NodeClient;

impl NodeClient {
    async fn call_typed<T: DeserializeOwned>(
        &self,
        request_kind: &str,
        body: Value,
    ) -> Result<T, NodeError> {
        let payload = self.call(request_kind, body).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Live balance of one address, in sompi.
    pub async fn get_balance_by_address(&self, address: &str) -> Result<u64, NodeError> {
        let resp: RpcBalance = self
            .call_typed(
                "getBalanceByAddressRequest",
                json!({ "address": address }),
            )
            .await?;
        Ok(resp.balance)
    }

    /// Unconfirmed mempool entries touching any of `addresses`.
    pub async fn get_mempool_entries_by_addresses(
        &self,
        addresses: &[&str],
    ) -> Result<RpcMempoolEntriesByAddresses, NodeError> {
        self.call_typed(
            "getMempoolEntriesByAddressesRequest",
            json!({
                "addresses": addresses,
                "includeOrphanPool": true,
                "filterTransactionPool": true,
            }),
        )
        .await
    }

    /// DAG tip info — the node's sync position.
    pub async fn get_block_dag_info(&self) -> Result<RpcBlockDagInfo, NodeError> {
        self.call_typed("getBlockDagInfoRequest", json!({})).await
    }

    /// One block by hash, optionally with full transactions.
    pub async fn get_block(
        &self,
        hash: &str,
        include_transactions: bool,
    ) -> Result<RpcGetBlockResponse, NodeError> {
        self.call_typed(
            "getBlockRequest",
            json!({ "hash": hash, "includeTransactions": include_transactions }),
        )
        .await
    }

    /// Network hashrate estimated over `window_size` blocks.
    pub async fn estimate_network_hashes_per_second(
        &self,
        window_size: u32,
    ) -> Result<u64, NodeError> {
        let resp: RpcHashrateEstimate = self
            .call_typed(
                "estimateNetworkHashesPerSecondRequest",
                json!({ "windowSize": window_size }),
            )
            .await?;
        Ok(resp.network_hashes_per_second)
    }

    pub async fn get_coin_supply(&self) -> Result<RpcCoinSupply, NodeError> {
        self.call_typed("getCoinSupplyRequest", json!({})).await
    }

    pub async fn get_connected_peer_info(&self) -> Result<RpcConnectedPeerInfo, NodeError> {
        self.call_typed("getConnectedPeerInfoRequest", json!({})).await
    }

    /// UTXO set of `addresses` — the fallback view when an address has no
    /// locally indexed history.
    pub async fn get_utxos_by_addresses(
        &self,
        addresses: &[&str],
    ) -> Result<RpcUtxosByAddresses, NodeError> {
        self.call_typed(
            "getUtxosByAddressesRequest",
            json!({ "addresses": addresses }),
        )
        .await
    }

    /// Standing subscription: push a `blockAddedNotification` for every
    /// new block. Re-issued automatically after reconnects.
    pub fn notify_block_added(&self) -> Result<(), NodeError> {
        self.register("notifyBlockAddedRequest", json!({}))
    }

    /// One-shot aggregate of the dashboard-level network queries.
    pub async fn network_stats(&self) -> Result<NetworkStats, NodeError> {
        let (dag, hashrate, supply, peers) = tokio::try_join!(
            self.get_block_dag_info(),
            self.estimate_network_hashes_per_second(1000),
            self.get_coin_supply(),
            self.get_connected_peer_info(),
        )?;
        Ok(NetworkStats {
            daa_score: dag.virtual_daa_score,
            hashrate,
            circulating_sompi: supply.circulating_sompi,
            peer_count: peers.infos.len(),
        })
    }
}
