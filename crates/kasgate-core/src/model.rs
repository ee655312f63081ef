//! Typed node payloads.
//!
//! Field names follow the protowire JSON gateway (camelCase). All 64-bit
//! numeric fields accept either a JSON number or a decimal string — the
//! gateway serializes protobuf longs as strings.

use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a `u64` from either a number or a decimal string.
pub fn u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

// ─── Blocks ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcBlock {
    pub header: RpcBlockHeader,
    pub transactions: Vec<RpcTransaction>,
    pub verbose_data: RpcBlockVerboseData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcBlockHeader {
    #[serde(deserialize_with = "u64_lenient")]
    pub daa_score: u64,
    #[serde(deserialize_with = "u64_lenient")]
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcBlockVerboseData {
    pub hash: String,
}

// ─── Transactions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcTransaction {
    pub inputs: Vec<RpcTransactionInput>,
    pub outputs: Vec<RpcTransactionOutput>,
    pub verbose_data: RpcTransactionVerboseData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcTransactionVerboseData {
    pub transaction_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcTransactionInput {
    pub previous_outpoint: RpcOutpoint,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcTransactionOutput {
    #[serde(deserialize_with = "u64_lenient")]
    pub amount: u64,
    pub verbose_data: RpcOutputVerboseData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcOutputVerboseData {
    pub script_public_key_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcOutpoint {
    pub transaction_id: String,
    pub index: u32,
}

// ─── Mempool ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcMempoolEntriesByAddresses {
    pub entries: Vec<RpcMempoolEntryByAddress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcMempoolEntryByAddress {
    pub address: String,
    pub sending: Vec<RpcMempoolEntry>,
    pub receiving: Vec<RpcMempoolEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcMempoolEntry {
    pub transaction: RpcTransaction,
    #[serde(deserialize_with = "u64_lenient")]
    pub fee: u64,
    pub is_orphan: bool,
}

// ─── UTXOs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcUtxosByAddresses {
    pub entries: Vec<RpcUtxoEntryPair>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcUtxoEntryPair {
    pub address: String,
    pub outpoint: RpcOutpoint,
    pub utxo_entry: RpcUtxoEntry,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcUtxoEntry {
    #[serde(deserialize_with = "u64_lenient")]
    pub amount: u64,
    #[serde(deserialize_with = "u64_lenient")]
    pub block_daa_score: u64,
}

// ─── Simple query responses ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcBalance {
    #[serde(deserialize_with = "u64_lenient")]
    pub balance: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcBlockDagInfo {
    pub network_name: String,
    #[serde(deserialize_with = "u64_lenient")]
    pub block_count: u64,
    #[serde(deserialize_with = "u64_lenient")]
    pub header_count: u64,
    #[serde(deserialize_with = "u64_lenient")]
    pub virtual_daa_score: u64,
    pub tip_hashes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcHashrateEstimate {
    #[serde(deserialize_with = "u64_lenient")]
    pub network_hashes_per_second: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcCoinSupply {
    #[serde(deserialize_with = "u64_lenient")]
    pub circulating_sompi: u64,
    #[serde(deserialize_with = "u64_lenient")]
    pub max_sompi: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcConnectedPeerInfo {
    pub infos: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcGetBlockResponse {
    pub block: Option<RpcBlock>,
}

/// Aggregate of the node-level health queries (one shot for dashboards).
#[derive(Debug, Clone, Serialize)]
pub struct NetworkStats {
    pub daa_score: u64,
    pub hashrate: u64,
    pub circulating_sompi: u64,
    pub peer_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_parses_string_longs() {
        let block: RpcBlock = serde_json::from_value(json!({
            "header": { "daaScore": "123456789012345", "timestamp": 1700000000000u64 },
            "transactions": [{
                "inputs": [],
                "outputs": [{
                    "amount": "500000000",
                    "verboseData": { "scriptPublicKeyAddress": "kaspa:qqtest" }
                }],
                "verboseData": { "transactionId": "abc" }
            }],
            "verboseData": { "hash": "deadbeef" }
        }))
        .unwrap();
        assert_eq!(block.header.daa_score, 123_456_789_012_345);
        assert_eq!(block.transactions[0].outputs[0].amount, 500_000_000);
        assert_eq!(block.verbose_data.hash, "deadbeef");
    }

    #[test]
    fn missing_fields_default() {
        let entry: RpcMempoolEntryByAddress =
            serde_json::from_value(json!({ "address": "kaspa:qqx" })).unwrap();
        assert!(entry.sending.is_empty());
        assert!(entry.receiving.is_empty());
    }

    #[test]
    fn balance_accepts_number_or_string() {
        let a: RpcBalance = serde_json::from_value(json!({ "balance": 7 })).unwrap();
        let b: RpcBalance = serde_json::from_value(json!({ "balance": "7" })).unwrap();
        assert_eq!(a.balance, b.balance);
    }
}
