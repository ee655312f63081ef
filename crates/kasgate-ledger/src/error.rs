//! Error types for the ledger layer.

use thiserror::Error;

use kasgate_core::NodeError;
use kasgate_index::StoreError;

/// Errors from reconciling or fetching transaction data.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Every confirmed-transaction source failed; no page can be served.
    #[error("no confirmed-transaction source is reachable")]
    UpstreamUnavailable,

    /// HTTP-level failure talking to an external API.
    #[error("http error: {0}")]
    Http(String),

    /// Unexpected payload shape from an external API.
    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
