//! kasgate-ledger — the reconciled transaction view.
//!
//! Three sources describe an address's activity with different freshness
//! and trust: the node's mempool (unconfirmed), the locally indexed
//! store (confirmed, as observed live), and the explorer REST API
//! (confirmed, with resolved input provenance). The [`Reconciler`]
//! merges them into one deterministic page.
//!
//! Also home to [`MarketClient`], the market-statistics pass-through.

pub mod error;
pub mod history;
pub mod market;
pub mod reconcile;

pub use error::LedgerError;
pub use history::HistoryClient;
pub use market::{MarketClient, MarketStats};
pub use reconcile::{HistorySource, PendingSource, Reconciler, UtxoSource};
