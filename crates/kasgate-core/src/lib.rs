//! kasgate-core — foundation types for KasGate.
//!
//! # Overview
//!
//! KasGate mediates between client applications and a Kaspa full node
//! reached over a single bidirectional message stream. The core crate
//! defines:
//!
//! - [`frame`] — the dynamic-key wire envelopes and the
//!   request-kind → response-kind naming convention
//! - [`model`] — typed node payloads (blocks, mempool entries, balances)
//! - [`record`] — the canonical [`TransactionRecord`] view types
//! - [`transport`] — [`FrameConnector`] / [`FrameSink`] / [`FrameSource`]
//!   traits and the [`StreamState`] machine driving reconnection
//! - [`NodeError`] — structured stream/call error taxonomy

pub mod error;
pub mod frame;
pub mod model;
pub mod record;
pub mod transport;

pub use error::NodeError;
pub use frame::{response_kind_for, RequestFrame, ResponseFrame};
pub use record::{Direction, NewBlockEvent, ReconciledPage, TransactionRecord};
pub use transport::{FrameConnector, FrameSink, FrameSource, StreamState};
