//! kasgate-node — stream client for the Kaspa full node.
//!
//! Turns the node's single shared, unordered message stream into a safe
//! concurrent call interface:
//!
//! - [`NodeClient`] — request/response calls with correlation, timeout,
//!   and reconnection; typed convenience methods in [`api`]
//! - [`PendingCalls`] — the outstanding-call table (FIFO per response
//!   kind)
//! - [`NotificationRouter`] — fan-out of unsolicited push frames
//! - [`WsConnector`] — the WebSocket carrier
//! - [`BlockFeed`] — broadcast of `new_block` events to live listeners

pub mod api;
pub mod client;
pub mod correlator;
pub mod feed;
pub mod router;
pub mod ws;

pub use client::{NodeClient, NodeClientConfig};
pub use correlator::PendingCalls;
pub use feed::BlockFeed;
pub use router::{HandlerId, NotificationRouter};
pub use ws::WsConnector;
