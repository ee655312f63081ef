//! The frame-channel abstraction — the seam between the node client and
//! whatever actually carries the stream.
//!
//! The client never opens sockets itself: it is handed a
//! [`FrameConnector`] and asks it for a fresh sink/source pair on every
//! (re)connect attempt. Tests inject channel-backed doubles and drive
//! disconnects synchronously.

use async_trait::async_trait;

use crate::error::NodeError;
use crate::frame::{RequestFrame, ResponseFrame};

/// Lifecycle of the single stream a client owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// A connect attempt is in progress.
    Connecting,
    /// The stream is established; calls may be sent.
    Open,
    /// The stream dropped; a reconnect is pending after backoff.
    Reconnecting,
    /// The client was shut down; no further reconnects.
    Closed,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Outbound half of one established stream. All sends are serialized
/// through the supervisor task, so implementations see one caller.
#[async_trait]
pub trait FrameSink: Send {
    /// Enqueue one request frame for transmission.
    async fn send(&mut self, frame: &RequestFrame) -> Result<(), NodeError>;

    /// Tear down the underlying channel resources.
    async fn close(&mut self);
}

/// Inbound half of one established stream. Frames are delivered in
/// arrival order; `None` means the stream ended.
#[async_trait]
pub trait FrameSource: Send {
    async fn recv(&mut self) -> Option<Result<ResponseFrame, NodeError>>;
}

/// Factory for stream channels. One `connect` call yields one sink/source
/// pair; the supervisor calls it again after every disconnect.
#[async_trait]
pub trait FrameConnector: Send + Sync + 'static {
    /// Establish the stream, failing with [`NodeError::Connect`] if the
    /// remote is unreachable within a bounded wait.
    async fn connect(&self)
        -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), NodeError>;

    /// The endpoint this connector dials (URL or name, for logging).
    fn endpoint(&self) -> &str;
}
