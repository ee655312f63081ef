//! Node-stream error types.

use thiserror::Error;

/// Errors that can occur on the node's message stream.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Initial connection to the node failed within the bounded wait.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A send was attempted while the stream was not open.
    #[error("stream not connected")]
    NotConnected,

    /// The stream dropped while the call was in flight.
    #[error("connection lost")]
    ConnectionLost,

    /// No matching response arrived within the configured budget.
    #[error("call timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The node returned a structured error payload.
    #[error("node error: {0}")]
    Remote(String),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Underlying channel send/receive failure.
    #[error("channel error: {0}")]
    Channel(String),
}

impl NodeError {
    /// Returns `true` if this error is transient — the caller may retry
    /// the same request once the stream recovers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect(_)
                | Self::NotConnected
                | Self::ConnectionLost
                | Self::Timeout { .. }
                | Self::Channel(_)
        )
    }

    /// Returns `true` if the node rejected the request itself — retrying
    /// without changing the request will fail again.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}
