//! Live block feed — the outbound push surface.
//!
//! Subscribes to `blockAddedNotification` frames and republishes them as
//! compact [`NewBlockEvent`]s on a broadcast channel. Listeners attach
//! and detach freely; events fired before a listener attached are never
//! redelivered.

use serde_json::Value;
use tokio::sync::broadcast;

use kasgate_core::model::RpcBlock;
use kasgate_core::{NewBlockEvent, NodeError};

use crate::client::NodeClient;

/// Fan-out of new-block events to any number of live listeners.
pub struct BlockFeed {
    tx: broadcast::Sender<NewBlockEvent>,
}

impl BlockFeed {
    /// Register the standing block-added subscription on `client` and
    /// start forwarding. The forwarder task runs until the client's
    /// dispatch loop shuts down.
    pub fn spawn(client: &NodeClient, capacity: usize) -> Result<Self, NodeError> {
        client.notify_block_added()?;
        let (_handler, mut rx) = client.subscribe("blockAddedNotification");
        let (tx, _) = broadcast::channel(capacity);

        let feed_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(body) = rx.recv().await {
                match parse_event(&body) {
                    Some(event) => {
                        tracing::debug!(hash = %event.hash, daa = event.daa_score, "new block");
                        // No listeners is fine; events are fire-and-forget
                        let _ = feed_tx.send(event);
                    }
                    None => tracing::debug!("malformed block notification, skipping"),
                }
            }
        });

        Ok(Self { tx })
    }

    /// Attach a listener. Only events fired after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<NewBlockEvent> {
        self.tx.subscribe()
    }

    /// Currently attached listeners.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

fn parse_event(body: &Value) -> Option<NewBlockEvent> {
    let block: RpcBlock = serde_json::from_value(body.get("block")?.clone()).ok()?;
    if block.verbose_data.hash.is_empty() {
        return None;
    }
    Some(NewBlockEvent::new(
        block.verbose_data.hash,
        block.transactions.len(),
        block.header.daa_score,
    ))
}
