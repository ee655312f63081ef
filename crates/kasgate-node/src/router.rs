//! Notification fan-out.
//!
//! Distinguishing notifications from responses happens in the dispatch
//! task; this router only owns the subscriber table. Each notification
//! kind is delivered to its subscribers in arrival order. Handlers run on
//! their own tasks — the router hands frames off through unbounded
//! channels so the dispatch task never blocks on a slow consumer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

/// Token identifying one subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Subscriber {
    id: HandlerId,
    tx: mpsc::UnboundedSender<Value>,
}

/// Routes unsolicited push frames to subscribers by notification kind.
#[derive(Clone, Default)]
pub struct NotificationRouter {
    entries: Arc<Mutex<HashMap<String, Vec<Subscriber>>>>,
    next_id: Arc<AtomicU64>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every frame tagged `kind`.
    pub fn subscribe(&self, kind: &str) -> (HandlerId, mpsc::UnboundedReceiver<Value>) {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.entries
            .lock()
            .unwrap()
            .entry(kind.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        (id, rx)
    }

    /// Remove a previously registered handler.
    pub fn unsubscribe(&self, id: HandlerId) {
        let mut entries = self.entries.lock().unwrap();
        for subs in entries.values_mut() {
            subs.retain(|s| s.id != id);
        }
        entries.retain(|_, subs| !subs.is_empty());
    }

    /// Forward a notification body to every subscriber of its kind.
    /// Subscribers whose receivers were dropped are pruned here.
    pub fn dispatch(&self, kind: &str, body: Value) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(subs) = entries.get_mut(kind) {
            subs.retain(|s| s.tx.send(body.clone()).is_ok());
            if subs.is_empty() {
                entries.remove(kind);
            }
        }
    }

    /// Number of live subscriptions across all kinds.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscribe_and_dispatch_in_order() {
        let router = NotificationRouter::new();
        let (_id, mut rx) = router.subscribe("blockAddedNotification");

        router.dispatch("blockAddedNotification", json!({"seq": 1}));
        router.dispatch("blockAddedNotification", json!({"seq": 2}));

        assert_eq!(rx.try_recv().unwrap()["seq"], 1);
        assert_eq!(rx.try_recv().unwrap()["seq"], 2);
    }

    #[test]
    fn kinds_are_isolated() {
        let router = NotificationRouter::new();
        let (_a, mut block_rx) = router.subscribe("blockAddedNotification");
        let (_b, mut daa_rx) = router.subscribe("virtualDaaScoreChangedNotification");

        router.dispatch("virtualDaaScoreChangedNotification", json!({"daa": 9}));

        assert!(block_rx.try_recv().is_err());
        assert_eq!(daa_rx.try_recv().unwrap()["daa"], 9);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let router = NotificationRouter::new();
        let (id, mut rx) = router.subscribe("blockAddedNotification");
        router.unsubscribe(id);
        assert!(router.is_empty());

        router.dispatch("blockAddedNotification", json!({}));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let router = NotificationRouter::new();
        let (_id, rx) = router.subscribe("blockAddedNotification");
        drop(rx);

        router.dispatch("blockAddedNotification", json!({}));
        assert!(router.is_empty());
    }

    #[test]
    fn fan_out_to_multiple_subscribers() {
        let router = NotificationRouter::new();
        let (_a, mut rx1) = router.subscribe("blockAddedNotification");
        let (_b, mut rx2) = router.subscribe("blockAddedNotification");

        router.dispatch("blockAddedNotification", json!({"hash": "aa"}));

        assert_eq!(rx1.try_recv().unwrap()["hash"], "aa");
        assert_eq!(rx2.try_recv().unwrap()["hash"], "aa");
    }
}
