//! Pending-call table.
//!
//! The stream's correlation is effectively by payload tag, not by id echo,
//! so the table keys on the *expected response kind*. Concurrent calls of
//! the same kind pair first-in-first-out: an inbound frame resolves the
//! oldest waiter of its kind. The numeric id is advisory — it lets a
//! timed-out caller remove exactly its own entry.
//!
//! This table is the sole shared mutable state between callers and the
//! dispatch task; every operation takes the lock once and is atomic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;

use kasgate_core::NodeError;

struct PendingCall {
    id: u64,
    created_at: Instant,
    tx: oneshot::Sender<Result<Value, NodeError>>,
}

/// Table of calls awaiting a response, keyed by expected response kind.
#[derive(Clone, Default)]
pub struct PendingCalls {
    inner: Arc<Mutex<HashMap<String, VecDeque<PendingCall>>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call awaiting `kind`. The sender fires exactly once.
    pub fn insert(&self, kind: &str, id: u64, tx: oneshot::Sender<Result<Value, NodeError>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.entry(kind.to_string()).or_default().push_back(PendingCall {
            id,
            created_at: Instant::now(),
            tx,
        });
    }

    /// Resolve the oldest waiter for `kind`. Returns `false` if no call
    /// was awaiting that kind (the frame is then discarded by the caller).
    pub fn resolve(&self, kind: &str, result: Result<Value, NodeError>) -> bool {
        let call = {
            let mut inner = self.inner.lock().unwrap();
            match inner.get_mut(kind) {
                Some(queue) => {
                    let call = queue.pop_front();
                    if queue.is_empty() {
                        inner.remove(kind);
                    }
                    call
                }
                None => None,
            }
        };
        match call {
            Some(call) => {
                tracing::trace!(
                    kind,
                    id = call.id,
                    elapsed_ms = call.created_at.elapsed().as_millis() as u64,
                    "resolving call"
                );
                // Receiver may have given up; that is not our problem here.
                let _ = call.tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Remove one waiter by (kind, id) — the timeout path. Returns `true`
    /// if the entry was still present.
    pub fn abandon(&self, kind: &str, id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(queue) = inner.get_mut(kind) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|c| c.id != id);
        let removed = queue.len() < before;
        if queue.is_empty() {
            inner.remove(kind);
        }
        removed
    }

    /// Fail every outstanding call. Used when the stream drops: each
    /// waiter gets its own error from `err`.
    pub fn fail_all(&self, err: impl Fn() -> NodeError) {
        let drained: Vec<PendingCall> = {
            let mut inner = self.inner.lock().unwrap();
            inner.drain().flat_map(|(_, q)| q).collect()
        };
        for call in drained {
            let _ = call.tx.send(Err(err()));
        }
    }

    /// Total outstanding calls across all kinds.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a waiter with this id is still registered under `kind`.
    pub fn contains(&self, kind: &str, id: u64) -> bool {
        self.inner
            .lock()
            .unwrap()
            .get(kind)
            .is_some_and(|q| q.iter().any(|c| c.id == id))
    }
}
