//! The node stream client.
//!
//! One background supervisor task owns the stream. It walks the
//! [`StreamState`] machine forever: Connecting → Open → (on error or
//! close) Reconnecting → Connecting, with backoff between attempts and
//! never a terminal failure state. Callers interact only through the
//! command channel and their own oneshot futures — the dispatch loop is
//! the single place inbound frames are read.
//!
//! On entering Reconnecting every outstanding call fails with
//! `ConnectionLost`, and recorded standing subscriptions (e.g.
//! `notifyBlockAddedRequest`) are replayed once the new stream opens.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time;

use kasgate_core::frame::{response_kind_for, RequestFrame, ResponseFrame};
use kasgate_core::transport::{FrameConnector, FrameSink, FrameSource, StreamState};
use kasgate_core::NodeError;

use crate::correlator::PendingCalls;
use crate::router::{HandlerId, NotificationRouter};

/// Configuration for the node client.
#[derive(Debug, Clone)]
pub struct NodeClientConfig {
    /// Delay before the first reconnect attempt.
    pub reconnect_initial: Duration,
    /// Cap for the reconnect delay. Equal to `reconnect_initial` this is
    /// a fixed delay; higher values enable doubling up to the cap.
    pub reconnect_max: Duration,
    /// Default per-call response budget.
    pub call_timeout: Duration,
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_secs(10),
            reconnect_max: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Command sent from callers to the supervisor task.
enum Command {
    Send(RequestFrame),
    Register(RequestFrame),
    Close,
}

/// Standing subscription requests, replayed after every reconnect.
#[derive(Clone, Default)]
struct Registrations {
    entries: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Registrations {
    fn record(&self, kind: &str, body: &Value) {
        let mut entries = self.entries.lock().unwrap();
        if !entries.iter().any(|(k, b)| k == kind && b == body) {
            entries.push((kind.to_string(), body.clone()));
        }
    }

    fn snapshot(&self) -> Vec<(String, Value)> {
        self.entries.lock().unwrap().clone()
    }
}

/// Client for the node's bidirectional message stream.
///
/// Cheap to clone-share via `Arc`; all methods take `&self`.
pub struct NodeClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    pending: PendingCalls,
    router: NotificationRouter,
    registrations: Registrations,
    state_rx: watch::Receiver<StreamState>,
    next_id: Arc<AtomicU64>,
    config: NodeClientConfig,
}

impl NodeClient {
    /// Start the supervisor task against `connector`. Returns
    /// immediately; use [`wait_until_open`](Self::wait_until_open) to
    /// block until the first successful connect.
    pub fn connect(connector: Arc<dyn FrameConnector>, config: NodeClientConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(StreamState::Connecting);
        let pending = PendingCalls::new();
        let router = NotificationRouter::new();
        let registrations = Registrations::default();
        let next_id = Arc::new(AtomicU64::new(1));

        tokio::spawn(supervisor(
            connector,
            cmd_rx,
            pending.clone(),
            router.clone(),
            registrations.clone(),
            state_tx,
            config.clone(),
            next_id.clone(),
        ));

        Self {
            cmd_tx,
            pending,
            router,
            registrations,
            state_rx,
            next_id,
            config,
        }
    }

    /// Current stream state.
    pub fn state(&self) -> StreamState {
        *self.state_rx.borrow()
    }

    /// Watch stream-state transitions (tests drive reconnection through
    /// this without real time delays).
    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }

    /// Suspend until the stream is Open. Fails if the client shut down.
    pub async fn wait_until_open(&self) -> Result<(), NodeError> {
        let mut rx = self.state_rx.clone();
        loop {
            match *rx.borrow() {
                StreamState::Open => return Ok(()),
                StreamState::Closed => return Err(NodeError::ConnectionLost),
                _ => {}
            }
            rx.changed()
                .await
                .map_err(|_| NodeError::ConnectionLost)?;
        }
    }

    /// Issue one request and await its response payload, with the
    /// configured default timeout.
    pub async fn call(&self, request_kind: &str, body: Value) -> Result<Value, NodeError> {
        self.call_with_timeout(request_kind, body, self.config.call_timeout)
            .await
    }

    /// Issue one request and await its response payload.
    ///
    /// Resolution is by response tag ([`response_kind_for`]); concurrent
    /// same-kind calls pair first-in-first-out. On timeout the pending
    /// entry is removed so a late frame is discarded, not delivered.
    pub async fn call_with_timeout(
        &self,
        request_kind: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, NodeError> {
        if self.state() != StreamState::Open {
            return Err(NodeError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let expected = response_kind_for(request_kind);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(&expected, id, tx);

        let frame = RequestFrame::new(id, request_kind, body);
        if self.cmd_tx.send(Command::Send(frame)).is_err() {
            self.pending.abandon(&expected, id);
            return Err(NodeError::ConnectionLost);
        }

        match time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Supervisor went away without resolving us
            Ok(Err(_)) => Err(NodeError::ConnectionLost),
            Err(_) => {
                self.pending.abandon(&expected, id);
                Err(NodeError::Timeout {
                    ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Send a standing "notify me" request and record it for replay after
    /// every reconnect.
    pub fn register(&self, request_kind: &str, body: Value) -> Result<(), NodeError> {
        self.registrations.record(request_kind, &body);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = RequestFrame::new(id, request_kind, body);
        self.cmd_tx
            .send(Command::Register(frame))
            .map_err(|_| NodeError::ConnectionLost)
    }

    /// Subscribe to unsolicited push frames of `kind`.
    pub fn subscribe(&self, kind: &str) -> (HandlerId, mpsc::UnboundedReceiver<Value>) {
        self.router.subscribe(kind)
    }

    /// Remove a notification subscription.
    pub fn unsubscribe(&self, id: HandlerId) {
        self.router.unsubscribe(id);
    }

    /// Calls currently awaiting a response.
    pub fn outstanding_calls(&self) -> usize {
        self.pending.len()
    }

    /// Shut the client down. Outstanding calls fail with
    /// `ConnectionLost`; the supervisor exits.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }
}

impl Drop for NodeClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Close);
    }
}

/// The supervisor task — sole owner of the stream and the dispatch loop.
#[allow(clippy::too_many_arguments)]
async fn supervisor(
    connector: Arc<dyn FrameConnector>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    pending: PendingCalls,
    router: NotificationRouter,
    registrations: Registrations,
    state_tx: watch::Sender<StreamState>,
    config: NodeClientConfig,
    next_id: Arc<AtomicU64>,
) {
    let endpoint = connector.endpoint().to_string();
    let mut backoff = config.reconnect_initial;

    loop {
        let _ = state_tx.send(StreamState::Connecting);
        tracing::info!(endpoint = %endpoint, "connecting to node stream");

        let (mut sink, mut source) = match connector.connect().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, delay = ?backoff, "connect failed");
                let _ = state_tx.send(StreamState::Reconnecting);
                if !backoff_wait(&mut cmd_rx, backoff).await {
                    let _ = state_tx.send(StreamState::Closed);
                    return;
                }
                backoff = (backoff * 2).min(config.reconnect_max);
                continue;
            }
        };

        backoff = config.reconnect_initial;
        let _ = state_tx.send(StreamState::Open);
        tracing::info!(endpoint = %endpoint, "node stream open");

        // Replay standing subscriptions on the fresh stream
        for (kind, body) in registrations.snapshot() {
            let id = next_id.fetch_add(1, Ordering::Relaxed);
            let frame = RequestFrame::new(id, &kind, body);
            if let Err(e) = sink.send(&frame).await {
                tracing::warn!(kind = %kind, error = %e, "subscription replay failed");
            }
        }

        // Dispatch loop: one task reads inbound frames and forwards
        // outbound commands; callers never touch the stream directly.
        let closed = loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(Command::Close) => break true,
                    Some(Command::Send(frame)) | Some(Command::Register(frame)) => {
                        if let Err(e) = sink.send(&frame).await {
                            tracing::warn!(kind = %frame.kind, error = %e, "send failed");
                            break false;
                        }
                    }
                },
                msg = source.recv() => match msg {
                    None => break false,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "stream receive error");
                        break false;
                    }
                    Some(Ok(frame)) => dispatch(frame, &pending, &router),
                },
            }
        };

        sink.close().await;

        if closed {
            pending.fail_all(|| NodeError::ConnectionLost);
            let _ = state_tx.send(StreamState::Closed);
            tracing::info!(endpoint = %endpoint, "node stream closed");
            return;
        }

        let _ = state_tx.send(StreamState::Reconnecting);
        pending.fail_all(|| NodeError::ConnectionLost);
        tracing::warn!(endpoint = %endpoint, delay = ?backoff, "node stream lost, reconnecting");

        if !backoff_wait(&mut cmd_rx, backoff).await {
            let _ = state_tx.send(StreamState::Closed);
            return;
        }
        backoff = (backoff * 2).min(config.reconnect_max);
    }
}

/// Sleep out the backoff while still honoring commands. Sends issued in
/// this window are dropped (callers observe `NotConnected` up front);
/// registrations are recorded for replay. Returns `false` on Close.
async fn backoff_wait(cmd_rx: &mut mpsc::UnboundedReceiver<Command>, delay: Duration) -> bool {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                None | Some(Command::Close) => return false,
                Some(Command::Send(frame)) => {
                    tracing::debug!(kind = %frame.kind, "dropping send while disconnected");
                }
                // Already recorded by `register`; replayed on reconnect.
                Some(Command::Register(_)) => {}
            },
        }
    }
}

/// Route one inbound frame: notifications to the router, everything else
/// to the oldest same-kind waiter. Error payloads fail the waiter.
fn dispatch(frame: ResponseFrame, pending: &PendingCalls, router: &NotificationRouter) {
    if frame.is_notification() {
        router.dispatch(&frame.kind, frame.body);
        return;
    }
    let result = match frame.error_message() {
        Some(message) => Err(NodeError::Remote(message)),
        None => Ok(frame.body),
    };
    if !pending.resolve(&frame.kind, result) {
        tracing::debug!(kind = %frame.kind, "no waiter for frame, discarding");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    /// Channel-backed stream double. Each `connect` hands out the next
    /// scripted connection; tests hold the remote ends.
    struct MockConnector {
        connections: Mutex<Vec<(MockSink, MockSource)>>,
    }

    struct MockSink {
        sent: mpsc::UnboundedSender<RequestFrame>,
    }

    struct MockSource {
        incoming: mpsc::UnboundedReceiver<Result<ResponseFrame, NodeError>>,
    }

    /// Test-side handle on one scripted connection.
    struct Remote {
        /// Frames the client sent.
        sent_rx: mpsc::UnboundedReceiver<RequestFrame>,
        /// Push inbound frames; dropping this ends the stream.
        push: mpsc::UnboundedSender<Result<ResponseFrame, NodeError>>,
    }

    impl Remote {
        fn push_response(&self, kind: &str, body: Value) {
            self.push
                .send(Ok(ResponseFrame { kind: kind.into(), body }))
                .unwrap();
        }
    }

    #[async_trait]
    impl FrameSink for MockSink {
        async fn send(&mut self, frame: &RequestFrame) -> Result<(), NodeError> {
            self.sent
                .send(frame.clone())
                .map_err(|_| NodeError::Channel("remote gone".into()))
        }
        async fn close(&mut self) {}
    }

    #[async_trait]
    impl FrameSource for MockSource {
        async fn recv(&mut self) -> Option<Result<ResponseFrame, NodeError>> {
            self.incoming.recv().await
        }
    }

    #[async_trait]
    impl FrameConnector for MockConnector {
        async fn connect(
            &self,
        ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), NodeError> {
            let mut conns = self.connections.lock().unwrap();
            if conns.is_empty() {
                return Err(NodeError::Connect("no more scripted connections".into()));
            }
            let (sink, source) = conns.remove(0);
            Ok((Box::new(sink), Box::new(source)))
        }
        fn endpoint(&self) -> &str {
            "mock://node"
        }
    }

    fn scripted(count: usize) -> (Arc<MockConnector>, Vec<Remote>) {
        let mut conns = Vec::new();
        let mut remotes = Vec::new();
        for _ in 0..count {
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            let (push, incoming) = mpsc::unbounded_channel();
            conns.push((MockSink { sent: sent_tx }, MockSource { incoming }));
            remotes.push(Remote { sent_rx, push });
        }
        (
            Arc::new(MockConnector { connections: Mutex::new(conns) }),
            remotes,
        )
    }

    fn fast_config() -> NodeClientConfig {
        NodeClientConfig {
            reconnect_initial: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(10),
            call_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn call_resolves_by_response_tag() {
        let (connector, mut remotes) = scripted(1);
        let mut remote = remotes.remove(0);
        let client = Arc::new(NodeClient::connect(connector, fast_config()));
        client.wait_until_open().await.unwrap();

        let call = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .call("getBalanceByAddressRequest", json!({"address": "kaspa:qqx"}))
                    .await
            })
        };

        let sent = remote.sent_rx.recv().await.unwrap();
        assert_eq!(sent.kind, "getBalanceByAddressRequest");
        assert_eq!(sent.body["address"], "kaspa:qqx");

        remote.push_response("getBalanceByAddressResponse", json!({"balance": "700"}));

        let payload = call.await.unwrap().unwrap();
        assert_eq!(payload["balance"], "700");
        assert_eq!(client.outstanding_calls(), 0);
    }

    #[tokio::test]
    async fn error_payload_fails_with_remote() {
        let (connector, mut remotes) = scripted(1);
        let mut remote = remotes.remove(0);
        let client = Arc::new(NodeClient::connect(connector, fast_config()));
        client.wait_until_open().await.unwrap();

        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.call("getBlockRequest", json!({"hash": "ff"})).await })
        };
        let _ = remote.sent_rx.recv().await.unwrap();

        remote.push_response(
            "getBlockResponse",
            json!({"error": {"message": "block not found"}}),
        );

        match call.await.unwrap() {
            Err(NodeError::Remote(msg)) => assert_eq!(msg, "block not found"),
            other => panic!("expected Remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_calls_resolve_their_own_tags() {
        let (connector, mut remotes) = scripted(1);
        let mut remote = remotes.remove(0);
        let client = Arc::new(NodeClient::connect(connector, fast_config()));
        client.wait_until_open().await.unwrap();

        let c1 = {
            let client = client.clone();
            tokio::spawn(async move { client.call("getCoinSupplyRequest", json!({})).await })
        };
        let c2 = {
            let client = client.clone();
            tokio::spawn(async move { client.call("getBlockDagInfoRequest", json!({})).await })
        };

        let _ = remote.sent_rx.recv().await.unwrap();
        let _ = remote.sent_rx.recv().await.unwrap();

        // Answer in the opposite order the calls were issued
        remote.push_response("getBlockDagInfoResponse", json!({"virtualDaaScore": "9"}));
        remote.push_response("getCoinSupplyResponse", json!({"circulatingSompi": "3"}));

        let supply = c1.await.unwrap().unwrap();
        let dag = c2.await.unwrap().unwrap();
        assert_eq!(supply["circulatingSompi"], "3");
        assert_eq!(dag["virtualDaaScore"], "9");
    }

    #[tokio::test]
    async fn same_kind_calls_pair_fifo() {
        let (connector, mut remotes) = scripted(1);
        let mut remote = remotes.remove(0);
        let client = Arc::new(NodeClient::connect(connector, fast_config()));
        client.wait_until_open().await.unwrap();

        let first = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .call("getBalanceByAddressRequest", json!({"address": "a1"}))
                    .await
            })
        };
        let _ = remote.sent_rx.recv().await.unwrap();
        let second = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .call("getBalanceByAddressRequest", json!({"address": "a2"}))
                    .await
            })
        };
        let _ = remote.sent_rx.recv().await.unwrap();

        remote.push_response("getBalanceByAddressResponse", json!({"balance": "1"}));
        remote.push_response("getBalanceByAddressResponse", json!({"balance": "2"}));

        assert_eq!(first.await.unwrap().unwrap()["balance"], "1");
        assert_eq!(second.await.unwrap().unwrap()["balance"], "2");
    }

    #[tokio::test]
    async fn timeout_empties_pending_table() {
        let (connector, remotes) = scripted(1);
        let client = NodeClient::connect(connector, fast_config());
        client.wait_until_open().await.unwrap();

        let result = client
            .call_with_timeout(
                "getBalanceByAddressRequest",
                json!({"address": "kaspa:qqx"}),
                Duration::from_millis(30),
            )
            .await;

        assert!(matches!(result, Err(NodeError::Timeout { .. })));
        assert_eq!(client.outstanding_calls(), 0);
        drop(remotes);
    }

    #[tokio::test]
    async fn disconnect_fails_outstanding_calls() {
        let (connector, mut remotes) = scripted(2);
        let remote = remotes.remove(0);
        let client = Arc::new(NodeClient::connect(connector, fast_config()));
        client.wait_until_open().await.unwrap();

        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.call("getBlockDagInfoRequest", json!({})).await })
        };
        // Wait for the call to be registered, then kill the stream
        while client.outstanding_calls() == 0 {
            tokio::task::yield_now().await;
        }
        drop(remote);

        assert!(matches!(
            call.await.unwrap(),
            Err(NodeError::ConnectionLost)
        ));
        assert_eq!(client.outstanding_calls(), 0);
    }

    #[tokio::test]
    async fn reconnect_replays_registrations() {
        let (connector, mut remotes) = scripted(2);
        let first = remotes.remove(0);
        let mut second = remotes.remove(0);
        let client = NodeClient::connect(connector, fast_config());
        client.wait_until_open().await.unwrap();

        client.register("notifyBlockAddedRequest", json!({})).unwrap();
        let mut first_sent = first.sent_rx;
        let sent = first_sent.recv().await.unwrap();
        assert_eq!(sent.kind, "notifyBlockAddedRequest");

        // Drop the first stream; the supervisor reconnects and replays
        drop(first.push);
        let replayed = second.sent_rx.recv().await.unwrap();
        assert_eq!(replayed.kind, "notifyBlockAddedRequest");
        client.wait_until_open().await.unwrap();
        assert_eq!(client.state(), StreamState::Open);
    }

    #[tokio::test]
    async fn state_walks_reconnecting_on_drop() {
        let (connector, mut remotes) = scripted(2);
        let first = remotes.remove(0);
        let client = NodeClient::connect(connector, fast_config());
        client.wait_until_open().await.unwrap();

        let mut states = client.watch_state();
        drop(first);

        // Observe a non-open transition before the stream reopens
        loop {
            states.changed().await.unwrap();
            let s = *states.borrow();
            assert_ne!(s, StreamState::Closed);
            if matches!(s, StreamState::Reconnecting | StreamState::Connecting) {
                break;
            }
        }
        client.wait_until_open().await.unwrap();
    }

    #[tokio::test]
    async fn call_while_disconnected_is_not_connected() {
        let (connector, remotes) = scripted(1);
        let client = NodeClient::connect(connector, fast_config());
        client.wait_until_open().await.unwrap();
        drop(remotes);

        // Wait until the supervisor notices the drop
        let mut states = client.watch_state();
        while *states.borrow() == StreamState::Open {
            states.changed().await.unwrap();
        }

        let result = client.call("getBlockDagInfoRequest", json!({})).await;
        assert!(matches!(result, Err(NodeError::NotConnected)));
    }

    #[tokio::test]
    async fn notifications_route_past_the_correlator() {
        let (connector, mut remotes) = scripted(1);
        let remote = remotes.remove(0);
        let client = NodeClient::connect(connector, fast_config());
        client.wait_until_open().await.unwrap();

        let (_id, mut rx) = client.subscribe("blockAddedNotification");
        remote.push_response(
            "blockAddedNotification",
            json!({"block": {"verboseData": {"hash": "aa"}}}),
        );

        let body = rx.recv().await.unwrap();
        assert_eq!(body["block"]["verboseData"]["hash"], "aa");
        assert_eq!(client.outstanding_calls(), 0);
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let (connector, _remotes) = scripted(1);
        let client = NodeClient::connect(connector, fast_config());
        client.wait_until_open().await.unwrap();

        client.close();
        let mut states = client.watch_state();
        while *states.borrow() != StreamState::Closed {
            states.changed().await.unwrap();
        }
        assert!(client.wait_until_open().await.is_err());
    }
}
