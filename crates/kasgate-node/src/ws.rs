//! WebSocket carrier for the node's message stream.
//!
//! Frames travel as JSON text messages. The connector dials the node's
//! protowire JSON gateway; each connect attempt is bounded so a dead
//! endpoint fails fast instead of hanging the supervisor.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use kasgate_core::frame::{RequestFrame, ResponseFrame};
use kasgate_core::transport::{FrameConnector, FrameSink, FrameSource};
use kasgate_core::NodeError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials one WebSocket endpoint, producing a fresh stream per attempt.
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl FrameConnector for WsConnector {
    async fn connect(
        &self,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), NodeError> {
        let attempt = tokio_tungstenite::connect_async(&self.url);
        let (stream, _) = time::timeout(self.connect_timeout, attempt)
            .await
            .map_err(|_| {
                NodeError::Connect(format!(
                    "timed out after {:?} dialing {}",
                    self.connect_timeout, self.url
                ))
            })?
            .map_err(|e| NodeError::Connect(e.to_string()))?;

        let (sink, source) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { source })))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: &RequestFrame) -> Result<(), NodeError> {
        let text = serde_json::to_string(&frame.to_wire())?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| NodeError::Channel(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

struct WsSource {
    source: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Option<Result<ResponseFrame, NodeError>> {
        loop {
            match self.source.next().await? {
                Ok(Message::Text(text)) => {
                    let parsed = serde_json::from_str::<serde_json::Value>(text.as_str())
                        .map_err(NodeError::from)
                        .and_then(ResponseFrame::from_wire);
                    return Some(parsed);
                }
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite; skip other frames
                Ok(_) => continue,
                Err(e) => return Some(Err(NodeError::Channel(e.to_string()))),
            }
        }
    }
}
