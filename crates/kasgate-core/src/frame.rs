//! Wire envelopes for the node's message stream.
//!
//! The stream speaks a oneof-style JSON framing: a request is
//! `{"id": 7, "getBalanceByAddressRequest": {...}}` and every inbound
//! frame is `{"payload": "<kind>", "<kind>": <body>}`, where the kind is
//! either a call response (`...Response`) or an unsolicited notification
//! (`...Notification`). The body of a failed call carries
//! `{"error": {"message": "..."}}` instead of result fields.

use serde_json::{Map, Value};

use crate::error::NodeError;

/// Suffix convention tying a request kind to its response kind.
const REQUEST_SUFFIX: &str = "Request";
const RESPONSE_SUFFIX: &str = "Response";
const NOTIFICATION_SUFFIX: &str = "Notification";

/// Derive the response tag a request kind is expected to produce.
///
/// `getBalanceByAddressRequest` → `getBalanceByAddressResponse`. Kinds
/// without the `Request` suffix are returned unchanged (no such kinds
/// exist in the protocol, but the correlator must not panic on them).
pub fn response_kind_for(request_kind: &str) -> String {
    match request_kind.strip_suffix(REQUEST_SUFFIX) {
        Some(stem) => format!("{stem}{RESPONSE_SUFFIX}"),
        None => request_kind.to_string(),
    }
}

/// An outbound request frame.
#[derive(Debug, Clone)]
pub struct RequestFrame {
    /// Monotonic request id. Advisory only — the protocol does not echo
    /// it back reliably, so correlation happens by response tag.
    pub id: u64,
    /// The request kind tag (e.g. `notifyBlockAddedRequest`).
    pub kind: String,
    /// The request body.
    pub body: Value,
}

impl RequestFrame {
    pub fn new(id: u64, kind: impl Into<String>, body: Value) -> Self {
        Self { id, kind: kind.into(), body }
    }

    /// Encode as the dynamic-key wire object `{"id": .., "<kind>": body}`.
    pub fn to_wire(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".into(), Value::from(self.id));
        map.insert(self.kind.clone(), self.body.clone());
        Value::Object(map)
    }
}

/// An inbound frame — a call response or an unsolicited notification.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    /// The payload tag identifying which variant is populated.
    pub kind: String,
    /// The populated variant body.
    pub body: Value,
}

impl ResponseFrame {
    /// Parse a raw wire object. Fails if the `payload` tag is missing or
    /// the tagged variant is absent.
    pub fn from_wire(value: Value) -> Result<Self, NodeError> {
        let kind = value
            .get("payload")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Channel("frame missing payload tag".into()))?
            .to_string();
        let body = value
            .get(&kind)
            .cloned()
            .ok_or_else(|| NodeError::Channel(format!("frame missing {kind} body")))?;
        Ok(Self { kind, body })
    }

    /// Encode back to the wire shape (used by test doubles).
    pub fn to_wire(&self) -> Value {
        let mut map = Map::new();
        map.insert("payload".into(), Value::from(self.kind.clone()));
        map.insert(self.kind.clone(), self.body.clone());
        Value::Object(map)
    }

    /// `true` if this frame is an unsolicited push, not a call response.
    pub fn is_notification(&self) -> bool {
        self.kind.ends_with(NOTIFICATION_SUFFIX)
    }

    /// The structured error message, if the body carries one.
    pub fn error_message(&self) -> Option<String> {
        self.body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
