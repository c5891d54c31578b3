//! Wire envelopes exchanged with the host.
//!
//! Every frame is one JSON object. Direction UI → host:
//!
//! - request: `{id, method, params}`
//! - batch request: `{batchId, items: [{id, method, params}, ...]}`
//! - liveness probe: `{ping: n}`
//!
//! Direction host → UI:
//!
//! - reply: `{id, ok, value|error}` (may carry a `topic`)
//! - batch reply: `{batchId, items: [{id, ok, value|error}, ...]}`
//! - push: `{topic, payload}` (no id)
//! - probe answer: `{pong: n}`
//!
//! Frames are classified by their distinguishing key rather than a type tag,
//! so hosts that only speak the shapes above need no extra field.

use crate::error::BridgeError;

use std::fmt::{Display, Formatter, Result as FormatResult};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

const KEY_BATCH_ID: &str = "batchId";
const KEY_ID: &str = "id";
const KEY_METHOD: &str = "method";
const KEY_PING: &str = "ping";
const KEY_PONG: &str = "pong";
const KEY_TOPIC: &str = "topic";

/// Correlation id of one outstanding request/reply pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequestFrame {
    #[serde(rename = "batchId")]
    pub batch_id: String,
    pub items: Vec<RequestFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub id: RequestId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl ReplyFrame {
    pub fn success(id: RequestId, value: Value) -> Self {
        Self {
            id,
            ok: true,
            value: Some(value),
            error: None,
            topic: None,
        }
    }

    pub fn failure(id: RequestId, error: Value) -> Self {
        Self {
            id,
            ok: false,
            value: None,
            error: Some(error),
            topic: None,
        }
    }

    /// Payload the unmatched reply would carry if routed as a push.
    pub(crate) fn push_payload(&self) -> Value {
        if self.ok {
            self.value.clone().unwrap_or(Value::Null)
        } else {
            self.error.clone().unwrap_or(Value::Null)
        }
    }

    /// Convert into the caller-facing outcome; `ok: false` becomes a host error.
    pub fn into_result(self) -> Result<Value, BridgeError> {
        if self.ok {
            Ok(self.value.unwrap_or(Value::Null))
        } else {
            Err(BridgeError::host(self.error.unwrap_or(Value::Null)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReplyFrame {
    #[serde(rename = "batchId")]
    pub batch_id: String,
    pub items: Vec<ReplyFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PingFrame {
    ping: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PongFrame {
    pong: u64,
}

/// Frames the bridge sends to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Request(RequestFrame),
    Batch(BatchRequestFrame),
    Ping(u64),
}

/// Frames the host sends to the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Reply(ReplyFrame),
    BatchReply(BatchReplyFrame),
    Push(PushFrame),
    Pong(u64),
}

impl Outgoing {
    pub fn encode(&self) -> Result<Vec<u8>, BridgeError> {
        let bytes = match self {
            Outgoing::Request(frame) => serde_json::to_vec(frame)?,
            Outgoing::Batch(frame) => serde_json::to_vec(frame)?,
            Outgoing::Ping(n) => serde_json::to_vec(&PingFrame { ping: *n })?,
        };
        Ok(bytes)
    }

    /// Decode a frame as the host would.
    pub fn decode(bytes: &[u8]) -> Result<Self, BridgeError> {
        let map = decode_object(bytes)?;

        if map.contains_key(KEY_BATCH_ID) {
            Ok(Outgoing::Batch(from_map(map)?))
        } else if map.contains_key(KEY_PING) {
            let frame: PingFrame = from_map(map)?;
            Ok(Outgoing::Ping(frame.ping))
        } else if map.contains_key(KEY_ID) && map.contains_key(KEY_METHOD) {
            Ok(Outgoing::Request(from_map(map)?))
        } else {
            Err(BridgeError::protocol(format!(
                "Unrecognized outgoing frame with keys {:?}",
                map.keys().collect::<Vec<_>>()
            )))
        }
    }
}

impl Incoming {
    pub fn encode(&self) -> Result<Vec<u8>, BridgeError> {
        let bytes = match self {
            Incoming::Reply(frame) => serde_json::to_vec(frame)?,
            Incoming::BatchReply(frame) => serde_json::to_vec(frame)?,
            Incoming::Push(frame) => serde_json::to_vec(frame)?,
            Incoming::Pong(n) => serde_json::to_vec(&PongFrame { pong: *n })?,
        };
        Ok(bytes)
    }

    /// Classify and decode a frame received from the host.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Protocol`] for invalid JSON, non-object frames,
    /// frames matching no known shape, or frames with mistyped fields.
    pub fn decode(bytes: &[u8]) -> Result<Self, BridgeError> {
        let map = decode_object(bytes)?;

        if map.contains_key(KEY_BATCH_ID) {
            Ok(Incoming::BatchReply(from_map(map)?))
        } else if map.contains_key(KEY_PONG) {
            let frame: PongFrame = from_map(map)?;
            Ok(Incoming::Pong(frame.pong))
        } else if map.contains_key(KEY_ID) {
            Ok(Incoming::Reply(from_map(map)?))
        } else if map.contains_key(KEY_TOPIC) {
            Ok(Incoming::Push(from_map(map)?))
        } else {
            Err(BridgeError::protocol(format!(
                "Unrecognized incoming frame with keys {:?}",
                map.keys().collect::<Vec<_>>()
            )))
        }
    }
}

fn decode_object(bytes: &[u8]) -> Result<Map<String, Value>, BridgeError> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        other => Err(BridgeError::protocol(format!(
            "Expected a JSON object frame, got {}",
            json_kind(&other)
        ))),
    }
}

fn from_map<T: DeserializeOwned>(map: Map<String, Value>) -> Result<T, BridgeError> {
    Ok(serde_json::from_value(Value::Object(map))?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
