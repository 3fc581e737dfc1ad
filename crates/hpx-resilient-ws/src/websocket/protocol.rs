//! Message, payload and correlation envelope types.
//!
//! Outbound structured payloads are wrapped in an [`Envelope`] that carries
//! the correlation key separately from the caller's fields. Injecting the key
//! into the JSON wire form and extracting it from inbound frames both happen
//! here and nowhere else.

use bytes::Bytes;
use serde_json::{Map, Value};

use super::types::RequestId;
use crate::error::{ClientError, ClientResult};

/// Message representation for WebSocket communication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsMessage {
    /// Text message.
    Text(String),
    /// Binary message.
    Binary(Bytes),
}

impl WsMessage {
    /// Create a text message.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Create a binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Get as text if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// Check if this is a text message.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Check if this is a binary message.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

/// An outbound payload accepted by `send`.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Sent verbatim, never correlated.
    Text(String),
    /// A JSON object that receives a correlation key.
    Json(Map<String, Value>),
}

impl Payload {
    /// Whether this payload takes part in request/response correlation.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Json(_))
    }
}

/// Conversion into a [`Payload`], rejecting shapes that are neither text nor
/// a JSON object.
pub trait IntoPayload {
    fn into_payload(self) -> ClientResult<Payload>;
}

impl IntoPayload for Payload {
    fn into_payload(self) -> ClientResult<Payload> {
        Ok(self)
    }
}

impl IntoPayload for String {
    fn into_payload(self) -> ClientResult<Payload> {
        Ok(Payload::Text(self))
    }
}

impl IntoPayload for &str {
    fn into_payload(self) -> ClientResult<Payload> {
        Ok(Payload::Text(self.to_string()))
    }
}

impl IntoPayload for Map<String, Value> {
    fn into_payload(self) -> ClientResult<Payload> {
        Ok(Payload::Json(self))
    }
}

impl IntoPayload for Value {
    fn into_payload(self) -> ClientResult<Payload> {
        match self {
            Value::Object(map) => Ok(Payload::Json(map)),
            Value::String(text) => Ok(Payload::Text(text)),
            other => Err(ClientError::validation(format!(
                "Payload must be text or a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A structured payload paired with its correlation key.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Correlation key.
    pub key: RequestId,
    /// Caller fields. On decode this is the whole inbound object.
    pub payload: Map<String, Value>,
}

impl Envelope {
    /// Pair a payload with a freshly generated key.
    pub fn new(payload: Map<String, Value>) -> Self {
        Self {
            key: RequestId::new(),
            payload,
        }
    }

    /// Serialize to wire text, writing the key under `field`.
    ///
    /// A caller field with the same name is overwritten.
    pub fn encode(&self, field: &str) -> ClientResult<String> {
        let mut object = self.payload.clone();
        object.insert(field.to_string(), Value::String(self.key.to_string()));
        Ok(serde_json::to_string(&object)?)
    }

    /// Decode an inbound frame.
    ///
    /// Returns `Ok(None)` when the frame is JSON but not a correlated object,
    /// and a [`ClientError::Parse`] when it is not JSON at all. Numeric keys
    /// are accepted and compared in their decimal form.
    pub fn decode(text: &str, field: &str) -> ClientResult<Option<Self>> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ClientError::parse(e.to_string()))?;

        let Value::Object(payload) = value else {
            return Ok(None);
        };

        let key = match payload.get(field) {
            Some(Value::String(s)) => RequestId::from(s.as_str()),
            Some(Value::Number(n)) => RequestId::from(n.to_string()),
            _ => return Ok(None),
        };

        Ok(Some(Self { key, payload }))
    }
}
