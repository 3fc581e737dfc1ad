//! Error handling for the resilient WebSocket client.
//!
//! Input validation failures are returned synchronously from the call that
//! caused them. Everything that happens later (connection loss, timeouts,
//! exhausted reconnects) is delivered through response callbacks, the
//! `send_async` future, or the `error` event.

use std::time::Duration;

use thiserror::Error;

/// The main result type used throughout the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Error type for all client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Invalid configuration or an unsupported payload shape.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Subscription to an event name outside `open`, `close`, `message`, `error`.
    #[error("Unsupported event: {name}")]
    UnsupportedEvent { name: String },

    /// No transport exists, or it is not open, at send time.
    #[error("Not connected")]
    NotConnected,

    /// A correlated response arrived after the transport left the open state.
    #[error("Connection not open")]
    ConnectionNotOpen,

    /// The transport did not open within the configured timeout.
    #[error("Connection timed out after {duration:?}")]
    ConnectTimeout { duration: Duration },

    /// Reconnection gave up after reaching the configured attempt limit.
    #[error("Reconnection attempts exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// A pending request expired before a correlated response arrived.
    #[error("Request {request_id} timed out after {duration:?}")]
    RequestTimeout {
        duration: Duration,
        request_id: String,
    },

    /// A message queued while offline was dropped to make room for a newer one.
    #[error("Cached message evicted (capacity {capacity})")]
    CacheEvicted { capacity: usize },

    /// An inbound frame could not be decoded as structured data.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Errors reported by the underlying socket.
    #[error("WebSocket error: {message}")]
    WebSocket { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The client has been destroyed.
    #[error("Client destroyed")]
    Destroyed,

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket {
            message: e.to_string(),
        }
    }
}

impl ClientError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an unsupported-event error.
    pub fn unsupported_event(name: impl Into<String>) -> Self {
        Self::UnsupportedEvent { name: name.into() }
    }

    /// Create a WebSocket error.
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a connect-timeout error.
    pub fn connect_timeout(duration: Duration) -> Self {
        Self::ConnectTimeout { duration }
    }

    /// Create a request-timeout error.
    pub fn request_timeout(duration: Duration, request_id: impl Into<String>) -> Self {
        Self::RequestTimeout {
            duration,
            request_id: request_id.into(),
        }
    }
}
