//! Core type definitions for the WebSocket client.

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::error::ClientError;

/// Unique identifier for request-response correlation.
/// Uses ULID for lexicographically sortable, unique IDs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new unique request ID using ULID.
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The closed set of events a client can be observed through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The transport opened.
    Open,
    /// The transport closed, for any reason.
    Close,
    /// A raw inbound frame arrived.
    Message,
    /// A transport error or a synthetic timeout/exhaustion error.
    Error,
}

impl EventKind {
    /// All supported kinds, in declaration order.
    pub const ALL: [EventKind; 4] = [Self::Open, Self::Close, Self::Message, Self::Error];

    /// The wire name of this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Message => "message",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "close" => Ok(Self::Close),
            "message" => Ok(Self::Message),
            "error" => Ok(Self::Error),
            other => Err(ClientError::unsupported_event(other)),
        }
    }
}

/// Connection state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport and nothing scheduled.
    Idle,
    /// A transport exists and is opening.
    Connecting,
    /// The transport is open and ready for traffic.
    Open,
    /// A user-initiated close is in flight.
    Closing,
    /// Waiting for the reconnect timer.
    Reconnecting,
    /// Terminal; the client accepts no further work.
    Destroyed,
}

impl ConnectionState {
    /// Check if the connection is ready for traffic.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the client has been destroyed (terminal state).
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

/// Monotonic counter identifying one transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionEpoch(pub u64);

impl ConnectionEpoch {
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ConnectionEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How inbound binary frames are delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryMode {
    /// Deliver binary frames untouched.
    #[default]
    Raw,
    /// Decode binary frames as UTF-8 text so they take part in correlation.
    /// Frames that are not valid UTF-8 are delivered raw.
    Utf8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_uniqueness() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_request_id_from_str() {
        let id: RequestId = "test-id".into();
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(format!("{id}"), "test-id");
    }

    #[test]
    fn test_event_kind_round_trips_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().ok(), Some(kind));
        }
    }

    #[test]
    fn test_event_kind_rejects_unknown_names() {
        let err = "reconnect".parse::<EventKind>().unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedEvent { name } if name == "reconnect"));

        assert!("Open".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_connection_state_predicates() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
        assert!(ConnectionState::Destroyed.is_destroyed());
        assert!(!ConnectionState::Idle.is_destroyed());
    }

    #[test]
    fn test_binary_mode_deserializes_lowercase() {
        let mode: BinaryMode = serde_json::from_str("\"utf8\"").expect("mode");
        assert_eq!(mode, BinaryMode::Utf8);
        assert_eq!(BinaryMode::default(), BinaryMode::Raw);
    }
}
