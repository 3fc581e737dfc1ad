//! Resilient WebSocket client.
//!
//! This module provides a WebSocket client with support for:
//!
//! - **Request-Response Correlation**: JSON object payloads get a generated
//!   key under a configurable field; the inbound frame carrying the same key
//!   resolves the sender's callback or future
//! - **Auto-Reconnection**: Exponential backoff, capped, with an optional
//!   attempt limit that surfaces as an `error` event when reached
//! - **Offline Cache**: Optional bounded queue of sends made while
//!   disconnected, replayed in order and paced after the next open
//! - **Events**: `open`, `close`, `message` and `error` listeners
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐ commands ┌──────────────────────┐  per-epoch  ┌──────────────┐
//! │  WsClient   │─────────▶│ ConnectionController │◀───────────▶│ driver task  │
//! │  (Clone)    │          │     (background)     │   events    │ (Connector)  │
//! └──────┬──────┘          └──────────┬───────────┘             └──────────────┘
//!        │ listeners                  │ owns
//!        ▼                            ▼
//! ┌─────────────┐    PendingRequestTable · OutboundCache · ReconnectPolicy
//! │  EventHub   │    connect guard · reconnect timer · drain timer
//! └─────────────┘
//! ```
//!
//! The controller is the only owner of connection state. Listeners run on
//! the controller task; anything they call on a [`WsClient`] is queued and
//! handled after the current event.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hpx_resilient_ws::websocket::{EventKind, WsClient, WsConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WsConfig::new("ws://127.0.0.1:9001")
//!         .cache_when_disconnected(true)
//!         .reconnect_max_attempts(10);
//!     let client = WsClient::with_tungstenite(config)?;
//!
//!     client.on(EventKind::Close, |event| println!("closed: {event:?}"));
//!     client.connect()?;
//!
//!     let reply = client.send_async(serde_json::json!({"op": "status"})).await?;
//!     println!("reply: {reply}");
//!
//!     client.destroy();
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `connect_timeout` | 5s | Time allowed for the socket to open |
//! | `reconnect` | true | Reconnect after unexpected closes |
//! | `reconnect_interval` | 5s | Delay before the first retry |
//! | `reconnect_max_interval` | 10s | Backoff ceiling |
//! | `reconnect_max_attempts` | 0 | Retry limit, 0 for unlimited |
//! | `correlation_field` | `message_id` | Field carrying the correlation key |
//! | `request_timeout` | none | Expiry for unanswered correlated sends |
//! | `cache_when_disconnected` | false | Queue sends made with no transport |
//! | `max_cached_messages` | 100 | Cache capacity, oldest evicted first |
//! | `cache_drain_interval` | 100ms | Spacing between replayed messages |
//!
//! # Error Handling
//!
//! Invalid payloads and unknown event names fail synchronously with
//! [`ClientError`](crate::error::ClientError). Connection failures reach
//! response callbacks as
//! [`ClientError::NotConnected`](crate::error::ClientError::NotConnected) or
//! [`ClientError::ConnectionNotOpen`](crate::error::ClientError::ConnectionNotOpen),
//! and lifecycle failures (connect timeouts, exhausted retries) arrive as
//! `error` events.

mod actor;
mod cache;
mod config;
mod events;
#[cfg(test)]
mod mock;
mod pending;
mod protocol;
mod timer;
mod transport;
mod types;
mod ws_client;

pub use cache::{CachedMessage, Drain, OutboundCache};
pub use config::{WsConfig, WsOptions};
pub use events::{CloseInfo, Event, EventHub, Listener};
pub use pending::{PendingRequestTable, ResponseCallback};
pub use protocol::{Envelope, IntoPayload, Payload, WsMessage};
pub use transport::{Connector, Frame, FrameSink, FrameStream, TungsteniteConnector};
pub use types::{BinaryMode, ConnectionEpoch, ConnectionState, EventKind, RequestId};
pub use ws_client::WsClient;
