//! # hpx-resilient-ws
//!
//! A WebSocket client that keeps itself connected.
//!
//! The client wraps a duplex socket with a connection state machine,
//! exponential-backoff reconnection, request/response correlation over the
//! single socket, and an optional bounded cache for messages sent while
//! disconnected.
//!
//! ## Features
//!
//! - **Reconnection**: `min(base * 2^n, max)` backoff, reset on every open
//! - **Correlation**: generated keys matched against inbound JSON frames
//! - **Offline Cache**: drop-oldest queue replayed in order after reconnect
//! - **Observability**: `tracing` spans and events for every transition
//! - **Pluggable Transport**: implement [`websocket::Connector`] or use the
//!   bundled `tokio-tungstenite` one
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hpx_resilient_ws::{WsClient, WsConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WsClient::with_tungstenite(WsConfig::new("ws://127.0.0.1:9001"))?;
//!     client.connect()?;
//!
//!     client.send_with_callback(serde_json::json!({"op": "ping"}), |reply| {
//!         println!("reply: {reply:?}");
//!     })?;
//!     Ok(())
//! }
//! ```

pub mod error;
mod reconnect;
pub mod websocket;

pub use error::{ClientError, ClientResult};
pub use websocket::{
    BinaryMode, ConnectionState, Event, EventKind, WsClient, WsConfig, WsMessage, WsOptions,
};
