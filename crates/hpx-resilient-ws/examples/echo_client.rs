//! Resilient Echo Client Example
//!
//! Connects to a WebSocket echo server that returns JSON frames unchanged,
//! sends a few correlated requests and prints the replies. Stop and restart
//! the server while it runs to watch the client back off and reconnect.
//!
//! Run with: `cargo run -p hpx-resilient-ws --example echo_client -- ws://127.0.0.1:9001`

use std::time::Duration;

use hpx_resilient_ws::{ConnectionState, Event, EventKind, WsClient, WsConfig};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9001".to_string());

    let config = WsConfig::new(url)
        .reconnect_interval(Duration::from_millis(500))
        .reconnect_max_interval(Duration::from_secs(5))
        .request_timeout(Duration::from_secs(5))
        .cache_when_disconnected(true);
    let client = WsClient::with_tungstenite(config)?;

    client.on(EventKind::Open, |_| tracing::info!("open"));
    client.on(EventKind::Close, |event| {
        if let Event::Close(info) = event {
            tracing::info!(code = ?info.code, reason = %info.reason, "close");
        }
    });
    client.on(EventKind::Error, |event| {
        if let Event::Error(e) = event {
            tracing::warn!(error = %e, "error");
        }
    });

    client.connect()?;
    client.wait_for_state(ConnectionState::Open).await?;

    for n in 0..5 {
        match client.send_async(json!({"op": "echo", "n": n})).await {
            Ok(reply) => println!("reply {n}: {reply}"),
            Err(e) => println!("request {n} failed: {e}"),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    client.destroy();
    Ok(())
}
