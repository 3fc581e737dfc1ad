//! User-facing WebSocket client API.
//!
//! [`WsClient`] is a cheap, cloneable handle onto a background connection
//! controller. Every method returns without waiting on the network; outcomes
//! arrive through callbacks, the futures returned by the async helpers, or
//! the event listeners.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

use super::{
    actor::{Command, ConnectionController},
    config::{WsConfig, WsOptions},
    events::{Event, EventHub, Listener},
    pending::ResponseCallback,
    protocol::IntoPayload,
    transport::{Connector, TungsteniteConnector},
    types::{BinaryMode, ConnectionState, EventKind},
};
use crate::error::{ClientError, ClientResult};

/// Resilient WebSocket client.
///
/// Clones share one connection. The connection controller shuts down once
/// [`WsClient::destroy`] is called or the last clone is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let client = WsClient::with_tungstenite(WsConfig::new("ws://127.0.0.1:9001"))?;
/// client.on(EventKind::Open, |_| tracing::info!("connected"));
/// client.connect()?;
///
/// let reply = client.send_async(serde_json::json!({"op": "ping"})).await?;
/// ```
#[derive(Clone)]
pub struct WsClient {
    commands: mpsc::UnboundedSender<Command>,
    hub: Arc<EventHub>,
    state: watch::Receiver<ConnectionState>,
    config: Arc<WsConfig>,
}

impl WsClient {
    /// Create a client over `connector` and spawn its controller.
    ///
    /// Must be called from within a Tokio runtime. The client starts `Idle`;
    /// call [`WsClient::connect`] to open the socket.
    pub fn new(config: WsConfig, connector: Arc<dyn Connector>) -> ClientResult<Self> {
        config.validate().map_err(ClientError::validation)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::internal("WsClient must be created inside a Tokio runtime"))?;

        let config = Arc::new(config);
        let hub = Arc::new(EventHub::new());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Idle);

        let controller = ConnectionController::new(
            Arc::clone(&config),
            connector,
            Arc::clone(&hub),
            command_rx,
            state_tx,
        );
        runtime.spawn(controller.run());

        info!(url = %config.url, "WebSocket client created");

        Ok(Self {
            commands,
            hub,
            state,
            config,
        })
    }

    /// Create a client using the bundled `tokio-tungstenite` transport.
    pub fn with_tungstenite(config: WsConfig) -> ClientResult<Self> {
        Self::new(config, Arc::new(TungsteniteConnector))
    }

    /// Resolve `options` over the defaults and create a `tokio-tungstenite`
    /// client.
    pub fn from_options(options: WsOptions) -> ClientResult<Self> {
        Self::with_tungstenite(WsConfig::from_options(options)?)
    }

    /// Open the socket. A no-op while a transport is already connecting or
    /// open.
    pub fn connect(&self) -> ClientResult<()> {
        if self.is_destroyed() {
            return Err(ClientError::Destroyed);
        }
        self.commands
            .send(Command::Connect)
            .map_err(|_| ClientError::Destroyed)
    }

    /// Switch how inbound binary frames are delivered on the current
    /// transport. Ignored when no transport exists.
    pub fn set_binary_mode(&self, mode: BinaryMode) {
        let _ = self.commands.send(Command::SetBinaryMode(mode));
    }

    /// Send without a completion callback.
    ///
    /// Fails synchronously only when the payload is neither text nor a JSON
    /// object.
    pub fn send(&self, payload: impl IntoPayload) -> ClientResult<()> {
        self.dispatch(payload, None)
    }

    /// Send and receive the correlated response, or the failure, through
    /// `callback`.
    ///
    /// Text payloads are never correlated and their callback is never invoked.
    pub fn send_with_callback<F>(&self, payload: impl IntoPayload, callback: F) -> ClientResult<()>
    where
        F: FnOnce(ClientResult<Value>) + Send + 'static,
    {
        self.dispatch(payload, Some(Box::new(callback)))
    }

    fn dispatch(
        &self,
        payload: impl IntoPayload,
        callback: Option<ResponseCallback>,
    ) -> ClientResult<()> {
        let payload = payload.into_payload()?;
        // controller gone: the callback still hears about it
        if let Err(mpsc::error::SendError(Command::Send {
            callback: Some(callback),
            ..
        })) = self.commands.send(Command::Send { payload, callback })
        {
            callback(Err(ClientError::NotConnected));
        }
        Ok(())
    }

    /// Send a JSON object and await its correlated response.
    ///
    /// Text payloads are rejected up front since they can never be answered.
    pub async fn send_async(&self, payload: impl IntoPayload) -> ClientResult<Value> {
        let payload = payload.into_payload()?;
        if !payload.is_structured() {
            return Err(ClientError::validation(
                "send_async requires a JSON object payload",
            ));
        }

        let (tx, rx) = oneshot::channel();
        self.dispatch(payload, Some(Box::new(move |result: ClientResult<Value>| {
            let _ = tx.send(result);
        })))?;

        rx.await
            .map_err(|_| ClientError::internal("response callback dropped without a result"))?
    }

    /// Send a typed request and await a typed response.
    pub async fn request<R, T>(&self, request: &R) -> ClientResult<T>
    where
        R: Serialize,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let response = self.send_async(payload).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Close the socket without reconnecting. The client can be connected
    /// again later.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Close, drop every listener, fail everything pending, and stop the
    /// controller. Irreversible.
    pub fn destroy(&self) {
        self.hub.unregister_all();
        let _ = self.commands.send(Command::Destroy);
    }

    /// Register `listener` for `kind` and return it for later comparison.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> Listener
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.hub.register(kind, Arc::clone(&listener));
        listener
    }

    /// Register an existing listener. Registering the same one twice is a
    /// no-op.
    pub fn add_listener(&self, kind: EventKind, listener: Listener) {
        self.hub.register(kind, listener);
    }

    /// Register by event name (`open`, `close`, `message`, `error`).
    pub fn on_named<F>(&self, name: &str, listener: F) -> ClientResult<Listener>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let kind: EventKind = name.parse()?;
        Ok(self.on(kind, listener))
    }

    /// Register a listener that runs at most once.
    pub fn once<F>(&self, kind: EventKind, listener: F) -> Listener
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.hub.register_once(kind, Arc::clone(&listener));
        listener
    }

    /// Remove every listener for `kind`.
    pub fn remove_listener(&self, kind: EventKind) {
        self.hub.unregister(kind);
    }

    pub fn remove_all_listeners(&self) {
        self.hub.unregister_all();
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.hub.listener_count(kind)
    }

    /// Latest connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `target`.
    ///
    /// Fails with [`ClientError::Destroyed`] if the controller stops first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> ClientResult<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Destroyed)
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().is_destroyed() || self.commands.is_closed()
    }

    /// Resolved configuration.
    pub fn config(&self) -> &WsConfig {
        &self.config
    }
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .finish()
    }
}
