//! Connection controller for WebSocket lifecycle management.
//!
//! The controller runs in a background task and owns every piece of mutable
//! connection state:
//! - the transport handle and the connection state machine
//! - the connect timeout guard and the reconnect timer
//! - the pending request table and the outbound cache
//!
//! [`super::WsClient`] handles talk to it over an unbounded command channel,
//! so calls made from inside event listeners are queued rather than re-entered.

use std::{ops::ControlFlow, sync::Arc};

use serde_json::Value;
use tokio::{
    sync::{mpsc, watch},
    time::{Interval, MissedTickBehavior, interval},
};
use tracing::{debug, error, info, trace, warn};

use super::{
    cache::{CachedMessage, Drain, OutboundCache},
    config::WsConfig,
    events::{CloseInfo, Event, EventHub},
    pending::{PendingRequestTable, ResponseCallback},
    protocol::{Envelope, Payload, WsMessage},
    timer::TimerSlot,
    transport::{Connector, ReadyState, TransportEvent, TransportHandle},
    types::{BinaryMode, ConnectionEpoch, ConnectionState},
};
use crate::{
    error::ClientError,
    reconnect::ReconnectPolicy,
};

/// Commands sent from the client API to the controller.
pub(crate) enum Command {
    Connect,
    SetBinaryMode(BinaryMode),
    Send {
        payload: Payload,
        callback: Option<ResponseCallback>,
    },
    Close,
    Destroy,
}

pub(crate) struct ConnectionController {
    config: Arc<WsConfig>,
    connector: Arc<dyn Connector>,
    hub: Arc<EventHub>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<(ConnectionEpoch, TransportEvent)>,
    events_rx: mpsc::UnboundedReceiver<(ConnectionEpoch, TransportEvent)>,
    state: watch::Sender<ConnectionState>,
    transport: Option<TransportHandle>,
    epoch: ConnectionEpoch,
    binary_mode: BinaryMode,
    policy: ReconnectPolicy,
    pending: PendingRequestTable,
    cache: OutboundCache,
    drain: Option<Drain>,
    connect_guard: TimerSlot,
    reconnect_timer: TimerSlot,
    user_closed: bool,
}

impl ConnectionController {
    pub(crate) fn new(
        config: Arc<WsConfig>,
        connector: Arc<dyn Connector>,
        hub: Arc<EventHub>,
        commands: mpsc::UnboundedReceiver<Command>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            policy: ReconnectPolicy::new(&config),
            cache: OutboundCache::new(config.max_cached_messages),
            binary_mode: config.binary_mode,
            config,
            connector,
            hub,
            commands,
            events_tx,
            events_rx,
            state,
            transport: None,
            epoch: ConnectionEpoch(0),
            pending: PendingRequestTable::new(),
            drain: None,
            connect_guard: TimerSlot::default(),
            reconnect_timer: TimerSlot::default(),
            user_closed: false,
        }
    }

    /// Main loop. Returns once the client is destroyed or every handle is
    /// dropped.
    pub(crate) async fn run(mut self) {
        let mut sweep = self.config.request_timeout.map(|_| {
            let mut sweep = interval(self.config.pending_sweep_interval);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
            sweep
        });

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("All client handles dropped; destroying controller");
                        self.destroy();
                        break;
                    }
                },
                Some((epoch, event)) = self.events_rx.recv() => {
                    self.handle_transport_event(epoch, event);
                }
                () = self.connect_guard.fired() => self.on_connect_timeout(),
                () = self.reconnect_timer.fired() => self.on_reconnect_timer(),
                item = next_drain_item(&mut self.drain) => self.on_drain_item(item),
                () = next_sweep(&mut sweep) => self.expire_pending(),
            }
        }

        self.reject_queued_commands();
        debug!("Connection controller stopped");
    }

    /// Close the command channel and fail sends that were queued behind the
    /// command that stopped the controller.
    fn reject_queued_commands(&mut self) {
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Send {
                callback: Some(callback),
                ..
            } = command
            {
                callback(Err(ClientError::NotConnected));
            }
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Connection state changed");
        }
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect => self.connect(),
            Command::SetBinaryMode(mode) => self.set_binary_mode(mode),
            Command::Send { payload, callback } => self.send(payload, callback),
            Command::Close => self.close(),
            Command::Destroy => {
                self.destroy();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn connect(&mut self) {
        self.user_closed = false;

        match self.transport.as_ref().map(TransportHandle::ready_state) {
            Some(ReadyState::Connecting | ReadyState::Open) => {
                debug!("connect() ignored; a transport is already active");
                return;
            }
            Some(ReadyState::Closing) => {
                debug!("Releasing closing transport before reconnecting");
                self.transport = None;
            }
            None => {}
        }

        self.reconnect_timer.cancel();
        self.open_transport();
    }

    fn open_transport(&mut self) {
        self.epoch = self.epoch.next();
        info!(url = %self.config.url, epoch = %self.epoch, "Connecting to WebSocket");

        self.transport = Some(TransportHandle::spawn(
            Arc::clone(&self.connector),
            self.config.url.clone(),
            self.epoch,
            self.binary_mode,
            self.events_tx.clone(),
        ));
        self.connect_guard.arm(self.config.connect_timeout);
        self.set_state(ConnectionState::Connecting);
    }

    fn set_binary_mode(&mut self, mode: BinaryMode) {
        match self.transport.as_ref() {
            Some(transport) => {
                transport.set_binary_mode(mode);
                self.binary_mode = mode;
            }
            None => trace!(?mode, "set_binary_mode ignored without a transport"),
        }
    }

    fn send(&mut self, payload: Payload, callback: Option<ResponseCallback>) {
        if self.config.cache_when_disconnected && self.transport.is_none() {
            self.enqueue(CachedMessage::new(payload, callback));
            return;
        }

        let Some(transport) = self.transport.as_ref().filter(|t| t.is_open()) else {
            debug!("Send rejected; transport not open");
            if let Some(callback) = callback {
                callback(Err(ClientError::NotConnected));
            }
            return;
        };

        match payload {
            Payload::Text(text) => {
                // raw text is never correlated; its callback is dropped
                drop(callback);
                if let Err(e) = transport.send(WsMessage::Text(text)) {
                    warn!(error = %e, "Failed to queue text frame");
                }
            }
            Payload::Json(object) => {
                let envelope = Envelope::new(object);
                let wire = match envelope.encode(&self.config.correlation_field) {
                    Ok(wire) => wire,
                    Err(e) => {
                        if let Some(callback) = callback {
                            callback(Err(e));
                        }
                        return;
                    }
                };

                if let Some(callback) = callback {
                    self.pending.register(envelope.key.clone(), callback);
                }
                trace!(key = %envelope.key, "Sending correlated frame");
                if let Err(e) = transport.send(WsMessage::Text(wire)) {
                    self.pending.resolve(&envelope.key, Err(e));
                }
            }
        }
    }

    fn enqueue(&mut self, item: CachedMessage) {
        if let Some(evicted) = self.cache.push(item) {
            debug!(capacity = self.cache.capacity(), "Outbound cache full; dropped oldest message");
            self.fail_cached(evicted, || ClientError::CacheEvicted {
                capacity: self.cache.capacity(),
            });
        } else {
            trace!(cached = self.cache.len(), "Message cached while disconnected");
        }
    }

    fn fail_cached(&self, item: CachedMessage, error: impl FnOnce() -> ClientError) {
        if let Some(callback) = item.callback {
            callback(Err(error()));
        }
    }

    fn start_drain(&mut self) {
        if self.drain.is_some() || self.cache.is_empty() {
            return;
        }
        debug!(count = self.cache.len(), "Replaying cached messages");
        self.drain = Some(self.cache.drain_in_order(self.config.cache_drain_interval));
    }

    fn stop_drain(&mut self) {
        let Some(drain) = self.drain.take() else {
            return;
        };
        let capacity = self.cache.capacity();
        for evicted in self.cache.requeue_front(drain.into_remaining()) {
            self.fail_cached(evicted, || ClientError::CacheEvicted { capacity });
        }
    }

    fn on_drain_item(&mut self, item: Option<CachedMessage>) {
        match item {
            Some(item) => self.send(item.payload, item.callback),
            None => {
                self.drain = None;
                if self.transport.as_ref().is_some_and(TransportHandle::is_open) {
                    self.start_drain();
                }
            }
        }
    }

    fn handle_transport_event(&mut self, epoch: ConnectionEpoch, event: TransportEvent) {
        if self.transport.as_ref().map(TransportHandle::epoch) != Some(epoch) {
            trace!(%epoch, "Ignoring event from released transport");
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(message) => self.on_message(message),
            TransportEvent::Error(e) => {
                warn!(error = %e, "WebSocket error");
                self.hub.fire(&Event::Error(e));
            }
            TransportEvent::Closed(info) => self.on_close(info),
        }
    }

    fn on_open(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if transport.ready_state() != ReadyState::Connecting {
            // close() raced the handshake; the Closed event follows
            return;
        }
        transport.mark_open();
        self.connect_guard.cancel();
        self.policy.reset();
        self.set_state(ConnectionState::Open);
        info!(url = %self.config.url, "WebSocket connected");

        self.hub.fire(&Event::Open);
        self.start_drain();
    }

    fn on_message(&mut self, message: WsMessage) {
        self.hub.fire(&Event::Message(message.clone()));

        let Some(text) = message.as_text() else {
            return;
        };

        match Envelope::decode(text, &self.config.correlation_field) {
            Ok(Some(envelope)) => {
                let open = self.transport.as_ref().is_some_and(TransportHandle::is_open);
                let result = if open {
                    Ok(Value::Object(envelope.payload))
                } else {
                    Err(ClientError::ConnectionNotOpen)
                };
                if !self.pending.resolve(&envelope.key, result) {
                    trace!(key = %envelope.key, "No pending request for inbound key");
                }
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Inbound frame is not structured"),
        }
    }

    fn on_close(&mut self, info: CloseInfo) {
        self.connect_guard.cancel();
        self.transport = None;
        self.stop_drain();
        info!(code = ?info.code, reason = %info.reason, "WebSocket closed");

        self.hub.fire(&Event::Close(info));

        if self.user_closed || !self.config.reconnect {
            self.set_state(ConnectionState::Idle);
        } else {
            self.schedule_reconnect();
        }
    }

    fn on_connect_timeout(&mut self) {
        let connecting = self
            .transport
            .as_ref()
            .is_some_and(|t| t.ready_state() == ReadyState::Connecting);
        if self.user_closed || !connecting {
            return;
        }

        let timeout = self.config.connect_timeout;
        warn!(url = %self.config.url, ?timeout, "Connection attempt timed out");
        self.transport = None;
        self.hub.fire(&Event::Error(ClientError::connect_timeout(timeout)));

        if self.config.reconnect {
            self.schedule_reconnect();
        } else {
            self.set_state(ConnectionState::Idle);
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_timer.is_armed() {
            debug!("Reconnect already scheduled");
            return;
        }
        if self
            .transport
            .as_ref()
            .is_some_and(|t| t.ready_state() != ReadyState::Closing)
        {
            debug!("Reconnect skipped; a transport is already active");
            return;
        }

        if !self.policy.should_retry() {
            let attempts = self.policy.attempt();
            error!(attempts, "Reconnection attempts exhausted");
            self.set_state(ConnectionState::Idle);
            self.hub
                .fire(&Event::Error(ClientError::ReconnectExhausted { attempts }));
            return;
        }

        let attempt = self.policy.attempt() + 1;
        let delay = self.policy.next_delay();
        info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        self.reconnect_timer.arm(delay);
        self.set_state(ConnectionState::Reconnecting);
    }

    fn on_reconnect_timer(&mut self) {
        if self.user_closed || self.current_state().is_destroyed() {
            return;
        }
        self.open_transport();
    }

    fn expire_pending(&mut self) {
        let Some(timeout) = self.config.request_timeout else {
            return;
        };
        let expired = self.pending.expire(timeout);
        if expired > 0 {
            debug!(expired, "Expired pending requests");
        }
    }

    fn close(&mut self) {
        self.user_closed = true;
        self.connect_guard.cancel();
        self.reconnect_timer.cancel();
        self.stop_drain();

        match self.transport.as_mut() {
            Some(transport) => {
                info!("Closing WebSocket");
                transport.close();
                self.set_state(ConnectionState::Closing);
            }
            None => self.set_state(ConnectionState::Idle),
        }
    }

    fn destroy(&mut self) {
        self.user_closed = true;
        self.connect_guard.cancel();
        self.reconnect_timer.cancel();
        self.stop_drain();
        self.hub.unregister_all();

        if let Some(transport) = self.transport.take() {
            transport.detach();
        }

        self.pending.fail_all(|| ClientError::Destroyed);
        for item in self.cache.take_all() {
            self.fail_cached(item, || ClientError::Destroyed);
        }

        self.set_state(ConnectionState::Destroyed);
        info!("WebSocket client destroyed");
    }
}

async fn next_drain_item(drain: &mut Option<Drain>) -> Option<CachedMessage> {
    match drain {
        Some(drain) => drain.next().await,
        None => std::future::pending().await,
    }
}

async fn next_sweep(sweep: &mut Option<Interval>) {
    match sweep {
        Some(sweep) => {
            sweep.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::time::{Instant, sleep};

    use super::*;
    use crate::{
        error::ClientResult,
        websocket::{
            WsClient,
            mock::{Behavior, MockConnector, MockPeer},
            types::EventKind,
        },
    };

    fn config() -> WsConfig {
        WsConfig::new("ws://mock.test/socket")
            .connect_timeout(Duration::from_secs(5))
            .reconnect_interval(Duration::from_secs(1))
            .reconnect_max_interval(Duration::from_secs(10))
    }

    async fn next_peer(peers: &mut mpsc::UnboundedReceiver<MockPeer>) -> MockPeer {
        peers.recv().await.expect("connection accepted")
    }

    type Outcomes = Arc<Mutex<Vec<ClientResult<Value>>>>;

    fn capture(outcomes: &Outcomes) -> ResponseCallback {
        let outcomes = Arc::clone(outcomes);
        Box::new(move |result| outcomes.lock().push(result))
    }

    fn errors(client: &WsClient) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on(EventKind::Error, move |event| {
            if let Event::Error(e) = event {
                sink.lock().push(e.to_string());
            }
        });
        seen
    }

    fn gaps(attempts: &[Instant]) -> Vec<Duration> {
        attempts.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_resets_backoff_between_cycles() {
        let (connector, mut peers) = MockConnector::accepting();
        let client = WsClient::new(config(), connector.clone()).expect("client");

        client.connect().expect("connect");
        for _ in 0..3 {
            let peer = next_peer(&mut peers).await;
            client
                .wait_for_state(ConnectionState::Open)
                .await
                .expect("open");
            peer.close(1001);
            client
                .wait_for_state(ConnectionState::Reconnecting)
                .await
                .expect("reconnecting");
        }
        let _peer = next_peer(&mut peers).await;

        assert_eq!(
            gaps(&connector.attempts()),
            vec![Duration::from_secs(1); 3]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_attempts_back_off_then_reset() {
        let (connector, mut peers) = MockConnector::scripted(
            [Behavior::Refuse, Behavior::Refuse, Behavior::Accept],
            Behavior::Accept,
        );
        let client = WsClient::new(config(), connector.clone()).expect("client");
        let errors = errors(&client);

        client.connect().expect("connect");
        let peer = next_peer(&mut peers).await;
        client
            .wait_for_state(ConnectionState::Open)
            .await
            .expect("open");
        assert_eq!(errors.lock().len(), 2);

        peer.close(1006);
        let _peer = next_peer(&mut peers).await;

        assert_eq!(
            gaps(&connector.attempts()),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(1),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_resolves_only_matching_callback() {
        let (connector, mut peers) = MockConnector::accepting();
        let client = WsClient::new(config(), connector).expect("client");
        client.connect().expect("connect");
        let mut peer = next_peer(&mut peers).await;
        client
            .wait_for_state(ConnectionState::Open)
            .await
            .expect("open");

        let first: Outcomes = Arc::default();
        let second: Outcomes = Arc::default();
        client
            .send_with_callback(json!({"text": "hi"}), capture(&first))
            .expect("send");
        client
            .send_with_callback(json!({"text": "other"}), capture(&second))
            .expect("send");

        let request = peer.recv_json().await;
        assert_eq!(request["text"], "hi");
        let key = request["message_id"].as_str().expect("key").to_string();
        let _other = peer.recv_json().await;

        peer.send_text(json!({"message_id": key, "reply": "hello"}).to_string());
        sleep(Duration::from_millis(10)).await;

        let first = first.lock();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].as_ref().expect("response")["reply"], "hello");
        assert!(second.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_keeps_newest_and_replays_in_order() {
        let (connector, mut peers) = MockConnector::accepting();
        let config = config()
            .cache_when_disconnected(true)
            .max_cached_messages(2)
            .cache_drain_interval(Duration::from_millis(100));
        let client = WsClient::new(config, connector).expect("client");

        let evicted: Outcomes = Arc::default();
        client
            .send_with_callback(json!({"n": 1}), capture(&evicted))
            .expect("send");
        client.send(json!({"n": 2})).expect("send");
        client.send(json!({"n": 3})).expect("send");
        sleep(Duration::from_millis(1)).await;
        assert!(matches!(
            evicted.lock().as_slice(),
            [Err(ClientError::CacheEvicted { capacity: 2 })]
        ));

        client.connect().expect("connect");
        let mut peer = next_peer(&mut peers).await;

        let first = peer.recv_json().await;
        let first_at = Instant::now();
        let second = peer.recv_json().await;

        assert_eq!(first["n"], 2);
        assert_eq!(second["n"], 3);
        assert_eq!(Instant::now() - first_at, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_does_not_reconnect() {
        let (connector, mut peers) = MockConnector::accepting();
        let client = WsClient::new(config(), connector.clone()).expect("client");
        client.connect().expect("connect");
        let _peer = next_peer(&mut peers).await;
        client
            .wait_for_state(ConnectionState::Open)
            .await
            .expect("open");

        client.close();
        client
            .wait_for_state(ConnectionState::Idle)
            .await
            .expect("idle");
        sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.attempts().len(), 1);
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_rejects_sends_and_stays_dead() {
        let (connector, mut peers) = MockConnector::accepting();
        let client = WsClient::new(config(), connector.clone()).expect("client");
        client.connect().expect("connect");
        let peer = next_peer(&mut peers).await;
        client
            .wait_for_state(ConnectionState::Open)
            .await
            .expect("open");

        client.destroy();
        client
            .wait_for_state(ConnectionState::Destroyed)
            .await
            .expect("destroyed");
        peer.close(1006);

        let outcome: Outcomes = Arc::default();
        client
            .send_with_callback(json!({"late": true}), capture(&outcome))
            .expect("send");
        assert!(matches!(
            outcome.lock().as_slice(),
            [Err(ClientError::NotConnected)]
        ));

        assert!(matches!(client.connect(), Err(ClientError::Destroyed)));
        sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts().len(), 1);
        assert_eq!(client.listener_count(EventKind::Open), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_queued_right_after_destroy_fails_not_connected() {
        let (connector, mut peers) = MockConnector::accepting();
        let client = WsClient::new(config(), connector).expect("client");
        client.connect().expect("connect");
        let _peer = next_peer(&mut peers).await;
        client
            .wait_for_state(ConnectionState::Open)
            .await
            .expect("open");

        let outcome: Outcomes = Arc::default();
        client.destroy();
        client
            .send_with_callback(json!({"late": true}), capture(&outcome))
            .expect("send");
        let reply = client.send_async(json!({"later": true})).await;

        assert!(matches!(reply, Err(ClientError::NotConnected)));
        assert!(matches!(
            outcome.lock().as_slice(),
            [Err(ClientError::NotConnected)]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_send_never_invokes_callback() {
        let (connector, mut peers) = MockConnector::accepting();
        let client = WsClient::new(config(), connector).expect("client");
        client.connect().expect("connect");
        let mut peer = next_peer(&mut peers).await;
        client
            .wait_for_state(ConnectionState::Open)
            .await
            .expect("open");

        let outcome: Outcomes = Arc::default();
        client
            .send_with_callback("ping", capture(&outcome))
            .expect("send");

        assert_eq!(peer.recv().await, Some(WsMessage::text("ping")));
        peer.send_text(r#"{"message_id": "whatever"}"#);
        sleep(Duration::from_secs(1)).await;
        assert!(outcome.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_before_connect_fails_without_cache() {
        let (connector, _peers) = MockConnector::accepting();
        let client = WsClient::new(config(), connector).expect("client");

        let outcome: Outcomes = Arc::default();
        client
            .send_with_callback(json!({"a": 1}), capture(&outcome))
            .expect("send");
        sleep(Duration::from_millis(1)).await;

        assert!(matches!(
            outcome.lock().as_slice(),
            [Err(ClientError::NotConnected)]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_emits_error_and_retries() {
        let (connector, mut peers) =
            MockConnector::scripted([Behavior::Hang], Behavior::Accept);
        let client = WsClient::new(config(), connector.clone()).expect("client");
        let errors = errors(&client);

        client.connect().expect("connect");
        let _peer = next_peer(&mut peers).await;

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("timed out"), "{errors:?}");
        assert_eq!(
            gaps(&connector.attempts()),
            vec![Duration::from_secs(5) + Duration::from_secs(1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reconnects_surface_as_error() {
        let (connector, _peers) = MockConnector::scripted([], Behavior::Refuse);
        let client = WsClient::new(config().reconnect_max_attempts(2), connector.clone())
            .expect("client");

        let exhausted = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&exhausted);
        client.on(EventKind::Error, move |event| {
            if let Event::Error(ClientError::ReconnectExhausted { attempts }) = event {
                *slot.lock() = Some(*attempts);
            }
        });

        client.connect().expect("connect");
        sleep(Duration::from_secs(30)).await;

        assert_eq!(*exhausted.lock(), Some(2));
        assert_eq!(connector.attempts().len(), 3);
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_racing_close_resolves_as_not_open() {
        let (connector, mut peers) = MockConnector::accepting();
        let client = WsClient::new(config(), connector).expect("client");
        client.connect().expect("connect");
        let mut peer = next_peer(&mut peers).await;
        client
            .wait_for_state(ConnectionState::Open)
            .await
            .expect("open");

        let outcome: Outcomes = Arc::default();
        client
            .send_with_callback(json!({"q": 1}), capture(&outcome))
            .expect("send");
        let request = peer.recv_json().await;

        // response is already in flight when the client starts closing
        peer.send_text(json!({"message_id": request["message_id"]}).to_string());
        client.close();
        client
            .wait_for_state(ConnectionState::Idle)
            .await
            .expect("idle");

        assert!(matches!(
            outcome.lock().as_slice(),
            [Err(ClientError::ConnectionNotOpen)]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_expires_pending() {
        let (connector, mut peers) = MockConnector::accepting();
        let client = WsClient::new(
            config().request_timeout(Duration::from_secs(2)),
            connector,
        )
        .expect("client");
        client.connect().expect("connect");
        let _peer = next_peer(&mut peers).await;
        client
            .wait_for_state(ConnectionState::Open)
            .await
            .expect("open");

        let err = client
            .send_async(json!({"never": "answered"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RequestTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_utf8_binary_mode_correlates_binary_frames() {
        let (connector, mut peers) = MockConnector::accepting();
        let client = WsClient::new(config(), connector).expect("client");
        client.connect().expect("connect");
        let mut peer = next_peer(&mut peers).await;
        client
            .wait_for_state(ConnectionState::Open)
            .await
            .expect("open");
        client.set_binary_mode(BinaryMode::Utf8);

        let outcome: Outcomes = Arc::default();
        client
            .send_with_callback(json!({"q": "bin"}), capture(&outcome))
            .expect("send");
        let request = peer.recv_json().await;
        let reply = json!({"message_id": request["message_id"], "ok": true}).to_string();
        peer.send_binary(reply.into_bytes());
        sleep(Duration::from_millis(10)).await;

        assert_eq!(outcome.lock()[0].as_ref().expect("response")["ok"], true);
    }
}
