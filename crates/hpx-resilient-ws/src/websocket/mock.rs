//! Scriptable in-memory connector for controller tests.

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use futures_util::stream;
use parking_lot::Mutex;
use tokio::{sync::mpsc, time::Instant};

use super::{
    events::CloseInfo,
    protocol::WsMessage,
    transport::{Connector, Frame, FrameSink, FrameStream},
};
use crate::error::{ClientError, ClientResult};

/// What the next connection attempt does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Behavior {
    Accept,
    Refuse,
    Hang,
}

pub(crate) struct MockConnector {
    script: Mutex<VecDeque<Behavior>>,
    fallback: Behavior,
    attempts: Mutex<Vec<Instant>>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    /// Attempts follow `script`, then `fallback` forever.
    pub(crate) fn scripted(
        script: impl IntoIterator<Item = Behavior>,
        fallback: Behavior,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            attempts: Mutex::new(Vec::new()),
            peers,
        });
        (connector, peer_rx)
    }

    pub(crate) fn accepting() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        Self::scripted([], Behavior::Accept)
    }

    /// When each connection attempt started.
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> ClientResult<(Box<dyn FrameSink>, FrameStream)> {
        self.attempts.lock().push(Instant::now());
        let behavior = self.script.lock().pop_front().unwrap_or(self.fallback);

        match behavior {
            Behavior::Refuse => Err(ClientError::websocket("connection refused")),
            Behavior::Hang => std::future::pending().await,
            Behavior::Accept => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();

                let _ = self.peers.send(MockPeer {
                    outbound: outbound_rx,
                    inbound: inbound_tx.clone(),
                });

                let sink = MockSink {
                    outbound: outbound_tx,
                    echo: inbound_tx,
                };
                let frames = stream::poll_fn(move |cx| inbound_rx.poll_recv(cx));
                Ok((Box::new(sink), Box::pin(frames)))
            }
        }
    }
}

struct MockSink {
    outbound: mpsc::UnboundedSender<WsMessage>,
    echo: mpsc::UnboundedSender<ClientResult<Frame>>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_frame(&mut self, message: WsMessage) -> ClientResult<()> {
        self.outbound
            .send(message)
            .map_err(|_| ClientError::websocket("peer gone"))
    }

    async fn close(&mut self) -> ClientResult<()> {
        // the peer acknowledges immediately
        let _ = self.echo.send(Ok(Frame::Close(CloseInfo::normal())));
        Ok(())
    }
}

/// The server side of an accepted mock connection.
pub(crate) struct MockPeer {
    outbound: mpsc::UnboundedReceiver<WsMessage>,
    inbound: mpsc::UnboundedSender<ClientResult<Frame>>,
}

impl MockPeer {
    /// Next frame the client wrote.
    pub(crate) async fn recv(&mut self) -> Option<WsMessage> {
        self.outbound.recv().await
    }

    /// Next text frame the client wrote, parsed as JSON.
    pub(crate) async fn recv_json(&mut self) -> serde_json::Value {
        match self.recv().await {
            Some(WsMessage::Text(text)) => serde_json::from_str(&text).expect("json frame"),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    pub(crate) fn send_text(&self, text: impl Into<String>) {
        let _ = self
            .inbound
            .send(Ok(Frame::Message(WsMessage::text(text))));
    }

    pub(crate) fn send_binary(&self, data: impl Into<bytes::Bytes>) {
        let _ = self
            .inbound
            .send(Ok(Frame::Message(WsMessage::binary(data))));
    }

    /// Close from the server side with `code`.
    pub(crate) fn close(&self, code: u16) {
        let _ = self.inbound.send(Ok(Frame::Close(CloseInfo {
            code: Some(code),
            reason: "server closing".to_string(),
        })));
    }
}
