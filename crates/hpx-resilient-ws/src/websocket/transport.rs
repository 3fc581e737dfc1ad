//! Transport seam and the per-connection driver task.
//!
//! A [`Connector`] opens a socket and hands back a [`FrameSink`] and a
//! [`FrameStream`]. Each transport instance gets its own driver task that
//! reports lifecycle events to the controller tagged with the instance's
//! [`ConnectionEpoch`]; events from a released instance are ignored.

use std::{pin::Pin, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt, stream::SplitSink};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, trace, warn};

use super::{
    events::CloseInfo,
    protocol::WsMessage,
    types::{BinaryMode, ConnectionEpoch},
};
use crate::error::{ClientError, ClientResult};

/// How long to wait for the peer's close frame after sending ours.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// An inbound frame as seen by the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A data frame.
    Message(WsMessage),
    /// The peer's close frame.
    Close(CloseInfo),
}

/// Inbound half of a connected socket.
pub type FrameStream = Pin<Box<dyn Stream<Item = ClientResult<Frame>> + Send>>;

/// Outbound half of a connected socket.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one data frame.
    async fn send_frame(&mut self, message: WsMessage) -> ClientResult<()>;

    /// Start the close handshake.
    async fn close(&mut self) -> ClientResult<()>;
}

/// Opens sockets. Implement this to plug in another WebSocket library.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> ClientResult<(Box<dyn FrameSink>, FrameStream)>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

type TungsteniteStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TungsteniteSink {
    inner: SplitSink<TungsteniteStream, Message>,
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_frame(&mut self, message: WsMessage) -> ClientResult<()> {
        let message = match message {
            WsMessage::Text(text) => Message::Text(text.into()),
            WsMessage::Binary(data) => Message::Binary(data),
        };
        self.inner.send(message).await?;
        Ok(())
    }

    async fn close(&mut self) -> ClientResult<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        self.inner.send(Message::Close(Some(frame))).await?;
        Ok(())
    }
}

fn convert_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Message(WsMessage::Text(text.to_string()))),
        Message::Binary(data) => Some(Frame::Message(WsMessage::Binary(data))),
        Message::Close(Some(frame)) => Some(Frame::Close(CloseInfo {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.to_string(),
        })),
        Message::Close(None) => Some(Frame::Close(CloseInfo {
            code: None,
            reason: String::new(),
        })),
        // tungstenite answers pings itself
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> ClientResult<(Box<dyn FrameSink>, FrameStream)> {
        let (ws, response) = connect_async(url).await?;
        debug!(url, status = %response.status(), "WebSocket handshake complete");

        let (sink, stream) = ws.split();
        let stream = stream.filter_map(|item| async move {
            match item {
                Ok(message) => convert_frame(message).map(Ok),
                Err(e) => Some(Err(ClientError::from(e))),
            }
        });

        Ok((Box::new(TungsteniteSink { inner: sink }), Box::pin(stream)))
    }
}

/// Lifecycle notification from a driver task.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    Open,
    Message(WsMessage),
    Error(ClientError),
    Closed(CloseInfo),
}

pub(crate) type EventSender = mpsc::UnboundedSender<(ConnectionEpoch, TransportEvent)>;

#[derive(Debug)]
enum TransportCommand {
    Send(WsMessage),
    SetBinaryMode(BinaryMode),
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadyState {
    Connecting,
    Open,
    Closing,
}

/// The controller's exclusive handle on one transport instance.
///
/// Dropping the handle aborts the driver task, which drops the socket.
#[derive(Debug)]
pub(crate) struct TransportHandle {
    epoch: ConnectionEpoch,
    commands: mpsc::UnboundedSender<TransportCommand>,
    ready: ReadyState,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    pub(crate) fn spawn(
        connector: Arc<dyn Connector>,
        url: String,
        epoch: ConnectionEpoch,
        binary_mode: BinaryMode,
        events: EventSender,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(
            connector,
            url,
            epoch,
            binary_mode,
            command_rx,
            events,
        ));
        Self {
            epoch,
            commands,
            ready: ReadyState::Connecting,
            task: Some(task),
        }
    }

    pub(crate) fn epoch(&self) -> ConnectionEpoch {
        self.epoch
    }

    pub(crate) fn ready_state(&self) -> ReadyState {
        self.ready
    }

    pub(crate) fn is_open(&self) -> bool {
        self.ready == ReadyState::Open
    }

    pub(crate) fn mark_open(&mut self) {
        if self.ready == ReadyState::Connecting {
            self.ready = ReadyState::Open;
        }
    }

    /// Queue a frame for the driver.
    pub(crate) fn send(&self, message: WsMessage) -> ClientResult<()> {
        self.commands
            .send(TransportCommand::Send(message))
            .map_err(|_| ClientError::NotConnected)
    }

    pub(crate) fn set_binary_mode(&self, mode: BinaryMode) {
        let _ = self.commands.send(TransportCommand::SetBinaryMode(mode));
    }

    /// Ask the driver to close; a `Closed` event follows.
    pub(crate) fn close(&mut self) {
        if self.ready != ReadyState::Closing {
            self.ready = ReadyState::Closing;
            let _ = self.commands.send(TransportCommand::Close);
        }
    }

    /// Close and let the driver finish the handshake on its own.
    pub(crate) fn detach(mut self) {
        self.close();
        self.task.take();
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn apply_binary_mode(message: WsMessage, mode: BinaryMode) -> WsMessage {
    match (mode, message) {
        (BinaryMode::Utf8, WsMessage::Binary(data)) => match std::str::from_utf8(&data) {
            Ok(text) => WsMessage::Text(text.to_string()),
            Err(_) => WsMessage::Binary(data),
        },
        (_, message) => message,
    }
}

async fn drive(
    connector: Arc<dyn Connector>,
    url: String,
    epoch: ConnectionEpoch,
    mut binary_mode: BinaryMode,
    mut commands: mpsc::UnboundedReceiver<TransportCommand>,
    events: EventSender,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send((epoch, event));
    };

    let mut connecting = connector.connect(&url);
    let (mut sink, mut stream) = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok(pair) => break pair,
                Err(e) => {
                    debug!(%epoch, error = %e, "Connect failed");
                    let reason = e.to_string();
                    emit(TransportEvent::Error(e));
                    emit(TransportEvent::Closed(CloseInfo::abnormal(reason)));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(TransportCommand::SetBinaryMode(mode)) => binary_mode = mode,
                Some(TransportCommand::Send(_)) => {
                    trace!(%epoch, "Dropping frame queued before open");
                }
                Some(TransportCommand::Close) | None => {
                    emit(TransportEvent::Closed(CloseInfo::abnormal("closed before open")));
                    return;
                }
            },
        }
    };
    drop(connecting);

    emit(TransportEvent::Open);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(TransportCommand::Send(message)) => {
                    if let Err(e) = sink.send_frame(message).await {
                        warn!(%epoch, error = %e, "Failed to write frame");
                        emit(TransportEvent::Error(e));
                        emit(TransportEvent::Closed(CloseInfo::abnormal("write failed")));
                        return;
                    }
                }
                Some(TransportCommand::SetBinaryMode(mode)) => binary_mode = mode,
                Some(TransportCommand::Close) | None => {
                    if let Err(e) = sink.close().await {
                        debug!(%epoch, error = %e, "Close frame not sent");
                    }
                    let info = finish_close(&mut stream, binary_mode, &emit).await;
                    emit(TransportEvent::Closed(info));
                    return;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Frame::Message(message))) => {
                    emit(TransportEvent::Message(apply_binary_mode(message, binary_mode)));
                }
                Some(Ok(Frame::Close(info))) => {
                    debug!(%epoch, code = ?info.code, reason = %info.reason, "Peer closed connection");
                    emit(TransportEvent::Closed(info));
                    return;
                }
                Some(Err(e)) => {
                    let reason = e.to_string();
                    emit(TransportEvent::Error(e));
                    emit(TransportEvent::Closed(CloseInfo::abnormal(reason)));
                    return;
                }
                None => {
                    emit(TransportEvent::Closed(CloseInfo::abnormal("connection dropped")));
                    return;
                }
            },
        }
    }
}

/// Read until the peer acknowledges our close, still delivering data frames.
async fn finish_close(
    stream: &mut FrameStream,
    binary_mode: BinaryMode,
    emit: &impl Fn(TransportEvent),
) -> CloseInfo {
    let wait = async {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Frame::Message(message)) => {
                    emit(TransportEvent::Message(apply_binary_mode(message, binary_mode)));
                }
                Ok(Frame::Close(info)) => return info,
                Err(_) => break,
            }
        }
        CloseInfo::normal()
    };

    tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, wait)
        .await
        .unwrap_or_else(|_| CloseInfo::normal())
}
