use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lingocast_models::{ChannelState, EventDecodeError, InboundEvent, InitiationMessage};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BACKEND_URL: &str = "ws://localhost:8000/ws-ott";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Audio events carry whole base64 clips; leave generous headroom.
const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint of the translation backend.
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BACKEND_URL.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("could not reach backend at {endpoint}: {message}")]
    Connect { endpoint: String, message: String },
    #[error("timed out after {0:?} connecting to backend")]
    ConnectTimeout(Duration),
    #[error("failed to encode initiation message: {0}")]
    Encode(String),
    #[error("failed to send initiation message: {0}")]
    Send(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("channel was already opened")]
    AlreadyOpened,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called or the event receiver went away.
    Local,
    /// The backend closed the connection.
    Remote { code: Option<u16>, reason: String },
    /// The connection failed; an `Error` event precedes this one.
    Failed,
}

/// Everything the channel reports to its owner, in order.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Opened,
    Event(InboundEvent),
    Error(ChannelError),
    Closed(CloseReason),
}

/// The long-lived connection to the translation backend for one session.
///
/// `Idle -> Connecting -> Open -> Closed`. A channel is opened at most once;
/// a new session builds a new channel.
pub struct SessionChannel {
    config: ChannelConfig,
    state: Arc<watch::Sender<ChannelState>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);
        Self {
            config,
            state: Arc::new(state),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Connect in the background and announce `init` once the handshake
    /// completes. Inbound traffic is delivered on the returned receiver.
    pub fn open(
        &mut self,
        init: InitiationMessage,
    ) -> Result<mpsc::UnboundedReceiver<ChannelEvent>, ChannelError> {
        if self.state() != ChannelState::Idle {
            return Err(ChannelError::AlreadyOpened);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.send_replace(ChannelState::Connecting);
        tracing::info!(endpoint = %self.config.endpoint, lang = %init.lang, "opening session channel");

        self.task = Some(tokio::spawn(run_channel(
            self.config.clone(),
            init,
            self.state.clone(),
            self.cancel.clone(),
            tx,
        )));
        Ok(rx)
    }

    /// Tear the channel down. Calling this more than once is harmless.
    pub fn close(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        let previous = self.state.send_replace(ChannelState::Closed);
        if previous != ChannelState::Closed {
            tracing::info!(from = ?previous, "session channel closed locally");
        }
        // The task sends a close frame on cancellation; don't wait for it.
        self.task.take();
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn connect(config: &ChannelConfig) -> Result<BackendSocket, ChannelError> {
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(config.max_message_size))
        .max_frame_size(Some(config.max_message_size));

    let connect_fut =
        tokio_tungstenite::connect_async_with_config(config.endpoint.as_str(), Some(ws_config), false);
    match tokio::time::timeout(config.connect_timeout, connect_fut).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(ChannelError::Connect {
            endpoint: config.endpoint.clone(),
            message: e.to_string(),
        }),
        Err(_) => Err(ChannelError::ConnectTimeout(config.connect_timeout)),
    }
}

fn finish(
    state: &watch::Sender<ChannelState>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    reason: CloseReason,
) {
    state.send_replace(ChannelState::Closed);
    let _ = events.send(ChannelEvent::Closed(reason));
}

fn fail(
    state: &watch::Sender<ChannelState>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    error: ChannelError,
) {
    tracing::warn!(%error, "session channel failed");
    let _ = events.send(ChannelEvent::Error(error));
    finish(state, events, CloseReason::Failed);
}

async fn run_channel(
    config: ChannelConfig,
    init: InitiationMessage,
    state: Arc<watch::Sender<ChannelState>>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            finish(&state, &events, CloseReason::Local);
            return;
        }
        result = connect(&config) => result,
    };
    let mut socket = match connected {
        Ok(socket) => socket,
        Err(e) => {
            fail(&state, &events, e);
            return;
        }
    };

    // close() may have landed while the handshake finished.
    if cancel.is_cancelled() {
        let _ = socket.close(None).await;
        finish(&state, &events, CloseReason::Local);
        return;
    }
    let opened = state.send_if_modified(|current| {
        if *current == ChannelState::Connecting {
            *current = ChannelState::Open;
            true
        } else {
            false
        }
    });
    if !opened {
        let _ = socket.close(None).await;
        finish(&state, &events, CloseReason::Local);
        return;
    }
    let _ = events.send(ChannelEvent::Opened);

    let payload = match init.to_json() {
        Ok(payload) => payload,
        Err(e) => {
            let _ = socket.close(None).await;
            fail(&state, &events, ChannelError::Encode(e.to_string()));
            return;
        }
    };
    if cancel.is_cancelled() {
        let _ = socket.close(None).await;
        finish(&state, &events, CloseReason::Local);
        return;
    }
    if let Err(e) = socket.send(Message::text(payload)).await {
        fail(&state, &events, ChannelError::Send(e.to_string()));
        return;
    }
    tracing::debug!(url = %init.url, "initiation message sent");

    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = socket.close(None).await;
                finish(&state, &events, CloseReason::Local);
                return;
            }
            msg = socket.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => match InboundEvent::decode(text.as_str()) {
                Ok(event) => {
                    tracing::debug!(kind = event.kind(), "inbound event");
                    if events.send(ChannelEvent::Event(event)).is_err() {
                        tracing::debug!("event receiver dropped, closing channel");
                        let _ = socket.close(None).await;
                        finish(&state, &events, CloseReason::Local);
                        return;
                    }
                }
                Err(EventDecodeError::UnknownKind) => {
                    tracing::debug!("ignoring event with unrecognised kind");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "discarding malformed message");
                }
            },
            Some(Ok(Message::Binary(data))) => {
                tracing::debug!(len = data.len(), "ignoring binary frame");
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = match frame {
                    Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                    None => (None, String::new()),
                };
                tracing::info!(?code, %reason, "backend closed session channel");
                finish(&state, &events, CloseReason::Remote { code, reason });
                return;
            }
            // Ping/pong are answered by tungstenite itself.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                fail(&state, &events, ChannelError::Transport(e.to_string()));
                return;
            }
            None => {
                tracing::info!("backend dropped session channel");
                finish(
                    &state,
                    &events,
                    CloseReason::Remote {
                        code: None,
                        reason: "connection closed".into(),
                    },
                );
                return;
            }
        }
    }
}
