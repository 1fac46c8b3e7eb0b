//! WebSocket channel ownership and lifecycle.
//!
//! A `Connection` owns at most one open channel. `connect()` replaces any
//! previous channel, and nothing ever reconnects automatically: once a
//! channel closes, requests fail with `NotConnected` until the next
//! `connect()`.
//!
//! Each channel runs two tasks:
//!
//! ```text
//!   IpcClient::request ──► outbound queue ──► writer task ──► socket
//!   socket ──► reader task ──► ChannelEvents ──► dispatcher (IpcClient)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::ipc::client::IpcError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Observable lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// `connect()` has never been called.
    Idle,
    /// A handshake is in progress.
    Connecting,
    /// The current channel is open and accepts requests.
    Open,
    /// The last channel closed or failed to open.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Inbound events of one channel.
///
/// "Opened" is the successful return of `connect()` and "error before open"
/// is its `Err`, so only the post-open transitions travel on the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A text frame arrived.
    Message(String),
    /// The channel closed. Delivered once, and nothing follows it.
    Closed,
}

/// Event stream of a single channel, tagged with its generation.
pub struct ChannelEvents {
    generation: u64,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl ChannelEvents {
    /// Generation number of the channel these events belong to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Receive the next event, or `None` once `Closed` has been consumed.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }
}

/// Send half of the current channel.
#[derive(Clone)]
pub struct ChannelSender {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
}

impl ChannelSender {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a text frame. Fails only if the writer task has stopped.
    pub fn send(&self, frame: String) -> Result<(), IpcError> {
        self.outbound
            .send(frame)
            .map_err(|_| IpcError::NotConnected)
    }
}

struct Slot {
    state: ConnectionState,
    channel: Option<ChannelSender>,
}

/// Owner of the duplex channel to the memory server.
pub struct Connection {
    slot: Arc<Mutex<Slot>>,
    generations: AtomicU64,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Create a connection with no channel.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                state: ConnectionState::Idle,
                channel: None,
            })),
            generations: AtomicU64::new(0),
        }
    }

    /// Open a new channel to `url`, replacing any previous one.
    ///
    /// `protocol` is offered as the `Sec-WebSocket-Protocol` header.
    ///
    /// # Errors
    ///
    /// - `IpcError::InvalidRequest` if the URL or protocol cannot form a
    ///   handshake request
    /// - `IpcError::ConnectionFailed` if the handshake fails
    pub async fn connect(
        &self,
        url: &str,
        protocol: Option<&str>,
    ) -> Result<ChannelEvents, IpcError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| IpcError::InvalidRequest(format!("{}: {}", url, e)))?;
        if let Some(protocol) = protocol {
            let value = HeaderValue::from_str(protocol).map_err(|e| {
                IpcError::InvalidRequest(format!("protocol {:?}: {}", protocol, e))
            })?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut slot = self.lock();
            // Dropping the previous sender stops its writer, which closes the socket.
            if slot.channel.take().is_some() {
                debug!(generation, "Replacing previous channel");
            }
            slot.state = ConnectionState::Connecting;
        }

        let socket = match connect_async(request).await {
            Ok((socket, _response)) => socket,
            Err(e) => {
                let mut slot = self.lock();
                if self.generations.load(Ordering::Relaxed) == generation {
                    slot.state = ConnectionState::Closed;
                }
                return Err(IpcError::ConnectionFailed(e));
            }
        };

        info!(url, generation, "Connected to memory server");

        let (sink, stream) = socket.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        {
            let mut slot = self.lock();
            slot.channel = Some(ChannelSender {
                generation,
                outbound: outbound_tx,
            });
            slot.state = ConnectionState::Open;
        }

        tokio::spawn(write_loop(sink, outbound_rx, generation));
        tokio::spawn(read_loop(stream, event_tx, Arc::clone(&self.slot), generation));

        Ok(ChannelEvents {
            generation,
            rx: event_rx,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Send half of the open channel, or `None` when disconnected.
    pub fn sender(&self) -> Option<ChannelSender> {
        let slot = self.lock();
        match (&slot.state, &slot.channel) {
            (ConnectionState::Open, Some(channel)) if !channel.outbound.is_closed() => {
                Some(channel.clone())
            }
            _ => None,
        }
    }

    /// Close the current channel.
    ///
    /// Requests fail with `NotConnected` from this point on. The close
    /// notification still fires once the socket finishes closing.
    pub fn close(&self) {
        let mut slot = self.lock();
        if let Some(channel) = slot.channel.take() {
            debug!(generation = channel.generation, "Closing channel");
            slot.state = ConnectionState::Closed;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drain the outbound queue into the socket, then close it.
async fn write_loop(
    mut sink: SplitSink<Socket, Message>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    generation: u64,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(Message::text(frame)).await {
            warn!(generation, "Failed to send frame: {}", e);
            return;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(generation, "Error while closing channel: {}", e);
    }
}

/// Forward text frames as events until the socket closes.
async fn read_loop(
    mut stream: SplitStream<Socket>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    slot: Arc<Mutex<Slot>>,
    generation: u64,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let _ = events.send(ChannelEvent::Message(text.as_str().to_owned()));
            }
            Ok(Message::Close(frame)) => {
                debug!(generation, ?frame, "Server closed channel");
                break;
            }
            // Binary frames have no meaning in this protocol.
            Ok(_) => {}
            Err(e) => {
                warn!(generation, "Channel read error: {}", e);
                break;
            }
        }
    }

    {
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let is_current = slot
            .channel
            .as_ref()
            .is_some_and(|channel| channel.generation == generation);
        if is_current {
            slot.channel = None;
            slot.state = ConnectionState::Closed;
        }
    }

    info!(generation, "Channel closed");
    let _ = events.send(ChannelEvent::Closed);
}
