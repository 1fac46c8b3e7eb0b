//! Request/response multiplexing over one WebSocket channel.
//!
//! This module provides `IpcClient`, which turns an `(action, payload)` pair
//! into an outbound frame plus a [`PendingReply`] future, and routes inbound
//! frames back to the matching future by id. Any number of requests may be in
//! flight at once and responses may arrive in any order.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite;
use tracing::{debug, warn};

use crate::addr::AddressError;
use crate::codec::HexError;
use crate::ipc::connection::{ChannelEvent, ChannelEvents, Connection, ConnectionState};
use crate::ipc::framing::{decode_response, encode_request, Reply};
use crate::ipc::registry::PendingRegistry;

/// IPC-specific error types.
///
/// These errors provide actionable messages for common failure modes
/// when communicating with the memory server.
#[derive(Debug, Error)]
pub enum IpcError {
    /// A request was issued while no channel is open.
    #[error("Client is not connected to server. Call `connect()` first.")]
    NotConnected,

    /// The WebSocket handshake failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] tungstenite::Error),

    /// The URL or protocol could not be turned into a handshake request.
    #[error("Invalid connection request: {0}")]
    InvalidRequest(String),

    /// The server rejected the request (negative response id).
    #[error("Server error: {0}")]
    Remote(Value),

    /// The channel closed before a response arrived.
    #[error("Disconnected from server before a response arrived")]
    Disconnected,

    /// Protocol-level error (framing, unexpected result shape).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The request address was not a valid pointer chain.
    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),

    /// A hex payload from the server could not be decoded.
    #[error("Invalid hex payload: {0}")]
    Hex(#[from] HexError),
}

impl IpcError {
    /// The server-supplied error value, if the server rejected the request.
    pub fn remote_body(&self) -> Option<&Value> {
        match self {
            IpcError::Remote(body) => Some(body),
            _ => None,
        }
    }
}

/// Callback invoked once per channel close.
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

/// Future for the response to one request.
///
/// Resolves with the success body, `IpcError::Remote` with the failure
/// body, or `IpcError::Disconnected` if the channel closes first.
#[derive(Debug)]
#[must_use = "a request's outcome is only observable by awaiting its reply"]
pub struct PendingReply {
    id: u64,
    rx: oneshot::Receiver<Reply>,
}

impl PendingReply {
    /// Wire id allocated to this request.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for PendingReply {
    type Output = Result<Value, IpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|reply| match reply {
            Ok(Reply::Success(body)) => Ok(body),
            Ok(Reply::Failure(body)) => Err(IpcError::Remote(body)),
            Err(_) => Err(IpcError::Disconnected),
        })
    }
}

/// Multiplexing client for the memory server.
///
/// The client owns one [`Connection`] and the registry of outstanding
/// requests. Request ids start at 1, increase strictly, and are never
/// reused for the lifetime of the client, across reconnects included.
///
/// # Connection Lifecycle
///
/// - `connect()` - Open a channel (replacing any previous one)
/// - `request()` / `call()` - Issue requests while the channel is open
/// - channel close - Outstanding requests fail with `Disconnected`, the
///   close handler runs, and later requests fail with `NotConnected`
///
/// # Example
///
/// ```ignore
/// use smsac_client::ipc::IpcClient;
/// use serde_json::json;
///
/// let client = IpcClient::new();
/// client.connect("ws://127.0.0.1:35353/", None).await?;
///
/// let a = client.request("getClass", json!({"addr": [0x8040A6E8u32]}))?;
/// let b = client.request("getVersion", json!(null))?;
/// let (class, version) = (a.await?, b.await?);
/// ```
pub struct IpcClient {
    connection: Connection,
    registry: Arc<Mutex<PendingRegistry>>,
    /// Next request id to allocate.
    request_id: AtomicU64,
    on_close: Option<CloseHandler>,
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcClient {
    /// Create a disconnected client.
    pub fn new() -> Self {
        Self {
            connection: Connection::new(),
            registry: Arc::new(Mutex::new(PendingRegistry::new())),
            request_id: AtomicU64::new(1),
            on_close: None,
        }
    }

    /// Create a disconnected client that calls `on_close` whenever a
    /// channel closes.
    pub fn with_close_handler<F>(on_close: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            on_close: Some(Arc::new(on_close)),
            ..Self::new()
        }
    }

    /// Open a channel to `url` and start dispatching its responses.
    ///
    /// Resolves once the channel is open.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionFailed` if the channel errors before
    /// opening, or `IpcError::InvalidRequest` for a malformed URL/protocol.
    pub async fn connect(&self, url: &str, protocol: Option<&str>) -> Result<(), IpcError> {
        let events = self.connection.connect(url, protocol).await?;
        tokio::spawn(dispatch_events(
            events,
            Arc::clone(&self.registry),
            self.on_close.clone(),
        ));
        Ok(())
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Whether requests can currently be issued.
    pub fn is_connected(&self) -> bool {
        self.connection.sender().is_some()
    }

    /// Close the current channel.
    pub fn close(&self) {
        self.connection.close();
    }

    /// Issue a request and get a future for its response.
    ///
    /// This method:
    /// 1. Fails immediately if no channel is open
    /// 2. Allocates the next request id
    /// 3. Registers the pending request, unless its channel has already
    ///    been swept by a close
    /// 4. Queues the frame `[id, action, payload]` on the channel
    ///
    /// # Errors
    ///
    /// Returns `IpcError::NotConnected` before any frame is sent if the
    /// client is disconnected or the channel closes while the request is
    /// being registered.
    pub fn request(&self, action: &str, payload: Value) -> Result<PendingReply, IpcError> {
        let channel = self.connection.sender().ok_or(IpcError::NotConnected)?;

        let id = self.next_id();
        let frame = encode_request(id, action, &payload)?;
        let rx = self.lock_registry().insert(id, channel.generation(), action)?;

        if let Err(e) = channel.send(frame) {
            self.lock_registry().remove(id);
            return Err(e);
        }

        debug!(id, action, "Sent request");
        Ok(PendingReply { id, rx })
    }

    /// Issue a request and wait for its response.
    pub async fn call(&self, action: &str, payload: Value) -> Result<Value, IpcError> {
        self.request(action, payload)?.await
    }

    /// Number of requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.lock_registry().len()
    }

    /// Generate the next request ID.
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lock_registry(&self) -> MutexGuard<'_, PendingRegistry> {
        lock(&self.registry)
    }
}

fn lock(registry: &Mutex<PendingRegistry>) -> MutexGuard<'_, PendingRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Route one inbound text frame to its pending request.
///
/// Malformed frames are logged and dropped; responses with no matching
/// request are dropped silently.
pub(crate) fn dispatch(registry: &Mutex<PendingRegistry>, text: &str) {
    match decode_response(text) {
        Ok(response) => {
            lock(registry).settle(response.id, response.reply);
        }
        Err(e) => warn!("Ignoring inbound frame: {} ({})", e, text),
    }
}

/// Consume one channel's events until it closes.
async fn dispatch_events(
    mut events: ChannelEvents,
    registry: Arc<Mutex<PendingRegistry>>,
    on_close: Option<CloseHandler>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Message(text) => dispatch(&registry, &text),
            ChannelEvent::Closed => break,
        }
    }

    let generation = events.generation();
    let failed = lock(&registry).fail_generation(generation);
    if failed > 0 {
        warn!(generation, failed, "Channel closed with requests outstanding");
    }

    if let Some(on_close) = on_close {
        on_close();
    }
}
