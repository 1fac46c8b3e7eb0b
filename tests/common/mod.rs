//! In-process WebSocket server standing in for the memory server.
//!
//! The server accepts connections one after another on `127.0.0.1:0`,
//! forwards every text frame it receives to the test, and sends whatever the
//! test tells it to.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Test timeout to prevent hanging tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

enum Command {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

pub struct MockServer {
    pub url: String,
    frames: mpsc::UnboundedReceiver<String>,
    commands: mpsc::UnboundedSender<Command>,
    protocol: Arc<Mutex<Option<String>>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let url = format!("ws://{}/", listener.local_addr().unwrap());

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (commands_tx, mut commands_rx) = mpsc::unbounded_channel::<Command>();
        let protocol = Arc::new(Mutex::new(None));
        let seen_protocol = Arc::clone(&protocol);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen_protocol = Arc::clone(&seen_protocol);
                // Echo the requested subprotocol so the client handshake accepts it.
                let callback = move |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                    if let Some(value) = req.headers().get("Sec-WebSocket-Protocol") {
                        *seen_protocol.lock().unwrap() = value.to_str().ok().map(str::to_owned);
                        resp.headers_mut()
                            .insert("Sec-WebSocket-Protocol", value.clone());
                    }
                    Ok(resp)
                };
                let Ok(socket) = accept_hdr_async(stream, callback).await else {
                    continue;
                };
                let (mut sink, mut source) = socket.split();

                loop {
                    tokio::select! {
                        msg = source.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                let _ = frames_tx.send(text.as_str().to_owned());
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        },
                        cmd = commands_rx.recv() => match cmd {
                            Some(Command::Text(text)) => {
                                let _ = sink.send(Message::text(text)).await;
                            }
                            Some(Command::Binary(bytes)) => {
                                let _ = sink.send(Message::binary(bytes)).await;
                            }
                            Some(Command::Close) => {
                                let _ = sink.close().await;
                                // Drain until the client acknowledges the close.
                                while let Some(Ok(_)) = source.next().await {}
                                break;
                            }
                            None => return,
                        },
                    }
                }
            }
        });

        Self {
            url,
            frames: frames_rx,
            commands: commands_tx,
            protocol,
        }
    }

    /// Next raw text frame from the client.
    pub async fn next_frame(&mut self) -> String {
        timeout(TEST_TIMEOUT, self.frames.recv())
            .await
            .expect("Test timed out waiting for a frame")
            .expect("Server stopped")
    }

    /// Next request frame, split into `(id, action, payload)`.
    pub async fn next_request(&mut self) -> (u64, String, Value) {
        let frame = self.next_frame().await;
        parse_request(&frame)
    }

    /// Like `next_request`, but `None` once `wait` elapses with no frame.
    pub async fn try_next_request(&mut self, wait: Duration) -> Option<(u64, String, Value)> {
        match timeout(wait, self.frames.recv()).await {
            Ok(Some(frame)) => Some(parse_request(&frame)),
            _ => None,
        }
    }

    /// Frames already received and not yet consumed.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.frames.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    /// Send a success response `[id, body]`.
    pub fn succeed(&self, id: u64, body: Value) {
        self.send_text(&serde_json::json!([id, body]).to_string());
    }

    /// Send a failure response `[-id, body]`.
    pub fn fail(&self, id: u64, body: Value) {
        self.send_text(&serde_json::json!([-(id as i64), body]).to_string());
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.commands.send(Command::Text(text.to_string()));
    }

    pub fn send_binary(&self, bytes: Vec<u8>) {
        let _ = self.commands.send(Command::Binary(bytes));
    }

    /// Close the current connection from the server side.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Subprotocol requested by the most recent client handshake.
    pub fn requested_protocol(&self) -> Option<String> {
        self.protocol.lock().unwrap().clone()
    }
}

fn parse_request(frame: &str) -> (u64, String, Value) {
    serde_json::from_str(frame)
        .unwrap_or_else(|e| panic!("Malformed request frame {}: {}", frame, e))
}

/// Await `fut` with the test timeout.
pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
    timeout(TEST_TIMEOUT, fut).await.expect("Test timed out")
}
