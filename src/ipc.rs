//! IPC client for communication with the memory server.
//!
//! This module provides the Rust-side IPC boundary for talking to an smsac
//! memory server over a single WebSocket channel, with many requests in
//! flight at once.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐          WebSocket           ┌─────────────────────┐
//! │   MemoryApi     │  ◄──────────────────────────►│    memory server    │
//! │   (IpcClient)   │    JSON arrays, text frames  │  (game process RAM) │
//! └─────────────────┘                              └─────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Requests are `[id, action, payload]`; responses are `[±id, body]`, where
//! the sign of the id says whether the action succeeded:
//!
//! ```text
//! → [1,"read",{"addr":[2147487744],"type":"TMario"}]
//! ← [1,["0.0","12.5"]]
//! → [2,"getClass",{"addr":[0]}]
//! ← [-2,"invalid addr"]
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use smsac_client::ipc::IpcClient;
//! use serde_json::json;
//!
//! let client = IpcClient::new();
//! client.connect("ws://127.0.0.1:35353/", None).await?;
//! let pid = client.call("init", json!(null)).await?;
//! ```

mod client;
mod connection;
mod framing;
mod registry;

pub use client::{CloseHandler, IpcClient, IpcError, PendingReply};
pub use connection::{ChannelEvent, ChannelEvents, ChannelSender, Connection, ConnectionState};
pub use framing::{decode_response, encode_request, Reply, Response};
pub use registry::PendingRegistry;
