//! smsac client library
//!
//! This library provides the client side of the smsac memory server
//! protocol:
//!
//! - `ipc` - WebSocket connection and request/response multiplexing
//! - `api` - Typed memory operations (read, write, getClass, getManagers, ...)
//! - `models` - Managers, managees, field descriptors, build versions
//! - `graph` - Lazily expanded manager → managee tree
//! - `watch` - Throttled live refresh of an object's fields
//! - `addr` / `codec` - Pointer-chain addresses and hex byte payloads
//!
//! # Usage
//!
//! ```ignore
//! use smsac_client::{api::MemoryApi, ipc::IpcClient};
//!
//! let api = MemoryApi::new(IpcClient::with_close_handler(|| {
//!     eprintln!("Disconnected from server");
//! }));
//! api.client().connect("ws://127.0.0.1:35353/", None).await?;
//! let pid = api.init().await?;
//! let values = api.read(0x8040_A6E8u32, "TMario").await?;
//! ```

pub mod addr;
pub mod api;
pub mod codec;
pub mod config;
pub mod graph;
pub mod ipc;
pub mod models;
pub mod watch;

pub use addr::Address;
pub use api::MemoryApi;
pub use ipc::{IpcClient, IpcError};
