//! Typed memory operations on top of [`IpcClient`].
//!
//! Every method is a thin encode/decode wrapper around one server action.
//! Addresses are normalized to pointer chains before encoding and results
//! are decoded into the shapes in [`crate::models`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::addr::Address;
use crate::codec::{decode_hex, encode_hex};
use crate::ipc::{IpcClient, IpcError};
use crate::models::{FieldDescriptor, Managee, Manager, ReadValue, Version};

/// What to read at an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadSpec {
    /// Format every field of a named type (or a primitive type).
    Type(String),
    /// Dump `n` raw bytes as hex.
    Size(usize),
}

impl From<&str> for ReadSpec {
    fn from(type_name: &str) -> Self {
        ReadSpec::Type(type_name.to_string())
    }
}

impl From<String> for ReadSpec {
    fn from(type_name: String) -> Self {
        ReadSpec::Type(type_name)
    }
}

impl From<usize> for ReadSpec {
    fn from(size: usize) -> Self {
        ReadSpec::Size(size)
    }
}

/// Bytes to write at an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePayload {
    /// Already hex-encoded text, sent unchanged.
    Hex(String),
    /// Raw bytes, hex-encoded before sending.
    Bytes(Vec<u8>),
}

impl WritePayload {
    fn into_wire(self) -> String {
        match self {
            WritePayload::Hex(s) => s,
            WritePayload::Bytes(bytes) => encode_hex(&bytes),
        }
    }
}

impl From<&str> for WritePayload {
    fn from(s: &str) -> Self {
        WritePayload::Hex(s.to_string())
    }
}

impl From<String> for WritePayload {
    fn from(s: String) -> Self {
        WritePayload::Hex(s)
    }
}

impl From<Vec<u8>> for WritePayload {
    fn from(bytes: Vec<u8>) -> Self {
        WritePayload::Bytes(bytes)
    }
}

impl From<&[u8]> for WritePayload {
    fn from(bytes: &[u8]) -> Self {
        WritePayload::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for WritePayload {
    fn from(bytes: [u8; N]) -> Self {
        WritePayload::Bytes(bytes.to_vec())
    }
}

#[derive(Serialize)]
struct AddrPayload<'a> {
    addr: &'a [u32],
}

#[derive(Serialize)]
struct ReadPayload<'a> {
    addr: &'a [u32],
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    type_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    addr: &'a [u32],
    payload: String,
}

/// Typed memory introspection API.
///
/// # Example
///
/// ```ignore
/// use smsac_client::{api::MemoryApi, ipc::IpcClient};
///
/// let api = MemoryApi::new(IpcClient::new());
/// api.client().connect("ws://127.0.0.1:35353/", None).await?;
///
/// let version = api.get_version().await?;
/// for manager in api.get_managers().await? {
///     println!("{} {}", manager.label(), manager.type_name);
/// }
/// ```
pub struct MemoryApi {
    client: IpcClient,
}

impl MemoryApi {
    pub fn new(client: IpcClient) -> Self {
        Self { client }
    }

    /// Underlying RPC client (for `connect`, `close`, raw requests).
    pub fn client(&self) -> &IpcClient {
        &self.client
    }

    /// Attach to the target process.
    ///
    /// Returns its process id, or `None` if no target is attached.
    pub async fn init(&self) -> Result<Option<u64>, IpcError> {
        self.call("init", Value::Null).await
    }

    /// Read typed values (or a raw hex dump) at `addr`.
    ///
    /// Returns `None` when the address does not resolve.
    pub async fn read(
        &self,
        addr: impl Into<Address>,
        spec: impl Into<ReadSpec>,
    ) -> Result<Option<ReadValue>, IpcError> {
        let addr = addr.into();
        let spec = spec.into();
        let (type_name, size) = match &spec {
            ReadSpec::Type(name) => (Some(name.as_str()), None),
            ReadSpec::Size(size) => (None, Some(*size)),
        };
        let payload = to_payload(&ReadPayload {
            addr: addr.normalized()?,
            type_name,
            size,
        })?;
        self.call("read", payload).await
    }

    /// Read `size` raw bytes at `addr`.
    ///
    /// Returns `None` if the server reports no value (unmapped address).
    pub async fn read_bytes(
        &self,
        addr: impl Into<Address>,
        size: usize,
    ) -> Result<Option<Vec<u8>>, IpcError> {
        match self.read(addr, ReadSpec::Size(size)).await? {
            None => Ok(None),
            Some(ReadValue::Single(hex)) => Ok(Some(decode_hex(&hex)?)),
            Some(ReadValue::Fields(_)) => Err(IpcError::Protocol(
                "Unexpected read response: expected a hex string".to_string(),
            )),
        }
    }

    /// Read a NUL-terminated string at `addr`.
    pub async fn read_string(&self, addr: impl Into<Address>) -> Result<Option<String>, IpcError> {
        let addr = addr.into();
        let payload = to_payload(&AddrPayload {
            addr: addr.normalized()?,
        })?;
        self.call("readString", payload).await
    }

    /// Write bytes at `addr`. Returns whether the server applied the write.
    pub async fn write(
        &self,
        addr: impl Into<Address>,
        payload: impl Into<WritePayload>,
    ) -> Result<bool, IpcError> {
        let addr = addr.into();
        let payload = to_payload(&WriteRequest {
            addr: addr.normalized()?,
            payload: payload.into().into_wire(),
        })?;
        self.call("write", payload).await
    }

    /// Resolve the dynamic runtime type of the object at `addr`.
    pub async fn get_class(&self, addr: impl Into<Address>) -> Result<Option<String>, IpcError> {
        let addr = addr.into();
        let payload = to_payload(&AddrPayload {
            addr: addr.normalized()?,
        })?;
        self.call("getClass", payload).await
    }

    /// Field descriptors of `type_name`, in declaration order.
    pub async fn get_fields(&self, type_name: &str) -> Result<Vec<FieldDescriptor>, IpcError> {
        self.call("getFields", Value::from(type_name)).await
    }

    /// All managers. An unreadable manager list is reported as empty.
    pub async fn get_managers(&self) -> Result<Vec<Manager>, IpcError> {
        let managers: Option<Vec<Manager>> = self.call("getManagers", Value::Null).await?;
        Ok(managers.unwrap_or_default())
    }

    /// Managees owned by the manager at `manager_addr`, with their indices.
    ///
    /// The server takes the manager address directly, not a pointer chain.
    pub async fn get_managees(&self, manager_addr: u32) -> Result<Vec<Managee>, IpcError> {
        let managees: Option<Vec<Managee>> =
            self.call("getManagees", Value::from(manager_addr)).await?;
        Ok(managees
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, managee)| Managee {
                index: Some(i),
                ..managee
            })
            .collect())
    }

    /// Build identifier of the running game.
    pub async fn get_version(&self) -> Result<Version, IpcError> {
        self.call("getVersion", Value::Null).await
    }

    /// Ask the server to reload its type database.
    pub async fn reload(&self) -> Result<(), IpcError> {
        self.client.call("reload", Value::Null).await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, payload: Value) -> Result<T, IpcError> {
        let body = self.client.call(action, payload).await?;
        decode_body(action, body)
    }
}

fn to_payload<T: Serialize>(payload: &T) -> Result<Value, IpcError> {
    serde_json::to_value(payload)
        .map_err(|e| IpcError::Protocol(format!("Failed to serialize payload: {}", e)))
}

fn decode_body<T: DeserializeOwned>(action: &str, body: Value) -> Result<T, IpcError> {
    serde_json::from_value(body).map_err(|e| {
        debug!(action, "Response body did not match expected shape: {}", e);
        IpcError::Protocol(format!("Unexpected {} response: {}", action, e))
    })
}
