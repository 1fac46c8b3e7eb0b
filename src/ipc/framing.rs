//! Request/response frames for the memory server protocol.
//!
//! Each WebSocket text frame carries exactly one JSON array.
//!
//! # Wire Format
//!
//! ```text
//! request:  [id, action, payload]     id > 0, payload may be null
//! response: [signed_id, body]         +id = success, -id = failure
//! ```
//!
//! The sign of the response id is the only success/failure discriminator.
//! It is decoded into a [`Reply`] here so nothing downstream ever looks at a
//! signed id.

use serde_json::Value;

use crate::ipc::client::IpcError;

/// Outcome of a request, decoded from the sign of the response id.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Positive id: the action succeeded and `body` is its result.
    Success(Value),
    /// Negative id: the action failed and `body` is the server's error value.
    Failure(Value),
}

/// A decoded response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Absolute request id this response settles.
    pub id: u64,
    /// Tagged outcome.
    pub reply: Reply,
}

/// Serialize a request frame `[id, action, payload]`.
///
/// # Errors
///
/// Returns `IpcError::Protocol` if the payload cannot be serialized.
///
/// # Example
///
/// ```ignore
/// let frame = encode_request(1, "getClass", &json!({"addr": [2147487744]}))?;
/// assert_eq!(frame, r#"[1,"getClass",{"addr":[2147487744]}]"#);
/// ```
pub fn encode_request(id: u64, action: &str, payload: &Value) -> Result<String, IpcError> {
    serde_json::to_string(&(id, action, payload))
        .map_err(|e| IpcError::Protocol(format!("Failed to serialize request: {}", e)))
}

/// Parse a response frame `[signed_id, body]`.
///
/// # Errors
///
/// Returns `IpcError::Protocol` if:
/// - The text is not valid JSON
/// - The JSON is not a two-element array with an integer id
/// - The id is zero
pub fn decode_response(text: &str) -> Result<Response, IpcError> {
    let (signed_id, body): (i64, Value) = serde_json::from_str(text)
        .map_err(|e| IpcError::Protocol(format!("Failed to parse response: {}", e)))?;

    let reply = match signed_id {
        0 => return Err(IpcError::Protocol("Response id must be non-zero".to_string())),
        id if id > 0 => Reply::Success(body),
        _ => Reply::Failure(body),
    };

    Ok(Response {
        id: signed_id.unsigned_abs(),
        reply,
    })
}
