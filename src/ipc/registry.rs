//! Registry of in-flight requests awaiting a response.
//!
//! Flow:
//! 1. `IpcClient::request` allocates an id and calls `insert()` to get a
//!    oneshot receiver
//! 2. The request frame is queued on the channel
//! 3. The dispatcher decodes a response frame and calls `settle()`
//! 4. When a channel closes, `fail_generation()` drops every entry sent on
//!    it, which the waiting futures observe as `IpcError::Disconnected`,
//!    and marks the generation closed so a request that raced the close is
//!    refused by `insert()` instead of waiting forever

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::debug;

use crate::ipc::client::IpcError;
use crate::ipc::framing::Reply;

/// A request waiting for its response.
struct PendingRequest {
    /// Completion handle, consumed exactly once
    sender: oneshot::Sender<Reply>,
    /// Channel generation the request was sent on
    generation: u64,
    /// Action name (for logging)
    action: String,
    /// When the request was issued
    issued_at: Instant,
}

/// Maps outstanding request ids to their completion handles.
///
/// Entries are inserted when a request is sent and removed when its response
/// arrives, whatever the outcome. A second response for the same id finds no
/// entry and is dropped.
#[derive(Default)]
pub struct PendingRegistry {
    pending: HashMap<u64, PendingRequest>,
    /// Generations already swept by `fail_generation`
    closed: HashSet<u64>,
}

impl PendingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request and get a receiver for its reply.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::NotConnected` if `generation` has already closed.
    pub fn insert(
        &mut self,
        id: u64,
        generation: u64,
        action: &str,
    ) -> Result<oneshot::Receiver<Reply>, IpcError> {
        if self.closed.contains(&generation) {
            debug!(id, generation, action, "Refusing request on closed channel");
            return Err(IpcError::NotConnected);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingRequest {
                sender: tx,
                generation,
                action: action.to_string(),
                issued_at: Instant::now(),
            },
        );
        Ok(rx)
    }

    /// Complete the request registered under `id`.
    ///
    /// Returns true if a pending entry was found and removed.
    pub fn settle(&mut self, id: u64, reply: Reply) -> bool {
        let Some(pending) = self.pending.remove(&id) else {
            debug!(id, "Dropping response for unknown request id");
            return false;
        };

        let succeeded = matches!(reply, Reply::Success(_));
        if pending.sender.send(reply).is_err() {
            // Caller dropped its future; nothing left to notify.
            debug!(id, action = %pending.action, "Response receiver already dropped");
        } else {
            debug!(
                id,
                action = %pending.action,
                succeeded,
                elapsed_ms = u64::try_from(pending.issued_at.elapsed().as_millis())
                    .unwrap_or(u64::MAX),
                "Settled request"
            );
        }
        true
    }

    /// Remove an entry without settling it (its receiver sees a disconnect).
    pub fn remove(&mut self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Drop every request sent on channel `generation` and refuse any
    /// later `insert()` for it.
    ///
    /// Returns the number of requests removed.
    pub fn fail_generation(&mut self, generation: u64) -> usize {
        self.closed.insert(generation);
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.generation != generation);
        before - self.pending.len()
    }

    /// Whether channel `generation` has been swept.
    pub fn is_closed(&self, generation: u64) -> bool {
        self.closed.contains(&generation)
    }

    /// Whether `id` is still awaiting a response.
    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no requests are outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settle_delivers_reply_and_removes_entry() {
        let mut registry = PendingRegistry::new();
        let mut rx = registry.insert(1, 1, "read").unwrap();
        assert!(registry.contains(1));

        assert!(registry.settle(1, Reply::Success(json!("0.0"))));
        assert!(!registry.contains(1));
        assert_eq!(rx.try_recv().unwrap(), Reply::Success(json!("0.0")));
    }

    #[test]
    fn test_second_response_for_same_id_is_ignored() {
        let mut registry = PendingRegistry::new();
        let _rx = registry.insert(4, 1, "getClass").unwrap();

        assert!(registry.settle(4, Reply::Failure(json!("bad address"))));
        assert!(!registry.settle(4, Reply::Success(json!("TMario"))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_settle_unknown_id() {
        let mut registry = PendingRegistry::new();
        assert!(!registry.settle(99, Reply::Success(json!(null))));
    }

    #[test]
    fn test_settle_after_receiver_dropped_still_removes() {
        let mut registry = PendingRegistry::new();
        drop(registry.insert(2, 1, "read").unwrap());
        assert!(registry.settle(2, Reply::Success(json!(true))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_fail_generation_only_drops_that_channel() {
        let mut registry = PendingRegistry::new();
        let mut old = registry.insert(1, 1, "read").unwrap();
        let _new = registry.insert(2, 2, "read").unwrap();

        assert_eq!(registry.fail_generation(1), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(2));
        assert!(matches!(
            old.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn test_remove() {
        let mut registry = PendingRegistry::new();
        let _rx = registry.insert(3, 1, "write").unwrap();
        assert!(registry.remove(3));
        assert!(!registry.remove(3));
    }

    #[test]
    fn test_insert_after_generation_closed_is_refused() {
        let mut registry = PendingRegistry::new();
        // The close sweep can run between a request picking up its channel
        // and registering on it.
        assert_eq!(registry.fail_generation(7), 0);
        assert!(registry.is_closed(7));

        let result = registry.insert(1, 7, "init");
        assert!(matches!(result, Err(IpcError::NotConnected)));
        assert!(registry.is_empty());

        // A newer channel is unaffected.
        assert!(registry.insert(2, 8, "init").is_ok());
        assert!(!registry.is_closed(8));
    }
}
