//! Throttled live refresh of an object's field values.
//!
//! `FieldWatcher::view()` fetches the target's field list and spawns a task
//! that issues one `read` per tick, at most once per refresh interval
//! (33 ms by default, roughly one per rendered frame). Each result is
//! published on a `tokio::sync::watch` channel, so slow consumers only ever
//! see the latest snapshot. Viewing another target, calling `cancel()`, or
//! dropping the handle stops the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::api::MemoryApi;
use crate::ipc::IpcError;
use crate::models::{FieldDescriptor, Managee, Manager};

/// Default refresh period between reads.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(33);

/// An object whose fields are being watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub addr: u32,
    pub type_name: String,
}

impl WatchTarget {
    pub fn new(addr: u32, type_name: impl Into<String>) -> Self {
        Self {
            addr,
            type_name: type_name.into(),
        }
    }

    /// Target for a managee, or `None` if its type could not be resolved.
    pub fn from_managee(managee: &Managee) -> Option<Self> {
        managee
            .type_name
            .as_ref()
            .map(|type_name| Self::new(managee.addr, type_name.clone()))
    }
}

impl From<&Manager> for WatchTarget {
    fn from(manager: &Manager) -> Self {
        Self::new(manager.addr, manager.type_name.clone())
    }
}

/// Latest state of a watched object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    /// No read has completed yet.
    Pending,
    /// One value per field, aligned with the field list.
    Values(Vec<Option<String>>),
    /// The address did not resolve on the last read.
    Unresolved,
    /// A read failed; the watch has stopped.
    Failed(String),
}

/// A running watch. Dropping it stops the refresh task.
pub struct WatchHandle {
    target: WatchTarget,
    fields: Vec<FieldDescriptor>,
    state: watch::Receiver<WatchState>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Field descriptors, in the order values are reported.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// A receiver for state updates.
    pub fn subscribe(&self) -> watch::Receiver<WatchState> {
        self.state.clone()
    }

    /// The most recent state.
    pub fn latest(&self) -> WatchState {
        self.state.borrow().clone()
    }

    /// Whether the refresh task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Drives live refresh for one target at a time.
pub struct FieldWatcher {
    api: Arc<MemoryApi>,
    interval: Duration,
    active: Option<WatchHandle>,
}

impl FieldWatcher {
    pub fn new(api: Arc<MemoryApi>) -> Self {
        Self::with_interval(api, DEFAULT_REFRESH_INTERVAL)
    }

    /// Use a custom refresh period. Zero falls back to the default.
    pub fn with_interval(api: Arc<MemoryApi>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_REFRESH_INTERVAL
        } else {
            interval
        };
        Self {
            api,
            interval,
            active: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start watching `target`, cancelling any previous watch.
    ///
    /// Types without fields get a handle but no refresh task.
    pub async fn view(&mut self, target: WatchTarget) -> Result<&WatchHandle, IpcError> {
        self.cancel();

        let fields = self.api.get_fields(&target.type_name).await?;
        let (tx, rx) = watch::channel(WatchState::Pending);

        let task = if fields.is_empty() {
            debug!(type_name = %target.type_name, "Type has no fields; not refreshing");
            None
        } else {
            Some(tokio::spawn(refresh_loop(
                Arc::clone(&self.api),
                target.clone(),
                self.interval,
                tx,
            )))
        };

        Ok(self.active.insert(WatchHandle {
            target,
            fields,
            state: rx,
            task,
        }))
    }

    /// Stop the current watch, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            debug!(addr = handle.target.addr, "Cancelled watch");
        }
    }

    pub fn active(&self) -> Option<&WatchHandle> {
        self.active.as_ref()
    }

    /// Reload the server's type database and re-view the current target,
    /// since its field list may have changed.
    pub async fn reload(&mut self) -> Result<(), IpcError> {
        self.api.reload().await?;
        if let Some(target) = self.active.as_ref().map(|handle| handle.target.clone()) {
            self.view(target).await?;
        }
        Ok(())
    }
}

async fn refresh_loop(
    api: Arc<MemoryApi>,
    target: WatchTarget,
    period: Duration,
    tx: watch::Sender<WatchState>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let state = match api.read(target.addr, target.type_name.as_str()).await {
            Ok(Some(value)) => WatchState::Values(value.into_values()),
            Ok(None) => WatchState::Unresolved,
            Err(e) => {
                warn!(addr = target.addr, "Stopping watch: {}", e);
                let _ = tx.send(WatchState::Failed(e.to_string()));
                return;
            }
        };
        if tx.send(state).is_err() {
            return;
        }
    }
}
