//! Writes deferred until connectivity returns

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::connectivity::{ConnectivityMonitor, ListenerId};

/// A write recorded while it could not be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Caller-defined name of the operation, e.g. `"profile.update"`.
    pub operation: String,
    /// Payload to replay.
    pub data: Value,
    /// When the operation was queued.
    pub queued_at: DateTime<Utc>,
}

/// Ordered list of operations waiting to be synced.
///
/// Clones share the list.
#[derive(Clone, Default)]
pub struct PendingOperations {
    inner: Arc<Mutex<Vec<PendingOperation>>>,
}

impl PendingOperations {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `operation` with its payload.
    pub fn save_for_sync<T>(
        &self,
        operation: impl Into<String>,
        data: &T,
    ) -> Result<(), serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        let entry = PendingOperation {
            operation: operation.into(),
            data: serde_json::to_value(data)?,
            queued_at: Utc::now(),
        };
        debug!(operation = %entry.operation, "operation queued for sync");
        self.inner.lock().push(entry);
        Ok(())
    }

    /// Copy of the queued operations, oldest first.
    pub fn pending(&self) -> Vec<PendingOperation> {
        self.inner.lock().clone()
    }

    /// Take every queued operation, oldest first, leaving the list empty.
    pub fn drain(&self) -> Vec<PendingOperation> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Forget every queued operation.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl fmt::Debug for PendingOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperations")
            .field("len", &self.len())
            .finish()
    }
}

/// Receives the drained operations when connectivity returns.
pub type SyncHandler = Arc<dyn Fn(Vec<PendingOperation>) + Send + Sync>;

/// Hands queued operations to a [`SyncHandler`] on every reconnect.
///
/// Stays attached until dropped.
pub struct SyncOnReconnect {
    monitor: ConnectivityMonitor,
    listener: ListenerId,
}

impl SyncOnReconnect {
    /// Drain `pending` into `handler` each time `monitor` goes back online.
    pub fn attach(
        monitor: &ConnectivityMonitor,
        pending: &PendingOperations,
        handler: SyncHandler,
    ) -> Self {
        let pending = pending.clone();
        let listener = monitor.subscribe(move |online: bool| {
            if !online {
                return;
            }
            let operations = pending.drain();
            if operations.is_empty() {
                return;
            }
            info!(count = operations.len(), "replaying operations queued offline");
            handler(operations);
        });

        Self {
            monitor: monitor.clone(),
            listener,
        }
    }
}

impl Drop for SyncOnReconnect {
    fn drop(&mut self) {
        self.monitor.remove_listener(self.listener);
    }
}

impl fmt::Debug for SyncOnReconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOnReconnect")
            .field("listener", &self.listener)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ManualSignals, Signal};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<Vec<String>>>>, SyncHandler) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let handler: SyncHandler = Arc::new(move |operations: Vec<PendingOperation>| {
            sink.lock()
                .push(operations.into_iter().map(|op| op.operation).collect());
        });
        (batches, handler)
    }

    #[test]
    fn operations_keep_their_order() {
        let pending = PendingOperations::new();
        pending
            .save_for_sync("note.create", &json!({ "title": "a" }))
            .expect("serializable");
        pending.save_for_sync("note.delete", &7u32).expect("serializable");

        let queued = pending.pending();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].operation, "note.create");
        assert_eq!(queued[0].data, json!({ "title": "a" }));
        assert_eq!(queued[1].data, json!(7));

        assert_eq!(pending.drain().len(), 2);
        assert!(pending.is_empty());
    }

    #[test]
    fn reconnect_drains_into_handler() {
        let signals = Arc::new(ManualSignals::new(true));
        let monitor = ConnectivityMonitor::new(signals.clone());
        monitor.init();
        let pending = PendingOperations::new();
        let (batches, handler) = recorder();
        let _sync = SyncOnReconnect::attach(&monitor, &pending, handler);

        signals.emit(Signal::Unreachable);
        pending.save_for_sync("a", &1u8).expect("serializable");
        pending.save_for_sync("b", &2u8).expect("serializable");
        assert!(batches.lock().is_empty());

        signals.emit(Signal::Reachable);
        assert_eq!(*batches.lock(), vec![vec!["a".to_owned(), "b".to_owned()]]);
        assert!(pending.is_empty());

        // Nothing queued, nothing replayed.
        signals.emit(Signal::Unreachable);
        signals.emit(Signal::Reachable);
        assert_eq!(batches.lock().len(), 1);
    }

    #[test]
    fn dropping_the_guard_detaches() {
        let signals = Arc::new(ManualSignals::new(false));
        let monitor = ConnectivityMonitor::new(signals.clone());
        monitor.init();
        let pending = PendingOperations::new();
        let (batches, handler) = recorder();

        drop(SyncOnReconnect::attach(&monitor, &pending, handler));
        assert_eq!(monitor.listener_count(), 0);

        pending.save_for_sync("a", &1u8).expect("serializable");
        signals.emit(Signal::Reachable);
        assert!(batches.lock().is_empty());
        assert_eq!(pending.len(), 1);
    }
}
