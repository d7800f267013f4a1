//! Content tree change notifications
//!
//! Installs announce each applied node on a broadcast bus unless the thread
//! runs in a bulk scope that suppresses events. Batches announce their
//! totals once they complete.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Events published while transferring content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TreeEvent {
    /// A node's row and field values were written to the store
    NodeInstalled {
        item_id: Uuid,
        path: String,
        database: String,
    },

    /// A fan-out batch finished
    BatchCompleted {
        operation: BatchOperation,
        succeeded: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOperation {
    Extract,
    Install,
}

/// Broadcast bus for [`TreeEvent`]s
///
/// Lagging subscribers lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TreeEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Receive all events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the case of no subscribers
    pub fn emit_lossy(&self, event: TreeEvent) {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            trace!(?event, "No subscribers for event");
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
