use tokio::sync::broadcast;

use crate::types::BatchEvent;

/// Fans batch progress out to any number of listeners.
///
/// A listener that falls more than `capacity` events behind loses the
/// oldest ones; publishing never waits on a listener.
pub struct EventBus {
    tx: broadcast::Sender<BatchEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        // broadcast::channel rejects a zero capacity
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: BatchEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Batch event dropped, no listeners");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.tx.subscribe()
    }

    pub fn has_listeners(&self) -> bool {
        self.tx.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
