// Event Bus - fan-out of execution progress to any number of observers

use crate::domain::ExecutionEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast bus for [`ExecutionEvent`]s.
///
/// Publishing never blocks the coordinator. A subscriber that falls more than
/// `capacity` events behind receives `RecvError::Lagged` and skips ahead.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ExecutionEvent) {
        if self.tx.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::application::coordinator::constants::DEFAULT_EVENT_BUFFER)
    }
}
