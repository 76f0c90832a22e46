//! Progress events published by the executor after every written chunk

use serde::Serialize;
use tokio::sync::broadcast;

use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    pub downloaded_bytes: u64,
    /// `None` when the server did not declare a length
    pub file_size: Option<u64>,
}

/// Fire-and-forget fan-out of progress events.
///
/// Publishing never waits: with no subscribers the event is dropped, and a
/// subscriber that falls more than `capacity` events behind skips ahead.
#[derive(Debug, Clone)]
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}
