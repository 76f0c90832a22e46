use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use super::events::{ProgressBus, ProgressEvent};
use crate::observability::Metrics;
use crate::task::{Task, TaskHandle, TaskId, TaskSnapshot, TaskStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("dispatcher is closed")]
    Closed,
}

/// Dispatcher is the single ingress point for download work
///
/// Flow:
/// 1. Caller invokes `dispatcher.enqueue(url)`
/// 2. Dispatcher allocates the next id (1, 2, 3, ...)
/// 3. The Queued task is pushed onto the shared unbounded FIFO queue
/// 4. The task is registered for status queries
/// 5. Whichever worker is free next pulls it via [`SharedQueue::next`]
///
/// `enqueue` never awaits: the queue is unbounded, and any back-pressure
/// belongs to the caller. After [`Dispatcher::close`] it returns
/// [`EnqueueError::Closed`] and no task is created.
pub struct Dispatcher {
    next_id: AtomicU64,
    sender: Mutex<Option<mpsc::UnboundedSender<TaskHandle>>>,
    registry: RwLock<BTreeMap<TaskId, TaskHandle>>,
    depth: Arc<AtomicUsize>,
    progress: ProgressBus,
    metrics: Arc<Metrics>,
}

/// Consumer side of the queue, shared by every worker in the pool
#[derive(Clone)]
pub struct SharedQueue {
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<TaskHandle>>>,
    depth: Arc<AtomicUsize>,
}

impl SharedQueue {
    /// Wait for the next task in FIFO order.
    ///
    /// Returns `None` once the dispatcher is closed and the queue drained.
    pub async fn next(&self) -> Option<TaskHandle> {
        let task = self.receiver.lock().await.recv().await;
        if task.is_some() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
        }
        task
    }
}

impl Dispatcher {
    /// Create a dispatcher and the queue its workers consume from
    pub fn new(progress: ProgressBus, metrics: Arc<Metrics>) -> (Self, SharedQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));

        let dispatcher = Self {
            next_id: AtomicU64::new(1),
            sender: Mutex::new(Some(tx)),
            registry: RwLock::new(BTreeMap::new()),
            depth: depth.clone(),
            progress,
            metrics,
        };

        let queue = SharedQueue {
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            depth,
        };

        (dispatcher, queue)
    }

    /// Queue an unauthenticated download and return its id
    pub fn enqueue(&self, url: impl Into<String>) -> Result<TaskId, EnqueueError> {
        self.enqueue_for(url, None)
    }

    /// Queue a download whose request carries the org's bearer token.
    ///
    /// The id is allocated under the sender lock, so ids reach the queue in
    /// ascending order even with concurrent callers. Nothing is registered
    /// once the dispatcher is closed.
    pub fn enqueue_for(
        &self,
        url: impl Into<String>,
        org: Option<String>,
    ) -> Result<TaskId, EnqueueError> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = sender.as_ref() else {
            warn!("Queue closed, task rejected");
            return Err(EnqueueError::Closed);
        };

        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = TaskHandle::new(Task::new(id, url, org));

        self.depth.fetch_add(1, Ordering::AcqRel);
        if tx.send(handle.clone()).is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            warn!(task_id = %id, "No worker is consuming the queue, task rejected");
            return Err(EnqueueError::Closed);
        }
        drop(sender);

        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle.clone());
        self.metrics.task_enqueued();

        info!(task_id = %id, url = %handle.url(), "Task queued");
        Ok(id)
    }

    /// Stop accepting work. Workers finish what is queued, then exit.
    pub fn close(&self) {
        let closed = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if closed {
            debug!(pending = self.queue_depth(), "Dispatcher closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn status(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.handle(id).map(|h| h.snapshot())
    }

    pub fn handle(&self, id: TaskId) -> Option<TaskHandle> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// All known tasks, ordered by id
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.handles().iter().map(TaskHandle::snapshot).collect()
    }

    fn handles(&self) -> Vec<TaskHandle> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn watch(&self, id: TaskId) -> Option<watch::Receiver<Task>> {
        self.handle(id).map(|h| h.subscribe())
    }

    /// Tasks published but not yet picked up by a worker
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn active_downloads(&self) -> usize {
        self.handles()
            .iter()
            .filter(|h| h.status() == TaskStatus::Downloading)
            .count()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
