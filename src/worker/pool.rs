//! Fixed-size worker pool
//!
//! The pool size is the concurrency limit: `N` loops, each running at most
//! one download, all pulling from the same [`SharedQueue`]. There is no
//! semaphore to bypass.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::FetchError;
use super::runner::FetchExecutor;
use crate::queue::SharedQueue;
use crate::task::TaskHandle;

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` worker loops (at least one)
    pub fn spawn(size: usize, queue: SharedQueue, executor: Arc<FetchExecutor>) -> Self {
        let size = size.max(1);
        info!(workers = size, "Starting worker pool");

        let workers = (0..size)
            .map(|worker_id| {
                let queue = queue.clone();
                let executor = executor.clone();
                tokio::spawn(worker_loop(worker_id, queue, executor))
            })
            .collect();

        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit. Workers exit once the dispatcher is
    /// closed and the queue is empty.
    pub async fn join(self) {
        for (worker_id, handle) in self.workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker_id, error = %e, "Worker terminated abnormally");
            }
        }
    }

    /// Stop the worker loops. A download already handed to the executor is
    /// detached, not cancelled.
    pub fn abort(&self) {
        for handle in &self.workers {
            handle.abort();
        }
    }
}

async fn worker_loop(worker_id: usize, queue: SharedQueue, executor: Arc<FetchExecutor>) {
    debug!(worker_id, "Worker started");

    while let Some(task) = queue.next().await {
        let task_id = task.id();
        debug!(worker_id, %task_id, "Worker picked up task");
        run_isolated(worker_id, &task, &executor).await;
    }

    debug!(worker_id, "Queue closed, worker exiting");
}

/// Run the executor in its own tokio task so a panic fails only this task.
async fn run_isolated(worker_id: usize, task: &TaskHandle, executor: &Arc<FetchExecutor>) {
    let job = {
        let task = task.clone();
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(&task).await })
    };

    if let Err(e) = job.await {
        error!(worker_id, task_id = %task.id(), error = %e, "Download aborted unexpectedly");
        if !task.status().is_terminal() {
            let reason = FetchError::Transport(format!("worker error: {e}"));
            executor.fail(task, &reason);
        }
    }
}
