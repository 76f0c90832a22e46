//! Download task entity and its lifecycle state machine
//!
//! A [`Task`] is plain data plus guarded transitions:
//!
//! ```text
//! Queued ──▶ Downloading ──▶ Completed
//!                 │
//!                 └────────▶ Failed
//! ```
//!
//! `Paused` and `Cancelled` are part of the status vocabulary but no
//! transition produces them yet; they are reserved for a future pause/cancel
//! API. Terminal states are permanent.
//!
//! Tasks are shared through a [`TaskHandle`], a `watch` channel with exactly
//! one writer (the worker that dequeued the task) and any number of
//! snapshot readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::humanize::{self, ByteSize};

/// Process-unique task identifier, allocated by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    /// Reserved: no transition leads here yet.
    Paused,
    /// Reserved: no transition leads here yet.
    Cancelled,
}

impl TaskStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "Queued",
            TaskStatus::Downloading => "Downloading",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Paused => "Paused",
            TaskStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Downloading)
                | (TaskStatus::Downloading, TaskStatus::Completed)
                | (TaskStatus::Downloading, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.display_name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("task {id}: illegal transition {from} -> {to}")]
    Illegal {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {id}: {field} already set")]
    AlreadySet { id: TaskId, field: &'static str },

    #[error("task {id}: progress update outside Downloading (status {status})")]
    NotDownloading { id: TaskId, status: TaskStatus },

    #[error("task {id}: byte count went backwards ({current} -> {requested})")]
    Regression {
        id: TaskId,
        current: u64,
        requested: u64,
    },

    #[error("task {id}: {downloaded} bytes exceeds declared size {size}")]
    Overrun { id: TaskId, downloaded: u64, size: u64 },
}

pub type Result<T> = std::result::Result<T, TransitionError>;

/// One URL to download, with its status and progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    id: TaskId,
    url: String,
    org: Option<String>,
    filename: Option<String>,
    file_size: Option<u64>,
    downloaded_bytes: u64,
    status: TaskStatus,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, url: impl Into<String>, org: Option<String>) -> Self {
        Self {
            id,
            url: url.into(),
            org,
            filename: None,
            file_size: None,
            downloaded_bytes: 0,
            status: TaskStatus::Queued,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn org(&self) -> Option<&str> {
        self.org.as_deref()
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Fraction in `[0, 1]`; `None` while the size is unknown or zero.
    pub fn progress(&self) -> Option<f64> {
        if self.status == TaskStatus::Completed {
            return Some(1.0);
        }
        match self.file_size {
            Some(size) if size > 0 => {
                Some((self.downloaded_bytes as f64 / size as f64).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }

    pub fn progress_string(&self) -> String {
        match self.progress() {
            Some(p) => format!("{:.1}%", p * 100.0),
            None => "?".to_string(),
        }
    }

    pub fn formatted_size(&self) -> String {
        match self.file_size {
            Some(size) => ByteSize(size).to_human_readable(),
            None => "unknown".to_string(),
        }
    }

    /// Average speed since the download started
    pub fn formatted_speed(&self) -> String {
        let Some(started) = self.started_at else {
            return "0 B/s".to_string();
        };
        let end = self.completed_at.unwrap_or_else(Utc::now);
        let elapsed = (end - started).to_std().unwrap_or_default();
        humanize::transfer_rate(self.downloaded_bytes, elapsed)
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_started(&mut self) -> Result<()> {
        self.transition(TaskStatus::Downloading)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn set_filename(&mut self, filename: impl Into<String>) -> Result<()> {
        if self.filename.is_some() {
            return Err(TransitionError::AlreadySet {
                id: self.id,
                field: "filename",
            });
        }
        self.filename = Some(filename.into());
        Ok(())
    }

    /// Record the declared content length. Repeating the same value is a no-op.
    pub fn set_file_size(&mut self, size: Option<u64>) -> Result<()> {
        match self.file_size {
            Some(existing) if Some(existing) == size => Ok(()),
            Some(_) => Err(TransitionError::AlreadySet {
                id: self.id,
                field: "file_size",
            }),
            None => {
                self.file_size = size;
                Ok(())
            }
        }
    }

    /// Cumulative byte count after a chunk has been written
    pub fn record_progress(&mut self, downloaded: u64) -> Result<()> {
        if self.status != TaskStatus::Downloading {
            return Err(TransitionError::NotDownloading {
                id: self.id,
                status: self.status,
            });
        }
        if downloaded < self.downloaded_bytes {
            return Err(TransitionError::Regression {
                id: self.id,
                current: self.downloaded_bytes,
                requested: downloaded,
            });
        }
        if let Some(size) = self.file_size
            && downloaded > size
        {
            return Err(TransitionError::Overrun {
                id: self.id,
                downloaded,
                size,
            });
        }
        self.downloaded_bytes = downloaded;
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        if self.file_size.is_none() {
            self.file_size = Some(self.downloaded_bytes);
        }
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        let message = message.into();
        self.error_message = Some(if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message
        });
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            url: self.url.clone(),
            filename: self.filename.clone(),
            file_size: self.file_size,
            downloaded_bytes: self.downloaded_bytes,
            status: self.status,
            error_message: self.error_message.clone(),
            progress: self.progress(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Read-only view handed to status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub url: String,
    pub filename: Option<String>,
    pub file_size: Option<u64>,
    pub downloaded_bytes: u64,
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub progress: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Shared, observable task cell.
///
/// Cloning the handle shares the same task. Only the worker that owns the
/// task should call [`TaskHandle::update`].
#[derive(Debug, Clone)]
pub struct TaskHandle {
    tx: Arc<watch::Sender<Task>>,
}

impl TaskHandle {
    pub fn new(task: Task) -> Self {
        let (tx, _rx) = watch::channel(task);
        Self { tx: Arc::new(tx) }
    }

    pub fn id(&self) -> TaskId {
        self.tx.borrow().id()
    }

    pub fn url(&self) -> String {
        self.tx.borrow().url().to_string()
    }

    pub fn org(&self) -> Option<String> {
        self.tx.borrow().org().map(str::to_owned)
    }

    pub fn status(&self) -> TaskStatus {
        self.tx.borrow().status()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.tx.borrow().snapshot()
    }

    /// Apply a transition; watchers are only notified when it succeeds.
    pub fn update<T>(&self, f: impl FnOnce(&mut Task) -> Result<T>) -> Result<T> {
        let mut outcome = None;
        self.tx.send_if_modified(|task| {
            let mut draft = task.clone();
            let result = f(&mut draft);
            let changed = result.is_ok() && draft != *task;
            if changed {
                *task = draft;
            }
            outcome = Some(result);
            changed
        });
        // send_if_modified always runs the closure
        outcome.unwrap_or_else(|| unreachable!("send_if_modified skipped its closure"))
    }

    pub fn subscribe(&self) -> watch::Receiver<Task> {
        self.tx.subscribe()
    }

    /// Resolve once the task reaches a terminal state
    pub async fn wait_terminal(&self) -> TaskSnapshot {
        let mut rx = self.subscribe();
        match rx.wait_for(|task| task.status().is_terminal()).await {
            Ok(task) => task.snapshot(),
            Err(_) => self.snapshot(),
        }
    }
}
