//! Fetch executor - runs one task from request to Completed/Failed
//!
//! Steps for a task:
//! 1. Queued → Downloading
//! 2. Reserve a collision-free output file and record its name
//! 3. Look up the org's bearer token (if any) and send one GET
//! 4. Record the declared length, then stream the body to disk in slices of
//!    at most `chunk_size`, updating the byte count and publishing a
//!    progress event after each slice
//! 5. Flush → Completed; any error on the way → Failed
//!
//! Partially written files stay on disk after a failure.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, trace, warn};

use super::http::{FetchResponse, HttpClient};
use super::{FetchError, Result};
use crate::auth::TokenProvider;
use crate::config::Config;
use crate::observability::Metrics;
use crate::queue::events::{ProgressBus, ProgressEvent};
use crate::resolver;
use crate::task::{TaskHandle, TaskSnapshot};

pub struct FetchExecutor {
    http: HttpClient,
    tokens: Arc<dyn TokenProvider>,
    output_dir: PathBuf,
    chunk_size: usize,
    write_timeout: Duration,
    progress: ProgressBus,
    metrics: Arc<Metrics>,
}

impl FetchExecutor {
    pub fn new(
        config: &Config,
        http: HttpClient,
        tokens: Arc<dyn TokenProvider>,
        progress: ProgressBus,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            http,
            tokens,
            output_dir: config.downloads.output_dir.clone(),
            chunk_size: config.downloads.chunk_size.as_usize().max(1),
            write_timeout: config.http.write_timeout(),
            progress,
            metrics,
        }
    }

    /// Run a task to a terminal state and return its final snapshot.
    ///
    /// Never fails: every error is recorded on the task itself.
    pub async fn execute(&self, task: &TaskHandle) -> TaskSnapshot {
        let task_id = task.id();

        if let Err(e) = task.update(|t| t.mark_started()) {
            warn!(%task_id, error = %e, "Task not runnable, skipping");
            return task.snapshot();
        }

        info!(%task_id, url = %task.url(), "Starting download");

        match self.download(task).await {
            Ok(bytes) => match task.update(|t| t.mark_completed()) {
                Ok(()) => {
                    self.metrics.task_completed();
                    let snapshot = task.snapshot();
                    info!(
                        %task_id,
                        bytes,
                        file = snapshot.filename.as_deref().unwrap_or_default(),
                        "Download completed"
                    );
                }
                Err(e) => warn!(%task_id, error = %e, "Could not mark task completed"),
            },
            Err(err) => self.fail(task, &err),
        }

        task.snapshot()
    }

    /// Record `err` as the task's failure
    pub fn fail(&self, task: &TaskHandle, err: &FetchError) {
        let task_id = task.id();
        match task.update(|t| t.mark_failed(err.to_string())) {
            Ok(()) => {
                self.metrics.task_failed();
                warn!(%task_id, url = %task.url(), error = %err, "Download failed");
            }
            Err(e) => warn!(%task_id, error = %e, "Could not mark task failed"),
        }
    }

    async fn download(&self, task: &TaskHandle) -> Result<u64> {
        let task_id = task.id();
        let url = task.url();

        let reserved = resolver::resolve(&url, &self.output_dir).await?;
        task.update(|t| t.set_filename(reserved.file_name()))?;
        debug!(%task_id, path = %reserved.path.display(), "Output file reserved");

        let bearer = match task.org() {
            Some(org) => Some(self.tokens.token(&org).await?),
            None => None,
        };

        let FetchResponse {
            content_length,
            response,
            ..
        } = self.http.fetch(&url, bearer.as_deref()).await?;

        task.update(|t| t.set_file_size(content_length))?;
        info!(%task_id, size = ?content_length, path = %reserved.path.display(), "Streaming body");

        let mut file = reserved.file;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::from_reqwest));
        self.stream_to_file(task, &mut file, body, content_length)
            .await
    }

    /// Write `body` into `file`, then flush and compare against the declared
    /// length. The flush also runs when the body fails midway, so the bytes
    /// received so far stay on disk.
    async fn stream_to_file<S>(
        &self,
        task: &TaskHandle,
        file: &mut File,
        body: S,
        content_length: Option<u64>,
    ) -> Result<u64>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let copied = self.copy_chunks(task, file, body, content_length).await;
        let flushed = self.bounded(file.flush()).await;
        let downloaded = copied?;
        flushed?;

        if let Some(declared) = content_length
            && downloaded != declared
        {
            return Err(FetchError::LengthMismatch {
                declared,
                received: downloaded,
            });
        }

        Ok(downloaded)
    }

    async fn copy_chunks<S>(
        &self,
        task: &TaskHandle,
        file: &mut File,
        body: S,
        content_length: Option<u64>,
    ) -> Result<u64>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let task_id = task.id();
        let mut body = pin!(body);
        let mut downloaded: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;

            for piece in chunk.chunks(self.chunk_size) {
                let received = downloaded + piece.len() as u64;
                if let Some(declared) = content_length
                    && received > declared
                {
                    return Err(FetchError::LengthMismatch { declared, received });
                }

                self.write(file, piece).await?;
                downloaded = received;

                task.update(|t| t.record_progress(downloaded))?;
                trace!(%task_id, downloaded, "Chunk written");
                self.metrics.bytes_downloaded(piece.len() as u64);
                self.progress.publish(ProgressEvent {
                    task_id,
                    downloaded_bytes: downloaded,
                    file_size: content_length,
                });
            }
        }

        Ok(downloaded)
    }

    async fn write(&self, file: &mut File, piece: &[u8]) -> Result<()> {
        self.bounded(file.write_all(piece)).await
    }

    async fn bounded<F>(&self, op: F) -> Result<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        match tokio::time::timeout(self.write_timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(FetchError::Io(std::io::Error::new(
                ErrorKind::TimedOut,
                format!("disk write exceeded {:?}", self.write_timeout),
            ))),
        }
    }
}
