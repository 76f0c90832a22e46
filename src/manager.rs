//! Wiring: config → output dir, HTTP client, dispatcher, executor, pool

use std::sync::Arc;
use tracing::{error, info};

use crate::auth::{StaticTokenProvider, TokenProvider};
use crate::config::Config;
use crate::observability::Metrics;
use crate::queue::{Dispatcher, ProgressBus};
use crate::task::TaskSnapshot;
use crate::worker::{FetchExecutor, HttpClient, SetupError, WorkerPool};

/// A running download queue: one dispatcher feeding a fixed worker pool
pub struct DownloadManager {
    dispatcher: Arc<Dispatcher>,
    pool: WorkerPool,
}

impl DownloadManager {
    /// Start with tokens taken from `config.auth`
    pub async fn start(config: &Config) -> Result<Self, SetupError> {
        let tokens = Arc::new(StaticTokenProvider::new(config.auth.tokens.clone()));
        Self::start_with_tokens(config, tokens).await
    }

    /// Start with an external token provider
    pub async fn start_with_tokens(
        config: &Config,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, SetupError> {
        config.validate()?;

        let output_dir = &config.downloads.output_dir;
        if let Err(source) = tokio::fs::create_dir_all(output_dir).await {
            error!(path = %output_dir.display(), error = %source, "Cannot create output directory");
            return Err(SetupError::OutputDir {
                path: output_dir.clone(),
                source,
            });
        }
        info!(path = %output_dir.display(), "Output directory ready");

        let http = HttpClient::new(&config.http).map_err(SetupError::HttpClient)?;
        let metrics = Arc::new(Metrics::new());
        let progress = ProgressBus::new(config.downloads.progress_buffer);

        let (dispatcher, queue) = Dispatcher::new(progress.clone(), metrics.clone());
        let executor = Arc::new(FetchExecutor::new(config, http, tokens, progress, metrics));
        let pool = WorkerPool::spawn(config.downloads.workers, queue, executor);

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            pool,
        })
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Close the queue, let the workers drain it, and return every task
    pub async fn shutdown(self) -> Vec<TaskSnapshot> {
        self.dispatcher.close();
        self.pool.join().await;
        self.dispatcher.tasks()
    }

    /// Stop taking tasks off the queue. Downloads already running are
    /// detached and end with the process.
    pub fn abort(&self) {
        self.dispatcher.close();
        self.pool.abort();
    }
}
