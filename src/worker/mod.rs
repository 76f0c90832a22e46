//! Download workers
//!
//! A fixed pool of loops pulls tasks from the shared queue and hands each
//! one to the [`runner::FetchExecutor`], which performs a single GET and
//! streams the body to disk.

pub mod http;
pub mod pool;
pub mod runner;

pub use http::HttpClient;
pub use pool::WorkerPool;
pub use runner::FetchExecutor;

use std::path::PathBuf;
use thiserror::Error;

use crate::auth::AuthError;
use crate::task::TransitionError;

/// Per-task failure; always ends up as the task's error message
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("response has no body")]
    EmptyBody,

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("body length mismatch: declared {declared} bytes, received {received}")]
    LengthMismatch { declared: u64, received: u64 },

    #[error("task state error: {0}")]
    State(#[from] TransitionError),
}

impl FetchError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_builder() {
            FetchError::InvalidUrl(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Faults raised while wiring the pool, before any task runs
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot build HTTP client: {0}")]
    HttpClient(FetchError),

    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ValidationError),
}
