//! API models for the operator endpoints.
//!
//! - `POST /tasks` accepts an [`EnqueueRequest`] and answers with [`EnqueueResponse`]
//! - `GET /tasks` returns a [`TaskListResponse`]
//! - `GET /tasks/{id}` returns a single [`TaskSnapshot`]
//!
//! ```json
//! { "url": "https://example.com/files/report.pdf", "org": "acme" }
//! ```

use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;
use crate::task::{TaskId, TaskSnapshot};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnqueueRequest {
    pub url: String,
    #[serde(default)]
    pub org: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnqueueResponse {
    pub id: TaskId,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskSnapshot>,
    pub queue_depth: usize,
    pub active_downloads: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub workers: usize,
    pub accepting: bool,
    pub metrics: MetricsSnapshot,
    pub version: &'static str,
}
