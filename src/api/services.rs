use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use super::{
    error::ApiError,
    models::{EnqueueRequest, EnqueueResponse, HealthResponse, TaskListResponse},
    state::AppState,
};
use crate::task::TaskId;

/// Task ingestion endpoint (POST /tasks)
///
/// Only emptiness is checked here; a malformed URL is accepted and fails
/// later in the worker, exactly like a URL passed to `Dispatcher::enqueue`.
/// Returns 202 Accepted with the task id.
pub async fn enqueue_task(
    State(state): State<AppState>,
    payload: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let url = request.url.trim();
    if url.is_empty() {
        return Err(ApiError::InvalidPayload("url must not be empty".into()));
    }

    let org = request.org.filter(|org| !org.is_empty());
    let id = state
        .dispatcher
        .enqueue_for(url, org)
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { id })))
}

/// Task status endpoint (GET /tasks/{id})
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state
        .dispatcher
        .status(TaskId(id))
        .ok_or_else(|| ApiError::NotFound(format!("task {id}")))?;

    Ok(Json(snapshot))
}

/// All tasks plus queue gauges (GET /tasks)
pub async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    let dispatcher = &state.dispatcher;

    Json(TaskListResponse {
        tasks: dispatcher.tasks(),
        queue_depth: dispatcher.queue_depth(),
        active_downloads: dispatcher.active_downloads(),
    })
}

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let accepting = !state.dispatcher.is_closed();

    let response = HealthResponse {
        status: if accepting { "healthy" } else { "draining" },
        workers: state.workers,
        accepting,
        metrics: state.dispatcher.metrics().snapshot(),
        version: env!("CARGO_PKG_VERSION"),
    };

    (StatusCode::OK, Json(response))
}
