use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{
    services::{enqueue_task, get_task, health, list_tasks},
    state::AppState,
};
use crate::queue::Dispatcher;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Operator routes over a running dispatcher
pub fn router(dispatcher: Arc<Dispatcher>, workers: usize) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks).post(enqueue_task))
        .route("/tasks/{id}", get(get_task))
        .route("/health", get(health))
        .with_state(AppState::new(dispatcher, workers))
        .layer(TraceLayer::new_for_http())
}

/// Serve the operator API until Ctrl+C / SIGTERM
pub async fn run(address: SocketAddr, dispatcher: Arc<Dispatcher>, workers: usize) -> Result<(), AnyError> {
    let app = router(dispatcher, workers);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "fetchq API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
