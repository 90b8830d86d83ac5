//! `api` crate: HTTP surface over the workflow orchestrator.
//!
//! Exposes:
//!   POST   /api/v1/templates
//!   GET    /api/v1/templates/:id
//!   POST   /api/v1/instances
//!   GET    /api/v1/instances/:id
//!   POST   /api/v1/instances/:id/activate
//!   POST   /api/v1/instances/:id/actions
//!   GET    /api/v1/instances/:id/actions?include_internal=true
//!   GET    /api/v1/inbox/:actor_id

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use engine::WorkflowOrchestrator;

pub mod error;
pub mod handlers;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<WorkflowOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<WorkflowOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

pub fn router(state: AppState) -> Router {
    use handlers::{inbox, instances, templates};

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/v1/templates", post(templates::create))
        .route("/api/v1/templates/:id", get(templates::get))
        .route("/api/v1/instances", post(instances::create))
        .route("/api/v1/instances/:id", get(instances::get))
        .route("/api/v1/instances/:id/activate", post(instances::activate))
        .route(
            "/api/v1/instances/:id/actions",
            post(instances::take_action).get(instances::list_actions),
        )
        .route("/api/v1/inbox/:actor_id", get(inbox::list))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: &str, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
