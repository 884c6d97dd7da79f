//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod artifacts;
pub mod compile;
pub mod error;
pub mod health;
pub mod jobs;
pub mod upload;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_size;

    let mut router: Router<AppState> = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Synchronous compilation
        .route("/compile", post(compile::compile))
        // Published artifacts
        .route("/logs/{name}", get(artifacts::get_log))
        .route("/files/{name}", get(artifacts::get_file));

    // Queue front door
    if state.queue.is_some() {
        router = router
            .route("/jobs", post(jobs::submit_job))
            .route("/jobs/{id}", get(jobs::get_job))
            .route("/jobs/{id}/download", get(jobs::download_job));
    }

    // Add state and middleware
    router
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
