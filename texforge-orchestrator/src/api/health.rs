//! Health Check API Handler
//!
//! Reports load against the admission ceiling.

use axum::{Json, extract::State};

use crate::state::AppState;
use texforge_core::dto::health::HealthStatus;

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let registry = state.dispatcher.registry();
    Json(HealthStatus::healthy(
        registry.count(),
        registry.max_concurrent(),
        registry.timeout(),
    ))
}
