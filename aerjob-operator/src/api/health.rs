//! Health Check API Handler
//!
//! Reports whether the operator can reach its object store.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::api::AppState;

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_jobs().await {
        Ok(jobs) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "jobs": jobs.len() })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
        }
    }
}
