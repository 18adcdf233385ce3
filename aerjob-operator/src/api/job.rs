//! Job API Handlers
//!
//! HTTP endpoints for submitting and inspecting jobs.

use aerjob_core::domain::job::Job;
use aerjob_core::dto::job::CreateJob;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::job_service;

/// POST /api/jobs
/// Submit a new job
pub async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    tracing::info!("Submitting job: {}", req.name);

    let job = job_service::submit_job(state.store.as_ref(), &state.trigger, req).await?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/jobs
/// List all jobs
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<Job>>> {
    tracing::debug!("Listing all jobs");

    let jobs = job_service::list_jobs(state.store.as_ref()).await?;

    Ok(Json(jobs))
}

/// GET /api/jobs/{name}
/// Get a job with its current status
pub async fn get_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}", name);

    let job = job_service::get_job(state.store.as_ref(), &name).await?;

    Ok(Json(job))
}

/// DELETE /api/jobs/{name}
/// Delete a job and its workers
pub async fn delete_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting job: {}", name);

    job_service::delete_job(state.store.as_ref(), &name).await?;

    Ok(StatusCode::NO_CONTENT)
}
