//! Job Service
//!
//! Submission, lookup and deletion of jobs. Everything past submission is
//! the reconciler's business; the service only pokes the controller.

use aerjob_core::domain::job::Job;
use aerjob_core::dto::job::CreateJob;
use aerjob_core::error::StoreError;

use crate::controller::Trigger;
use crate::store::ObjectStore;

/// Longest accepted job name
///
/// Leaves room for the `-worker-<attempt>` suffix of worker names.
pub const MAX_NAME_LEN: usize = 48;

/// Service error type
#[derive(Debug)]
pub enum JobError {
    NotFound(String),
    AlreadyExists(String),
    ValidationError(String),
    StoreError(StoreError),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { name, .. } => JobError::NotFound(name),
            StoreError::AlreadyExists { name, .. } => JobError::AlreadyExists(name),
            other => JobError::StoreError(other),
        }
    }
}

/// Validate and store a new job, then ask the controller to pick it up
pub async fn submit_job(
    store: &dyn ObjectStore,
    trigger: &Trigger,
    req: CreateJob,
) -> Result<Job, JobError> {
    validate_name(&req.name)?;

    if req.spec.worker_image.trim().is_empty() {
        return Err(JobError::ValidationError(
            "spec.workerImage must not be empty".to_string(),
        ));
    }

    let job = store.create_job(Job::from(req)).await?;

    tracing::info!(
        "Job submitted: {} (uid: {}, image: {})",
        job.name,
        job.uid,
        job.spec.worker_image
    );

    trigger.notify(&job.name);

    Ok(job)
}

/// Get a job by name
pub async fn get_job(store: &dyn ObjectStore, name: &str) -> Result<Job, JobError> {
    Ok(store.get_job(name).await?)
}

/// List all jobs
pub async fn list_jobs(store: &dyn ObjectStore) -> Result<Vec<Job>, JobError> {
    Ok(store.list_jobs().await?)
}

/// Delete a job together with its workers
pub async fn delete_job(store: &dyn ObjectStore, name: &str) -> Result<(), JobError> {
    store.delete_job(name).await?;
    tracing::info!("Job deleted: {}", name);
    Ok(())
}

/// Job names become part of worker and container names
fn validate_name(name: &str) -> Result<(), JobError> {
    if name.is_empty() {
        return Err(JobError::ValidationError(
            "Job name must not be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(JobError::ValidationError(format!(
            "Job name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = !name.starts_with('-') && !name.ends_with('-');

    if !valid_chars || !valid_edges {
        return Err(JobError::ValidationError(format!(
            "Invalid job name '{}': use lowercase letters, digits and inner '-'",
            name
        )));
    }

    Ok(())
}
