//! Object Store
//!
//! Durable storage for Job and Worker records. The reconciler only ever
//! talks to the store through this trait, so any backend works as long as
//! it offers a conditional (compare-and-swap) status update.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use aerjob_core::domain::job::Job;
use aerjob_core::domain::worker::{Worker, WorkerLaunch, WorkerPhase};
use aerjob_core::error::StoreResult;
use async_trait::async_trait;

/// Storage contract for jobs and their workers
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persists a new job
    ///
    /// Fails with `AlreadyExists` if the name is taken.
    async fn create_job(&self, job: Job) -> StoreResult<Job>;

    /// Fetches a job by name
    async fn get_job(&self, name: &str) -> StoreResult<Job>;

    /// Lists every job
    async fn list_jobs(&self) -> StoreResult<Vec<Job>>;

    /// Writes `job.status` if the stored record is still at `job.resource_version`
    ///
    /// Returns the updated record with its new version, `Conflict` if the
    /// record changed since it was read, or `NotFound` if it was deleted.
    async fn update_status(&self, job: &Job) -> StoreResult<Job>;

    /// Deletes a job and, through the owner link, all of its workers
    async fn delete_job(&self, name: &str) -> StoreResult<()>;

    /// Creates a worker owned by `launch.owner`
    ///
    /// Fails with `AlreadyExists` if a worker of that name exists and with
    /// `NotFound` if the owning job is gone.
    async fn create_worker(&self, launch: WorkerLaunch) -> StoreResult<Worker>;

    /// Fetches a worker by name
    async fn get_worker(&self, name: &str) -> StoreResult<Worker>;

    /// Lists workers, optionally only those owned by the named job
    async fn list_workers(&self, owner: Option<&str>) -> StoreResult<Vec<Worker>>;

    /// Records the phase reported by the worker runtime
    async fn update_worker_phase(&self, name: &str, phase: WorkerPhase) -> StoreResult<Worker>;

    /// Deletes a worker by name
    async fn delete_worker(&self, name: &str) -> StoreResult<()>;
}
