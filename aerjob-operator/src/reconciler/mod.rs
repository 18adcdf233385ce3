//! Reconciler
//!
//! One invocation reads the job, looks at its worker, applies at most one
//! phase transition and says when it wants to be called again. All
//! progress is in the store; an invocation may be repeated, interleaved
//! with another one for the same job, or cut short at any point.

pub mod machine;
pub mod policy;
pub mod ttl;

use aerjob_core::domain::job::{Job, Phase};
use aerjob_core::error::StoreError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::builder::WorkerSpecBuilder;
use crate::store::ObjectStore;
use machine::{Effect, Observation, Step};
use policy::{RequeuePolicy, Tier};
use ttl::Retention;

/// When the reconciler wants to see a job again
///
/// Advisory: the next invocation may come earlier or later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Nothing left to do until something changes
    Done,

    /// Continue right away
    Now,

    After(Duration),
}

/// Why an invocation stopped without finishing
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Another writer updated the job first
    #[error("job {0} was modified concurrently")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Requeue directive for a failed invocation
    ///
    /// Conflicts are re-read immediately; store failures back off.
    pub fn requeue(&self, policy: &RequeuePolicy) -> Requeue {
        match self {
            ReconcileError::Conflict(_) => Requeue::Now,
            ReconcileError::Store(_) => policy.after(Tier::Default),
        }
    }
}

/// Outcome of creating the worker for the current attempt
enum Creation {
    /// This invocation created the worker
    Created(String),

    /// The worker already existed
    Adopted,

    /// The owning job is gone
    OwnerGone,
}

/// Drives jobs through their lifecycle against an object store
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    builder: WorkerSpecBuilder,
    policy: RequeuePolicy,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        builder: WorkerSpecBuilder,
        policy: RequeuePolicy,
    ) -> Self {
        Self {
            store,
            builder,
            policy,
        }
    }

    pub fn policy(&self) -> &RequeuePolicy {
        &self.policy
    }

    /// Reconciles the named job at the current time
    pub async fn reconcile(&self, name: &str) -> Result<Requeue, ReconcileError> {
        self.reconcile_at(name, Utc::now()).await
    }

    /// Reconciles the named job as if the clock read `now`
    pub async fn reconcile_at(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Requeue, ReconcileError> {
        let job = match self.store.get_job(name).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => {
                debug!("Job {} no longer exists", name);
                return Ok(Requeue::Done);
            }
            Err(e) => return Err(e.into()),
        };

        debug!(
            "Reconciling job {} (phase: {}, retries: {})",
            job.name, job.status.phase, job.status.retries
        );

        if job.status.phase.is_terminal() {
            return self.finalize(&job, now).await;
        }

        let deadline_exceeded = policy::deadline_exceeded(&job, now).is_some();
        if job.status.phase == Phase::Pending && !deadline_exceeded {
            self.sweep_superseded(&job).await?;
        }

        let observation = if deadline_exceeded {
            Observation::Missing
        } else {
            self.observe(&job).await?
        };

        let step = machine::step(&job, observation, now, &self.policy);
        self.apply(job, step).await
    }

    /// Looks up the worker the job currently references
    async fn observe(&self, job: &Job) -> Result<Observation, ReconcileError> {
        let Some(worker_ref) = job.status.worker_ref.as_deref() else {
            return Ok(Observation::Missing);
        };

        match self.store.get_worker(worker_ref).await {
            Ok(worker) => Ok(Observation::Found(worker.phase)),
            Err(e) if e.is_not_found() => {
                debug!("Worker {} of job {} not found", worker_ref, job.name);
                Ok(Observation::Missing)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes workers left behind by attempts the job has moved past
    async fn sweep_superseded(&self, job: &Job) -> Result<(), ReconcileError> {
        let workers = self.store.list_workers(Some(&job.name)).await?;
        for worker in workers {
            let superseded = WorkerSpecBuilder::attempt_of(&job.name, &worker.name)
                .is_some_and(|attempt| attempt < job.status.retries);
            if superseded {
                info!(
                    "Removing superseded worker {} of job {}",
                    worker.name, job.name
                );
                self.delete_worker(&worker.name).await?;
            }
        }
        Ok(())
    }

    /// Performs a step: worker creation, status write, worker deletion
    ///
    /// A worker this invocation created is only kept once a status write
    /// against the same read succeeds; on a conflict it is removed again.
    /// A failed worker is deleted only after the retry has been recorded.
    async fn apply(&self, job: Job, step: Step) -> Result<Requeue, ReconcileError> {
        let created = match step.effect {
            Effect::CreateWorker => match self.create_worker(&job).await? {
                Creation::Created(name) => Some(name),
                Creation::Adopted => None,
                Creation::OwnerGone => return Ok(Requeue::Done),
            },
            _ => None,
        };

        if created.is_some() || step.status != job.status {
            let from = job.status.phase;
            let mut updated = job;
            updated.status = step.status;

            match self.store.update_status(&updated).await {
                Ok(stored) if stored.status.phase != from => {
                    info!(
                        "Job {} transitioned {} -> {} (retries: {})",
                        stored.name, from, stored.status.phase, stored.status.retries
                    );
                    if let Some(message) = &stored.status.error_message {
                        if stored.status.phase == Phase::Failed {
                            warn!("Job {} failed: {}", stored.name, message);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    info!("Job {} was deleted during reconciliation", updated.name);
                    return Ok(Requeue::Done);
                }
                Err(e) if e.is_conflict() => {
                    if let Some(worker) = &created {
                        self.roll_back_worker(worker, &updated.name).await;
                    }
                    return Err(ReconcileError::Conflict(updated.name));
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Effect::DeleteWorker(name) = &step.effect {
            self.delete_worker(name).await?;
        }

        Ok(step.requeue)
    }

    /// Creates the worker for the job's current attempt
    async fn create_worker(&self, job: &Job) -> Result<Creation, ReconcileError> {
        let launch = self.builder.build(job);

        match self.store.create_worker(launch).await {
            Ok(worker) => {
                info!("Created worker {} for job {}", worker.name, job.name);
                Ok(Creation::Created(worker.name))
            }
            Err(StoreError::AlreadyExists { name, .. }) => {
                info!("Worker {} already exists, skipping creation", name);
                Ok(Creation::Adopted)
            }
            Err(e) if e.is_not_found() => {
                info!("Job {} was deleted before its worker was created", job.name);
                Ok(Creation::OwnerGone)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a worker created from a read that lost the status write
    ///
    /// Failures are left to the superseded-worker sweep.
    async fn roll_back_worker(&self, name: &str, job_name: &str) {
        info!(
            "Status write for job {} conflicted, removing worker {}",
            job_name, name
        );
        if let Err(e) = self.delete_worker(name).await {
            warn!(
                "Failed to remove worker {} of job {}: {}",
                name, job_name, e
            );
        }
    }

    async fn delete_worker(&self, name: &str) -> Result<(), ReconcileError> {
        match self.store.delete_worker(name).await {
            Ok(()) => {
                info!("Deleted worker {}", name);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Worker {} already deleted", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Terminal housekeeping: remove residual workers, then apply the TTL
    async fn finalize(&self, job: &Job, now: DateTime<Utc>) -> Result<Requeue, ReconcileError> {
        let residual = self.store.list_workers(Some(&job.name)).await?;
        for worker in &residual {
            self.delete_worker(&worker.name).await?;
        }

        let retention = ttl::evaluate(job, now);
        match retention {
            Retention::Forever => {
                debug!("No TTL set, job {} will be retained", job.name);
            }
            Retention::Expired => {
                info!("TTL exceeded, deleting job {}", job.name);
                match self.store.delete_job(&job.name).await {
                    Ok(()) => info!("Job {} deleted", job.name),
                    Err(e) if e.is_not_found() => debug!("Job {} already deleted", job.name),
                    Err(e) => return Err(e.into()),
                }
            }
            Retention::Until(expiry) => {
                debug!(
                    "TTL not reached for job {}, next check at {}",
                    job.name, expiry
                );
            }
        }

        Ok(retention.requeue(now))
    }
}
