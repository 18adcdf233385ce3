//! In-memory object store
//!
//! Keeps jobs and workers in process memory with the same semantics as the
//! Postgres store: versioned status updates, idempotency errors on create,
//! and cascading deletion of workers with their owner.

use aerjob_core::domain::job::Job;
use aerjob_core::domain::worker::{Worker, WorkerLaunch, WorkerPhase};
use aerjob_core::error::{ObjectKind, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::ObjectStore;

#[derive(Default)]
struct State {
    jobs: BTreeMap<String, Job>,
    workers: BTreeMap<String, Worker>,
}

/// Object store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::transient("memory store lock poisoned"))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_job(&self, mut job: Job) -> StoreResult<Job> {
        let mut state = self.lock()?;
        if state.jobs.contains_key(&job.name) {
            return Err(StoreError::already_exists(ObjectKind::Job, job.name));
        }
        job.resource_version = 1;
        state.jobs.insert(job.name.clone(), job.clone());
        Ok(job)
    }

    async fn get_job(&self, name: &str) -> StoreResult<Job> {
        self.lock()?
            .jobs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(ObjectKind::Job, name))
    }

    async fn list_jobs(&self) -> StoreResult<Vec<Job>> {
        Ok(self.lock()?.jobs.values().cloned().collect())
    }

    async fn update_status(&self, job: &Job) -> StoreResult<Job> {
        let mut state = self.lock()?;
        let stored = state
            .jobs
            .get_mut(&job.name)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Job, &job.name))?;

        if stored.resource_version != job.resource_version || stored.uid != job.uid {
            return Err(StoreError::conflict(&job.name, job.resource_version));
        }

        stored.status = job.status.clone();
        stored.resource_version += 1;
        Ok(stored.clone())
    }

    async fn delete_job(&self, name: &str) -> StoreResult<()> {
        let mut state = self.lock()?;
        let job = state
            .jobs
            .remove(name)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Job, name))?;

        state.workers.retain(|_, worker| worker.owner.uid != job.uid);
        Ok(())
    }

    async fn create_worker(&self, launch: WorkerLaunch) -> StoreResult<Worker> {
        let mut state = self.lock()?;

        let owner_alive = state
            .jobs
            .get(&launch.owner.name)
            .is_some_and(|job| job.uid == launch.owner.uid);
        if !owner_alive {
            return Err(StoreError::not_found(ObjectKind::Job, launch.owner.name));
        }

        if state.workers.contains_key(&launch.name) {
            return Err(StoreError::already_exists(ObjectKind::Worker, launch.name));
        }

        let worker = Worker::from_launch(launch);
        state.workers.insert(worker.name.clone(), worker.clone());
        Ok(worker)
    }

    async fn get_worker(&self, name: &str) -> StoreResult<Worker> {
        self.lock()?
            .workers
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(ObjectKind::Worker, name))
    }

    async fn list_workers(&self, owner: Option<&str>) -> StoreResult<Vec<Worker>> {
        Ok(self
            .lock()?
            .workers
            .values()
            .filter(|worker| owner.is_none_or(|owner| worker.owner.name == owner))
            .cloned()
            .collect())
    }

    async fn update_worker_phase(&self, name: &str, phase: WorkerPhase) -> StoreResult<Worker> {
        let mut state = self.lock()?;
        let worker = state
            .workers
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(ObjectKind::Worker, name))?;
        worker.phase = phase;
        Ok(worker.clone())
    }

    async fn delete_worker(&self, name: &str) -> StoreResult<()> {
        self.lock()?
            .workers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(ObjectKind::Worker, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerjob_core::domain::job::{JobSpec, Phase};
    use aerjob_core::domain::worker::{OwnerRef, WorkerSpec};

    fn launch_for(job: &Job, name: &str) -> WorkerLaunch {
        WorkerLaunch {
            name: name.to_string(),
            owner: OwnerRef {
                name: job.name.clone(),
                uid: job.uid,
            },
            spec: WorkerSpec {
                image: job.spec.worker_image.clone(),
                env: Default::default(),
                labels: Default::default(),
                resources: Default::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let store = MemoryStore::new();
        let job = store
            .create_job(Job::new("bell", JobSpec::new("img", "")))
            .await
            .unwrap();

        let mut first = job.clone();
        first.status.phase = Phase::Pending;
        let written = store.update_status(&first).await.unwrap();
        assert_eq!(written.resource_version, job.resource_version + 1);

        let mut stale = job.clone();
        stale.status.phase = Phase::Failed;
        let err = store.update_status(&stale).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get_job("bell").await.unwrap();
        assert_eq!(stored.status.phase, Phase::Pending);
    }

    #[tokio::test]
    async fn test_update_of_deleted_job_is_not_found() {
        let store = MemoryStore::new();
        let job = store
            .create_job(Job::new("bell", JobSpec::new("img", "")))
            .await
            .unwrap();
        store.delete_job("bell").await.unwrap();

        assert!(store.update_status(&job).await.unwrap_err().is_not_found());
        assert!(store.delete_job("bell").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_worker_create_reports_already_exists() {
        let store = MemoryStore::new();
        let job = store
            .create_job(Job::new("bell", JobSpec::new("img", "")))
            .await
            .unwrap();

        store
            .create_worker(launch_for(&job, "bell-worker-0"))
            .await
            .unwrap();
        let err = store
            .create_worker(launch_for(&job, "bell-worker-0"))
            .await
            .unwrap_err();

        assert!(err.is_already_exists());
        assert_eq!(store.list_workers(Some("bell")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_for_missing_owner_is_rejected() {
        let store = MemoryStore::new();
        let ghost = Job::new("ghost", JobSpec::new("img", ""));

        let err = store
            .create_worker(launch_for(&ghost, "ghost-worker-0"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_deleting_job_cascades_to_workers() {
        let store = MemoryStore::new();
        let bell = store
            .create_job(Job::new("bell", JobSpec::new("img", "")))
            .await
            .unwrap();
        let ghz = store
            .create_job(Job::new("ghz", JobSpec::new("img", "")))
            .await
            .unwrap();
        store
            .create_worker(launch_for(&bell, "bell-worker-0"))
            .await
            .unwrap();
        store
            .create_worker(launch_for(&ghz, "ghz-worker-0"))
            .await
            .unwrap();

        store.delete_job("bell").await.unwrap();

        let remaining = store.list_workers(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "ghz-worker-0");
    }
}
