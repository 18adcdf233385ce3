//! Worker Spec Builder
//!
//! Maps a job onto the launch request for one worker attempt. Pure: no
//! store access and no state-machine decisions.

use aerjob_core::domain::job::{Job, ResourceList, ResourceRequirements};
use aerjob_core::domain::worker::{OwnerRef, WorkerLaunch, WorkerSpec};
use std::collections::BTreeMap;

/// Label carried by every worker the operator launches
pub const MANAGED_LABEL: &str = "aerjob.io/managed";

/// Label naming the owning job
pub const JOB_LABEL: &str = "aerjob.io/job";

/// Builds worker launch requests from jobs
#[derive(Debug, Clone, Default)]
pub struct WorkerSpecBuilder {
    /// Extra environment forwarded to every worker
    extra_env: BTreeMap<String, String>,
}

impl WorkerSpecBuilder {
    pub fn new(extra_env: BTreeMap<String, String>) -> Self {
        Self { extra_env }
    }

    /// Name of the worker for the job's current attempt
    ///
    /// Deterministic per attempt, so a repeated create for the same attempt
    /// collides instead of launching a second worker.
    pub fn worker_name(job: &Job) -> String {
        format!("{}-worker-{}", job.name, job.status.retries)
    }

    /// Attempt number encoded in a worker name owned by `job_name`
    pub fn attempt_of(job_name: &str, worker_name: &str) -> Option<u32> {
        worker_name
            .strip_prefix(job_name)?
            .strip_prefix("-worker-")?
            .parse()
            .ok()
    }

    /// Builds the launch request for the job's current attempt
    pub fn build(&self, job: &Job) -> WorkerLaunch {
        let mut env = self.extra_env.clone();
        env.insert("JOB_NAME".to_string(), job.name.clone());
        env.insert("JOB_UID".to_string(), job.uid.to_string());
        env.insert("BACKEND_NAME".to_string(), job.spec.backend_name.clone());
        env.insert("SHOTS".to_string(), job.spec.shots.to_string());
        env.insert("CIRCUITS".to_string(), job.spec.circuits.clone());
        env.insert("WORKER_IMAGE".to_string(), job.spec.worker_image.clone());
        env.insert("ATTEMPT".to_string(), job.status.retries.to_string());

        let labels = BTreeMap::from([
            ("app".to_string(), "aerjob-worker".to_string()),
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (JOB_LABEL.to_string(), job.name.clone()),
        ]);

        WorkerLaunch {
            name: Self::worker_name(job),
            owner: OwnerRef {
                name: job.name.clone(),
                uid: job.uid,
            },
            spec: WorkerSpec {
                image: job.spec.worker_image.clone(),
                env,
                labels,
                resources: with_default_resources(&job.spec.resources),
            },
        }
    }
}

/// Fills unset quantities with the simulator defaults
fn with_default_resources(resources: &ResourceRequirements) -> ResourceRequirements {
    fn fill(list: &ResourceList, cpu: &str, memory: &str) -> ResourceList {
        ResourceList {
            cpu: list.cpu.clone().or_else(|| Some(cpu.to_string())),
            memory: list.memory.clone().or_else(|| Some(memory.to_string())),
        }
    }

    ResourceRequirements {
        requests: fill(&resources.requests, "1", "512Mi"),
        limits: fill(&resources.limits, "2", "2Gi"),
    }
}
