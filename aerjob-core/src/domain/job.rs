//! Job domain types

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Job record
///
/// The unit the operator reconciles. `spec` is fixed at creation,
/// `status` is written only by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique key of the job
    pub name: String,

    /// Identity of this incarnation; a deleted and recreated job gets a new uid
    pub uid: Uuid,

    /// Optimistic-concurrency token, bumped by the store on every update
    pub resource_version: u64,

    pub created_at: DateTime<Utc>,

    pub spec: JobSpec,

    #[serde(default)]
    pub status: JobStatus,
}

impl Job {
    /// Creates a fresh, unstarted job record
    pub fn new(name: impl Into<String>, spec: JobSpec) -> Self {
        Self {
            name: name.into(),
            uid: Uuid::new_v4(),
            resource_version: 0,
            created_at: Utc::now(),
            spec,
            status: JobStatus::default(),
        }
    }
}

/// Desired state of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Image the worker runs
    pub worker_image: String,

    /// Simulator backend the payload targets
    #[serde(default = "default_backend_name")]
    pub backend_name: String,

    /// Number of times the circuit is executed
    #[serde(default = "default_shots")]
    pub shots: u32,

    /// Serialized circuits; never interpreted by the operator
    pub circuits: String,

    /// Worker failures tolerated before the job fails permanently
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Absolute deadline measured from the start time; 0 disables it
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retention after the job finishes; `None` keeps the job forever
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds_after_finished: Option<u64>,

    #[serde(default)]
    pub resources: ResourceRequirements,
}

fn default_backend_name() -> String {
    "aer-simulator".to_string()
}

fn default_shots() -> u32 {
    1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    600
}

fn default_ttl_seconds() -> Option<u64> {
    Some(300)
}

impl JobSpec {
    /// Creates a spec with the default execution policy
    pub fn new(worker_image: impl Into<String>, circuits: impl Into<String>) -> Self {
        Self {
            worker_image: worker_image.into(),
            backend_name: default_backend_name(),
            shots: default_shots(),
            circuits: circuits.into(),
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            ttl_seconds_after_finished: default_ttl_seconds(),
            resources: ResourceRequirements::default(),
        }
    }

    /// The absolute deadline, or `None` when disabled
    pub fn timeout(&self) -> Option<TimeDelta> {
        (self.timeout_seconds > 0).then(|| seconds(self.timeout_seconds))
    }

    /// Retention after completion, or `None` to retain forever
    pub fn ttl(&self) -> Option<TimeDelta> {
        self.ttl_seconds_after_finished.map(seconds)
    }
}

fn seconds(secs: u64) -> TimeDelta {
    let secs = i64::try_from(secs)
        .unwrap_or(i64::MAX)
        .min(i64::MAX / 1_000);
    TimeDelta::seconds(secs)
}

/// Resource requests and limits handed to the worker runtime as-is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceList,
    #[serde(default)]
    pub limits: ResourceList,
}

/// CPU and memory quantities (e.g. "500m", "512Mi")
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Observed state of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub phase: Phase,

    /// Worker failures absorbed so far
    #[serde(default)]
    pub retries: u32,

    /// Worker expected to exist; only set while Pending or Running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Job lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Unstarted,
    Pending,
    Running,
    Completed,
    Failed,
}

impl Phase {
    /// Completed and Failed never transition again
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Unstarted => "unstarted",
            Phase::Pending => "pending",
            Phase::Running => "running",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unstarted" => Ok(Phase::Unstarted),
            "pending" => Ok(Phase::Pending),
            "running" => Ok(Phase::Running),
            "completed" => Ok(Phase::Completed),
            "failed" => Ok(Phase::Failed),
            other => Err(format!("unknown job phase: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults_from_minimal_json() {
        let spec: JobSpec = serde_json::from_value(serde_json::json!({
            "workerImage": "quay.io/aer/worker:latest",
            "circuits": "UUlTS2l0",
        }))
        .unwrap();

        assert_eq!(spec.backend_name, "aer-simulator");
        assert_eq!(spec.shots, 1024);
        assert_eq!(spec.max_retries, 3);
        assert_eq!(spec.timeout_seconds, 600);
        assert_eq!(spec.ttl_seconds_after_finished, Some(300));
    }

    #[test]
    fn test_explicit_null_ttl_retains_forever() {
        let spec: JobSpec = serde_json::from_value(serde_json::json!({
            "workerImage": "img",
            "circuits": "",
            "ttlSecondsAfterFinished": null,
        }))
        .unwrap();

        assert_eq!(spec.ttl(), None);
    }

    #[test]
    fn test_zero_timeout_is_disabled() {
        let mut spec = JobSpec::new("img", "");
        assert_eq!(spec.timeout(), Some(TimeDelta::seconds(600)));

        spec.timeout_seconds = 0;
        assert_eq!(spec.timeout(), None);
    }

    #[test]
    fn test_huge_durations_do_not_panic() {
        let mut spec = JobSpec::new("img", "");
        spec.timeout_seconds = u64::MAX;
        spec.ttl_seconds_after_finished = Some(u64::MAX);

        assert!(spec.timeout().is_some());
        assert!(spec.ttl().is_some());
    }

    #[test]
    fn test_phase_round_trips_through_str() {
        for phase in [
            Phase::Unstarted,
            Phase::Pending,
            Phase::Running,
            Phase::Completed,
            Phase::Failed,
        ] {
            assert_eq!(phase.as_str().parse::<Phase>(), Ok(phase));
        }
        assert!("in progress".parse::<Phase>().is_err());
    }

    #[test]
    fn test_new_job_is_unstarted() {
        let job = Job::new("bell-state", JobSpec::new("img", ""));
        assert_eq!(job.status.phase, Phase::Unstarted);
        assert_eq!(job.status.retries, 0);
        assert!(job.status.worker_ref.is_none());
        assert!(!job.status.phase.is_terminal());
    }
}
