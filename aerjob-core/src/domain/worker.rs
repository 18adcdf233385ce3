//! Worker domain model
//!
//! A worker executes one attempt of a job. It is owned by exactly one job
//! and disappears with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::job::ResourceRequirements;

/// A worker record as stored and observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub name: String,

    /// The job this worker belongs to
    pub owner: OwnerRef,

    pub spec: WorkerSpec,

    /// Phase last reported by the worker runtime
    pub phase: WorkerPhase,

    pub created_at: DateTime<Utc>,
}

impl Worker {
    /// Materializes a launch request into a freshly created, pending worker
    pub fn from_launch(launch: WorkerLaunch) -> Self {
        Self {
            name: launch.name,
            owner: launch.owner,
            spec: launch.spec,
            phase: WorkerPhase::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Link from a worker to the job that owns it
///
/// Deleting the owner cascades to the worker. The uid guards against a
/// recreated job with the same name adopting a stale worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub name: String,
    pub uid: Uuid,
}

/// What the runtime needs to launch a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    pub image: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

/// Request to create a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerLaunch {
    pub name: String,
    pub owner: OwnerRef,
    pub spec: WorkerSpec,
}

/// Phase of a worker as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerPhase {
    /// Accepted but not yet executing
    Pending,

    Running,

    /// Exited cleanly
    Succeeded,

    /// Exited with an error or was lost
    Failed,
}

impl WorkerPhase {
    pub fn is_finished(self) -> bool {
        matches!(self, WorkerPhase::Succeeded | WorkerPhase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerPhase::Pending => "Pending",
            WorkerPhase::Running => "Running",
            WorkerPhase::Succeeded => "Succeeded",
            WorkerPhase::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(WorkerPhase::Pending),
            "Running" => Ok(WorkerPhase::Running),
            "Succeeded" => Ok(WorkerPhase::Succeeded),
            "Failed" => Ok(WorkerPhase::Failed),
            other => Err(format!("unknown worker phase: {}", other)),
        }
    }
}
