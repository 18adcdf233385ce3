//! Job DTOs for the operator API

use serde::{Deserialize, Serialize};

use crate::domain::job::{Job, JobSpec};

/// Request to submit a new job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub name: String,
    pub spec: JobSpec,
}

impl From<CreateJob> for Job {
    fn from(req: CreateJob) -> Self {
        Job::new(req.name, req.spec)
    }
}
