//! Retry and timeout policy
//!
//! Requeue tiers pace re-invocation; the retry bound and the absolute
//! deadline decide when a job stops trying.

use aerjob_core::domain::job::Job;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::Requeue;

/// Re-invocation cadence after an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Polling a live worker for a phase change
    Fast,

    /// After a recoverable store error or a retried worker failure
    Default,

    /// After entering a terminal phase
    Slow,
}

/// Delays behind each requeue tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeuePolicy {
    pub fast: Duration,
    pub default: Duration,
    pub slow: Duration,
}

impl RequeuePolicy {
    pub fn delay(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Fast => self.fast,
            Tier::Default => self.default,
            Tier::Slow => self.slow,
        }
    }

    pub fn after(&self, tier: Tier) -> Requeue {
        Requeue::After(self.delay(tier))
    }
}

impl Default for RequeuePolicy {
    fn default() -> Self {
        Self {
            fast: Duration::from_secs(5),
            default: Duration::from_secs(10),
            slow: Duration::from_secs(60),
        }
    }
}

/// Returns the failure message if a running job has outlived its deadline
///
/// Terminal jobs never exceed their deadline, which makes re-applying the
/// check a no-op.
pub fn deadline_exceeded(job: &Job, now: DateTime<Utc>) -> Option<String> {
    if job.status.phase.is_terminal() {
        return None;
    }

    let started = job.status.start_time?;
    let timeout = job.spec.timeout()?;

    (now - started > timeout).then(|| {
        format!(
            "Job exceeded timeout of {} seconds",
            job.spec.timeout_seconds
        )
    })
}

/// Whether another worker failure can be absorbed
pub fn can_retry(job: &Job) -> bool {
    job.status.retries < job.spec.max_retries
}

/// Failure message once the retry budget is spent
pub fn retries_exhausted_message(job: &Job) -> String {
    format!(
        "Job terminated after {} worker failures (maxRetries: {})",
        job.status.retries + 1,
        job.spec.max_retries
    )
}
