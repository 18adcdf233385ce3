//! TTL garbage collection for finished jobs

use aerjob_core::domain::job::Job;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::Requeue;

/// How long a finished job is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// No TTL configured
    Forever,

    /// The TTL has elapsed; the job record should be deleted
    Expired,

    /// Keep until the given instant
    Until(DateTime<Utc>),
}

impl Retention {
    /// Wake-up directive for this retention
    ///
    /// A retained job is revisited exactly at its expiry, not on a tier.
    pub fn requeue(self, now: DateTime<Utc>) -> Requeue {
        match self {
            Retention::Forever | Retention::Expired => Requeue::Done,
            Retention::Until(expiry) => {
                Requeue::After((expiry - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}

/// Decides whether a terminal job has outlived its TTL
pub fn evaluate(job: &Job, now: DateTime<Utc>) -> Retention {
    let (Some(ttl), Some(completed)) = (job.spec.ttl(), job.status.completion_time) else {
        return Retention::Forever;
    };

    match completed.checked_add_signed(ttl) {
        Some(expiry) if now >= expiry => Retention::Expired,
        Some(expiry) => Retention::Until(expiry),
        None => Retention::Forever,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerjob_core::domain::job::{JobSpec, Phase};
    use chrono::TimeDelta;

    fn finished(ttl: Option<u64>) -> (Job, DateTime<Utc>) {
        let mut spec = JobSpec::new("img", "");
        spec.ttl_seconds_after_finished = ttl;
        let mut job = Job::new("bell", spec);
        let completed = Utc::now();
        job.status.phase = Phase::Completed;
        job.status.completion_time = Some(completed);
        (job, completed)
    }

    #[test]
    fn test_without_ttl_job_is_kept_forever() {
        let (job, t0) = finished(None);
        let retention = evaluate(&job, t0 + TimeDelta::days(3650));

        assert_eq!(retention, Retention::Forever);
        assert_eq!(retention.requeue(t0), Requeue::Done);
    }

    #[test]
    fn test_retained_until_exact_expiry() {
        let (job, t0) = finished(Some(300));

        for elapsed in [0, 1, 150, 299] {
            let now = t0 + TimeDelta::seconds(elapsed);
            let retention = evaluate(&job, now);

            assert_eq!(retention, Retention::Until(t0 + TimeDelta::seconds(300)));
            assert_eq!(
                retention.requeue(now),
                Requeue::After(Duration::from_secs((300 - elapsed) as u64))
            );
        }
    }

    #[test]
    fn test_subsecond_wakeup_is_exact() {
        let (job, t0) = finished(Some(300));
        let now = t0 + TimeDelta::milliseconds(299_750);

        assert_eq!(
            evaluate(&job, now).requeue(now),
            Requeue::After(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_expired_at_and_after_ttl() {
        let (job, t0) = finished(Some(300));

        assert_eq!(
            evaluate(&job, t0 + TimeDelta::seconds(300)),
            Retention::Expired
        );
        assert_eq!(evaluate(&job, t0 + TimeDelta::hours(2)), Retention::Expired);
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let (job, t0) = finished(Some(0));
        assert_eq!(evaluate(&job, t0), Retention::Expired);
    }
}
