//! Job phase state machine
//!
//! Maps the persisted job and a fresh observation of its worker onto the
//! next status, the worker mutation to perform, and when to come back.
//! Exactly one phase transition per step at most; no I/O.

use aerjob_core::domain::job::{Job, JobStatus, Phase};
use aerjob_core::domain::worker::WorkerPhase;
use chrono::{DateTime, Utc};

use super::Requeue;
use super::policy::{self, RequeuePolicy, Tier};
use crate::builder::WorkerSpecBuilder;

/// What the reconciler saw when it looked up the job's worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// No worker reference, or the referenced worker does not exist
    Missing,
    Found(WorkerPhase),
}

/// Worker mutation accompanying a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,

    /// Launch the worker for the current attempt
    CreateWorker,

    /// Remove the named worker
    DeleteWorker(String),
}

/// Outcome of one state-machine step
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub status: JobStatus,
    pub effect: Effect,
    pub requeue: Requeue,
}

impl Step {
    fn new(status: JobStatus, effect: Effect, requeue: Requeue) -> Self {
        Self {
            status,
            effect,
            requeue,
        }
    }
}

/// Computes the next step for a job
///
/// The deadline check runs before anything else and ignores the
/// observation. Terminal phases are left untouched; their housekeeping is
/// the TTL collector's job.
pub fn step(
    job: &Job,
    observation: Observation,
    now: DateTime<Utc>,
    policy: &RequeuePolicy,
) -> Step {
    let mut status = job.status.clone();

    if let Some(message) = policy::deadline_exceeded(job, now) {
        fail(&mut status, message, now);
        return Step::new(status, Effect::None, Requeue::Now);
    }

    match (job.status.phase, observation) {
        (Phase::Unstarted, _) => {
            status.phase = Phase::Pending;
            status.start_time.get_or_insert(now);
            status.retries = 0;
            Step::new(status, Effect::None, Requeue::Now)
        }

        (Phase::Pending, Observation::Missing) => {
            status.worker_ref = Some(WorkerSpecBuilder::worker_name(job));
            Step::new(status, Effect::CreateWorker, Requeue::Now)
        }

        (Phase::Pending, Observation::Found(_)) => {
            status.phase = Phase::Running;
            Step::new(status, Effect::None, Requeue::Now)
        }

        (Phase::Running, Observation::Missing) => {
            status.phase = Phase::Pending;
            status.worker_ref = None;
            Step::new(status, Effect::None, Requeue::Now)
        }

        (Phase::Running, Observation::Found(WorkerPhase::Pending | WorkerPhase::Running)) => {
            Step::new(status, Effect::None, policy.after(Tier::Fast))
        }

        (Phase::Running, Observation::Found(WorkerPhase::Succeeded)) => {
            status.phase = Phase::Completed;
            status.completion_time = Some(now);
            status.worker_ref = None;
            Step::new(status, Effect::None, policy.after(Tier::Slow))
        }

        (Phase::Running, Observation::Found(WorkerPhase::Failed)) if policy::can_retry(job) => {
            let failed = job
                .status
                .worker_ref
                .clone()
                .unwrap_or_else(|| WorkerSpecBuilder::worker_name(job));
            status.phase = Phase::Pending;
            status.retries += 1;
            status.worker_ref = None;
            Step::new(
                status,
                Effect::DeleteWorker(failed),
                policy.after(Tier::Default),
            )
        }

        (Phase::Running, Observation::Found(WorkerPhase::Failed)) => {
            fail(&mut status, policy::retries_exhausted_message(job), now);
            Step::new(status, Effect::None, policy.after(Tier::Slow))
        }

        (Phase::Completed | Phase::Failed, _) => Step::new(status, Effect::None, Requeue::Done),
    }
}

fn fail(status: &mut JobStatus, message: String, now: DateTime<Utc>) {
    status.phase = Phase::Failed;
    status.completion_time = Some(now);
    status.error_message = Some(message);
    status.worker_ref = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerjob_core::domain::job::JobSpec;
    use chrono::TimeDelta;
    use std::time::Duration;

    fn job_in(phase: Phase, retries: u32, max_retries: u32) -> (Job, DateTime<Utc>) {
        let mut spec = JobSpec::new("img", "");
        spec.max_retries = max_retries;
        let mut job = Job::new("bell", spec);
        let start = Utc::now();
        job.status.phase = phase;
        job.status.retries = retries;
        if phase != Phase::Unstarted {
            job.status.start_time = Some(start);
        }
        if matches!(phase, Phase::Pending | Phase::Running) {
            job.status.worker_ref = Some(format!("bell-worker-{}", retries));
        }
        (job, start)
    }

    fn run(job: &Job, observation: Observation, now: DateTime<Utc>) -> Step {
        step(job, observation, now, &RequeuePolicy::default())
    }

    #[test]
    fn test_unstarted_enters_pending_and_records_start() {
        let (job, _) = job_in(Phase::Unstarted, 0, 3);
        let now = Utc::now();

        let step = run(&job, Observation::Missing, now);

        assert_eq!(step.status.phase, Phase::Pending);
        assert_eq!(step.status.start_time, Some(now));
        assert_eq!(step.status.retries, 0);
        assert_eq!(step.effect, Effect::None);
        assert_eq!(step.requeue, Requeue::Now);
    }

    #[test]
    fn test_pending_without_worker_creates_one() {
        let (mut job, start) = job_in(Phase::Pending, 1, 3);
        job.status.worker_ref = None;

        let step = run(&job, Observation::Missing, start);

        assert_eq!(step.status.phase, Phase::Pending);
        assert_eq!(step.status.worker_ref.as_deref(), Some("bell-worker-1"));
        assert_eq!(step.effect, Effect::CreateWorker);
    }

    #[test]
    fn test_pending_with_worker_starts_running() {
        let (job, start) = job_in(Phase::Pending, 0, 3);

        let step = run(&job, Observation::Found(WorkerPhase::Pending), start);

        assert_eq!(step.status.phase, Phase::Running);
        assert_eq!(step.status.worker_ref, job.status.worker_ref);
        assert_eq!(step.effect, Effect::None);
    }

    #[test]
    fn test_running_with_vanished_worker_returns_to_pending() {
        let (job, start) = job_in(Phase::Running, 1, 3);

        let step = run(&job, Observation::Missing, start);

        assert_eq!(step.status.phase, Phase::Pending);
        assert_eq!(step.status.worker_ref, None);
        assert_eq!(step.status.retries, 1);
    }

    #[test]
    fn test_live_worker_is_polled_fast() {
        let (job, start) = job_in(Phase::Running, 0, 3);

        for phase in [WorkerPhase::Pending, WorkerPhase::Running] {
            let step = run(&job, Observation::Found(phase), start);
            assert_eq!(step.status, job.status);
            assert_eq!(step.requeue, Requeue::After(Duration::from_secs(5)));
        }
    }

    #[test]
    fn test_succeeded_worker_completes_job() {
        let (job, start) = job_in(Phase::Running, 0, 3);
        let now = start + TimeDelta::seconds(30);

        let step = run(&job, Observation::Found(WorkerPhase::Succeeded), now);

        assert_eq!(step.status.phase, Phase::Completed);
        assert_eq!(step.status.completion_time, Some(now));
        assert_eq!(step.status.worker_ref, None);
        assert_eq!(step.status.error_message, None);
        assert_eq!(step.requeue, Requeue::After(Duration::from_secs(60)));
    }

    #[test]
    fn test_failed_worker_within_budget_is_retried() {
        for retries in 0..3 {
            let (job, start) = job_in(Phase::Running, retries, 3);

            let step = run(&job, Observation::Found(WorkerPhase::Failed), start);

            assert_eq!(step.status.phase, Phase::Pending);
            assert_eq!(step.status.retries, retries + 1);
            assert_eq!(step.status.worker_ref, None);
            assert_eq!(step.status.completion_time, None);
            assert_eq!(
                step.effect,
                Effect::DeleteWorker(format!("bell-worker-{}", retries))
            );
            assert_eq!(step.requeue, Requeue::After(Duration::from_secs(10)));
        }
    }

    #[test]
    fn test_failed_worker_at_budget_fails_job() {
        let (job, start) = job_in(Phase::Running, 2, 2);
        let now = start + TimeDelta::seconds(20);

        let step = run(&job, Observation::Found(WorkerPhase::Failed), now);

        assert_eq!(step.status.phase, Phase::Failed);
        assert_eq!(step.status.retries, 2);
        assert_eq!(step.status.completion_time, Some(now));
        assert_eq!(step.status.worker_ref, None);
        assert!(
            step.status
                .error_message
                .as_deref()
                .unwrap()
                .contains("worker failures")
        );
        assert_eq!(step.effect, Effect::None);
    }

    #[test]
    fn test_zero_max_retries_fails_on_first_failure() {
        let (job, start) = job_in(Phase::Running, 0, 0);

        let step = run(&job, Observation::Found(WorkerPhase::Failed), start);

        assert_eq!(step.status.phase, Phase::Failed);
    }

    #[test]
    fn test_timeout_wins_over_any_observation() {
        let observations = [
            Observation::Missing,
            Observation::Found(WorkerPhase::Running),
            Observation::Found(WorkerPhase::Succeeded),
            Observation::Found(WorkerPhase::Failed),
        ];

        for phase in [Phase::Pending, Phase::Running] {
            for observation in observations {
                let (job, start) = job_in(phase, 0, 3);
                let now = start + TimeDelta::seconds(601);

                let step = run(&job, observation, now);

                assert_eq!(step.status.phase, Phase::Failed);
                assert_eq!(step.status.completion_time, Some(now));
                assert_eq!(step.status.worker_ref, None);
                assert_eq!(
                    step.status.error_message.as_deref(),
                    Some("Job exceeded timeout of 600 seconds")
                );
                assert_eq!(step.effect, Effect::None);
            }
        }
    }

    #[test]
    fn test_timeout_reapplied_to_failed_job_is_noop() {
        let (job, start) = job_in(Phase::Running, 0, 3);
        let now = start + TimeDelta::seconds(601);
        let first = run(&job, Observation::Missing, now);

        let mut failed = job.clone();
        failed.status = first.status.clone();
        let later = now + TimeDelta::seconds(5);
        let second = run(&failed, Observation::Missing, later);

        assert_eq!(second.status, first.status);
        assert_eq!(second.effect, Effect::None);
        assert_eq!(second.requeue, Requeue::Done);
    }

    #[test]
    fn test_terminal_phases_are_never_left() {
        for phase in [Phase::Completed, Phase::Failed] {
            let (mut job, start) = job_in(phase, 0, 3);
            job.status.completion_time = Some(start);

            let step = run(&job, Observation::Found(WorkerPhase::Failed), start);

            assert_eq!(step.status, job.status);
            assert_eq!(step.effect, Effect::None);
        }
    }
}
