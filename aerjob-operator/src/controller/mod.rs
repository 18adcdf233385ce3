//! Controller
//!
//! Feeds the reconciler: a periodic resync lists every job, triggers from
//! the API and the worker launcher ask for a prompt look at one job, and
//! the requeue directive of each reconcile decides when a job comes back.
//! A job is never reconciled by two tasks at once.

pub mod queue;

pub use queue::WorkQueue;

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

use crate::reconciler::policy::Tier;
use crate::reconciler::{Reconciler, Requeue};
use crate::store::ObjectStore;

/// Handle for asking the controller to look at a job soon
#[derive(Debug, Clone)]
pub struct Trigger {
    tx: mpsc::UnboundedSender<String>,
}

impl Trigger {
    /// Schedules an immediate reconcile of the named job
    ///
    /// Silently dropped once the controller has stopped.
    pub fn notify(&self, name: &str) {
        if self.tx.send(name.to_string()).is_err() {
            debug!("Controller stopped, dropping trigger for job {}", name);
        }
    }

    /// Trigger whose notifications land in the returned receiver
    #[cfg(test)]
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Drives reconciles for every job in the store
pub struct Controller {
    reconciler: Arc<Reconciler>,
    store: Arc<dyn ObjectStore>,
    resync_interval: Duration,
    max_concurrent: usize,
    triggers: mpsc::UnboundedReceiver<String>,
}

impl Controller {
    /// Creates a controller and the trigger handle that feeds it
    pub fn new(
        reconciler: Arc<Reconciler>,
        store: Arc<dyn ObjectStore>,
        resync_interval: Duration,
        max_concurrent: usize,
    ) -> (Self, Trigger) {
        let (tx, triggers) = mpsc::unbounded_channel();
        let controller = Self {
            reconciler,
            store,
            resync_interval,
            max_concurrent: max_concurrent.max(1),
            triggers,
        };
        (controller, Trigger { tx })
    }

    /// Runs the control loop forever
    pub async fn run(mut self) {
        info!(
            "Starting controller (resync: {:?}, max concurrent: {})",
            self.resync_interval, self.max_concurrent
        );

        let mut queue = WorkQueue::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(String, Requeue)>();
        let mut resync = time::interval(self.resync_interval);
        let mut triggers_open = true;

        loop {
            let now = Instant::now();
            let capacity = self.max_concurrent.saturating_sub(queue.in_flight());
            for name in queue.pop_due(now, capacity) {
                self.spawn_reconcile(name, done_tx.clone());
            }

            let next = queue.next_deadline();
            let can_start = queue.in_flight() < self.max_concurrent;

            tokio::select! {
                _ = resync.tick() => {
                    self.resync(&mut queue).await;
                }
                trigger = self.triggers.recv(), if triggers_open => match trigger {
                    Some(name) => {
                        debug!("Triggered reconcile of job {}", name);
                        queue.schedule(&name, Instant::now());
                    }
                    None => triggers_open = false,
                },
                Some((name, requeue)) = done_rx.recv() => {
                    queue.done(&name);
                    match requeue {
                        Requeue::Done => {}
                        Requeue::Now => queue.schedule(&name, Instant::now()),
                        Requeue::After(delay) => match Instant::now().checked_add(delay) {
                            Some(at) => queue.schedule(&name, at),
                            None => debug!("Requeue of job {} left to resync", name),
                        },
                    }
                }
                _ = time::sleep_until(next.unwrap_or(now)), if next.is_some() && can_start => {}
            }
        }
    }

    /// Schedules every stored job
    async fn resync(&self, queue: &mut WorkQueue) {
        match self.store.list_jobs().await {
            Ok(jobs) => {
                debug!("Resync found {} job(s)", jobs.len());
                let now = Instant::now();
                for job in jobs {
                    queue.schedule(&job.name, now);
                }
            }
            Err(e) => warn!("Failed to list jobs for resync: {}", e),
        }
    }

    /// Spawns a task reconciling one job
    fn spawn_reconcile(&self, name: String, done: mpsc::UnboundedSender<(String, Requeue)>) {
        let reconciler = Arc::clone(&self.reconciler);

        tokio::spawn(async move {
            let mut completion = Completion {
                requeue: reconciler.policy().after(Tier::Default),
                name,
                done,
            };

            let requeue = match reconciler.reconcile(&completion.name).await {
                Ok(requeue) => requeue,
                Err(e) => {
                    warn!("Failed to reconcile job {}: {}", completion.name, e);
                    e.requeue(reconciler.policy())
                }
            };
            completion.requeue = requeue;
        });
    }
}

/// Reports a finished reconcile back to the loop, also when the task panics
struct Completion {
    name: String,
    requeue: Requeue,
    done: mpsc::UnboundedSender<(String, Requeue)>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let name = std::mem::take(&mut self.name);
        let _ = self.done.send((name, self.requeue));
    }
}
