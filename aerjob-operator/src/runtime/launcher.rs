//! Worker launcher
//!
//! Polls the store for worker records and keeps podman containers in step
//! with them. Pending workers get a container, container state flows back
//! into the worker phase, and containers whose worker record is gone are
//! removed. Every phase change pokes the controller for the owning job.

use aerjob_core::domain::worker::{Worker, WorkerPhase};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use super::podman::PodmanClient;
use crate::controller::Trigger;
use crate::store::ObjectStore;

/// Reconciles worker records against running containers
pub struct WorkerLauncher {
    store: Arc<dyn ObjectStore>,
    podman: PodmanClient,
    trigger: Trigger,
    poll_interval: Duration,
}

impl WorkerLauncher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        podman: PodmanClient,
        trigger: Trigger,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            podman,
            trigger,
            poll_interval,
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        self.podman.check_available().await?;

        info!(
            "Starting worker launcher (interval: {:?})",
            self.poll_interval
        );

        let mut interval = time::interval(self.poll_interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.sync_once().await {
                error!("Error during launcher cycle: {:#}", e);
            }
        }
    }

    /// Performs a single sync cycle
    pub async fn sync_once(&self) -> Result<()> {
        let workers = self
            .store
            .list_workers(None)
            .await
            .context("Failed to list workers")?;

        debug!("Syncing {} worker(s)", workers.len());

        let mut known = HashSet::new();
        for worker in &workers {
            known.insert(worker.name.as_str());
            if let Err(e) = self.sync_worker(worker).await {
                warn!("Failed to sync worker {}: {:#}", worker.name, e);
            }
        }

        let containers = self
            .podman
            .list_managed()
            .await
            .context("Failed to list managed containers")?;

        for name in containers {
            if known.contains(name.as_str()) {
                continue;
            }
            info!("Removing container {} of deleted worker", name);
            if let Err(e) = self.podman.remove(&name).await {
                warn!("Failed to remove container {}: {:#}", name, e);
            }
        }

        Ok(())
    }

    async fn sync_worker(&self, worker: &Worker) -> Result<()> {
        let observed = match self.podman.inspect(&worker.name).await? {
            Some(state) => state.worker_phase(),
            None if worker.phase == WorkerPhase::Pending => {
                info!(
                    "Launching worker {} for job {} (image: {})",
                    worker.name, worker.owner.name, worker.spec.image
                );
                match self.podman.run(worker).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!("Worker {} could not be started: {:#}", worker.name, e);
                        WorkerPhase::Failed
                    }
                }
            }
            None if worker.phase.is_finished() => return Ok(()),
            None => {
                warn!("Container of worker {} disappeared", worker.name);
                WorkerPhase::Failed
            }
        };

        if observed == worker.phase {
            return Ok(());
        }

        match self.store.update_worker_phase(&worker.name, observed).await {
            Ok(_) => {
                info!(
                    "Worker {} is now {} (was {})",
                    worker.name, observed, worker.phase
                );
                self.trigger.notify(&worker.owner.name);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Worker {} deleted while syncing", worker.name);
                Ok(())
            }
            Err(e) => Err(e).context("Failed to record worker phase"),
        }
    }
}
