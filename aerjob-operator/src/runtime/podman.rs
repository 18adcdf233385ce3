//! Podman container management
//!
//! Runs worker records as detached containers named after the worker:
//! - Checking podman availability
//! - Starting a worker container with its env, labels and resources
//! - Inspecting container state and mapping it onto a worker phase
//! - Removing containers and listing the ones the operator manages

use aerjob_core::domain::job::ResourceRequirements;
use aerjob_core::domain::worker::{Worker, WorkerPhase};
use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::builder::MANAGED_LABEL;

/// Thin async wrapper around the podman CLI
#[derive(Debug, Clone)]
pub struct PodmanClient {
    binary: String,
    leading_args: Vec<String>,
}

impl Default for PodmanClient {
    fn default() -> Self {
        Self::new("podman")
    }
}

/// Container state as reported by `podman inspect`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "Status")]
    pub status: String,

    #[serde(rename = "ExitCode", default)]
    pub exit_code: i32,
}

impl ContainerState {
    /// Worker phase implied by the container state
    pub fn worker_phase(&self) -> WorkerPhase {
        match self.status.to_ascii_lowercase().as_str() {
            "running" | "paused" | "stopping" => WorkerPhase::Running,
            "exited" | "stopped" if self.exit_code == 0 => WorkerPhase::Succeeded,
            "exited" | "stopped" | "dead" | "removing" => WorkerPhase::Failed,
            _ => WorkerPhase::Pending,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "State")]
    state: ContainerState,
}

impl PodmanClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            leading_args: Vec::new(),
        }
    }

    /// Client backed by a shell script standing in for podman
    #[cfg(test)]
    pub(crate) fn script(path: &std::path::Path) -> Self {
        Self {
            binary: "sh".to_string(),
            leading_args: vec![path.display().to_string()],
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(&self.leading_args);
        command
    }

    /// Checks if podman is installed and available
    pub async fn check_available(&self) -> Result<()> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .await
            .with_context(|| {
                format!(
                    "Failed to execute '{} --version'. Is podman installed?",
                    self.binary
                )
            })?;

        if !output.status.success() {
            anyhow::bail!("Podman is not working correctly");
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("Podman is available: {}", version.trim());

        Ok(())
    }

    /// Starts a detached container for the worker
    ///
    /// A container that already exists under the worker's name counts as
    /// started.
    pub async fn run(&self, worker: &Worker) -> Result<()> {
        let mut command = self.command();
        command.args(run_args(worker));

        let output = command
            .output()
            .await
            .context("Failed to execute podman run command")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty() {
            debug!("podman run stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("podman run stderr: {}", stderr.trim());
        }

        if output.status.success() {
            info!(
                "Container {} started with ID: {}",
                worker.name,
                stdout.trim()
            );
            return Ok(());
        }

        if stderr.contains("already in use") {
            debug!("Container {} already exists", worker.name);
            return Ok(());
        }

        let error_msg = format!(
            "Failed to start container {} for image {}: exit_code={}, stderr='{}'",
            worker.name,
            worker.spec.image,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
        error!("{}", error_msg);
        anyhow::bail!("{}", error_msg);
    }

    /// Reads the state of a container, `None` if it does not exist
    pub async fn inspect(&self, name: &str) -> Result<Option<ContainerState>> {
        let output = self
            .command()
            .args(["inspect", "--type", "container", name])
            .output()
            .await
            .context("Failed to execute podman inspect command")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing(&stderr) {
                return Ok(None);
            }
            anyhow::bail!("podman inspect {} failed: {}", name, stderr.trim());
        }

        parse_inspect(&output.stdout)
    }

    /// Force-removes a container, ignoring containers that are already gone
    pub async fn remove(&self, name: &str) -> Result<()> {
        let output = self
            .command()
            .args(["rm", "-f", name])
            .output()
            .await
            .context("Failed to execute podman rm command")?;

        if output.status.success() {
            debug!("Container {} removed", name);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing(&stderr) {
            return Ok(());
        }
        anyhow::bail!("Failed to remove container {}: {}", name, stderr.trim());
    }

    /// Names of all containers carrying the managed label
    pub async fn list_managed(&self) -> Result<Vec<String>> {
        let filter = format!("label={}=true", MANAGED_LABEL);
        let output = self
            .command()
            .args([
                "ps",
                "-a",
                "--filter",
                filter.as_str(),
                "--format",
                "{{.Names}}",
            ])
            .output()
            .await
            .context("Failed to execute podman ps command")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("podman ps failed: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Arguments for `podman run` of a worker
fn run_args(worker: &Worker) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        worker.name.clone(),
    ];

    for (key, value) in &worker.spec.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }

    for (key, value) in &worker.spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }

    args.extend(resource_args(&worker.spec.resources));
    args.push(worker.spec.image.clone());
    args
}

/// Translates resource limits into podman flags
///
/// Requests have no podman counterpart; only limits are enforced.
fn resource_args(resources: &ResourceRequirements) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(cpus) = resources.limits.cpu.as_deref().and_then(cpu_quantity) {
        args.push("--cpus".to_string());
        args.push(cpus);
    }

    if let Some(memory) = resources.limits.memory.as_deref().and_then(memory_quantity) {
        args.push("--memory".to_string());
        args.push(memory);
    }

    args
}

/// Converts a CPU quantity ("2", "500m") into a podman `--cpus` value
fn cpu_quantity(quantity: &str) -> Option<String> {
    let quantity = quantity.trim();
    match quantity.strip_suffix('m') {
        Some(millis) => {
            let millis: u64 = millis.parse().ok()?;
            Some(format!("{}", millis as f64 / 1000.0))
        }
        None => {
            let cores: f64 = quantity.parse().ok()?;
            (cores > 0.0).then(|| quantity.to_string())
        }
    }
}

/// Converts a memory quantity ("512Mi", "2Gi", "1G") into a podman `--memory` value
fn memory_quantity(quantity: &str) -> Option<String> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(quantity.len());
    let (digits, unit) = quantity.split_at(split);
    let amount: u64 = digits.parse().ok()?;

    let suffix = match unit {
        "" => "b",
        "Ki" | "K" | "k" => "k",
        "Mi" | "M" => "m",
        "Gi" | "G" => "g",
        _ => return None,
    };
    Some(format!("{}{}", amount, suffix))
}

fn is_missing(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such container") || stderr.contains("no such object")
}

fn parse_inspect(stdout: &[u8]) -> Result<Option<ContainerState>> {
    let entries: Vec<InspectEntry> =
        serde_json::from_slice(stdout).context("Failed to parse podman inspect output")?;
    Ok(entries.into_iter().next().map(|entry| entry.state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerjob_core::domain::job::ResourceList;

    fn state(status: &str, exit_code: i32) -> ContainerState {
        ContainerState {
            status: status.to_string(),
            exit_code,
        }
    }

    #[test]
    fn test_container_state_maps_to_worker_phase() {
        assert_eq!(state("created", 0).worker_phase(), WorkerPhase::Pending);
        assert_eq!(state("initialized", 0).worker_phase(), WorkerPhase::Pending);
        assert_eq!(state("running", 0).worker_phase(), WorkerPhase::Running);
        assert_eq!(state("paused", 0).worker_phase(), WorkerPhase::Running);
        assert_eq!(state("exited", 0).worker_phase(), WorkerPhase::Succeeded);
        assert_eq!(state("exited", 137).worker_phase(), WorkerPhase::Failed);
        assert_eq!(state("dead", 0).worker_phase(), WorkerPhase::Failed);
    }

    #[test]
    fn test_cpu_quantity() {
        assert_eq!(cpu_quantity("2").as_deref(), Some("2"));
        assert_eq!(cpu_quantity("500m").as_deref(), Some("0.5"));
        assert_eq!(cpu_quantity("0"), None);
        assert_eq!(cpu_quantity("lots"), None);
    }

    #[test]
    fn test_memory_quantity() {
        assert_eq!(memory_quantity("512Mi").as_deref(), Some("512m"));
        assert_eq!(memory_quantity("2Gi").as_deref(), Some("2g"));
        assert_eq!(memory_quantity("1024").as_deref(), Some("1024b"));
        assert_eq!(memory_quantity("3Ti"), None);
    }

    #[test]
    fn test_resource_args_use_limits() {
        let resources = ResourceRequirements {
            requests: ResourceList {
                cpu: Some("1".to_string()),
                memory: Some("512Mi".to_string()),
            },
            limits: ResourceList {
                cpu: Some("2".to_string()),
                memory: Some("2Gi".to_string()),
            },
        };

        assert_eq!(
            resource_args(&resources),
            vec!["--cpus", "2", "--memory", "2g"]
        );
    }

    #[test]
    fn test_parse_inspect_output() {
        let stdout = br#"[{"Id":"abc","State":{"Status":"exited","ExitCode":1,"Running":false}}]"#;

        assert_eq!(parse_inspect(stdout).unwrap(), Some(state("exited", 1)));
        assert_eq!(parse_inspect(b"[]").unwrap(), None);
    }
}
