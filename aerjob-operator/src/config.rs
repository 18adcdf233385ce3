//! Operator configuration
//!
//! Defines all configurable parameters for the operator: the HTTP bind
//! address, the object store backend, requeue cadence, controller
//! parallelism and the worker runtime.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::reconciler::policy::RequeuePolicy;

/// Prefix of environment variables forwarded into every worker
pub const WORKER_ENV_PREFIX: &str = "WORKER_ENV_";

/// Which runtime executes worker records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRuntime {
    /// Workers run as podman containers on this host
    Podman,

    /// Worker phases are written to the store by someone else
    None,
}

impl FromStr for WorkerRuntime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "podman" => Ok(WorkerRuntime::Podman),
            "none" | "" => Ok(WorkerRuntime::None),
            other => anyhow::bail!(
                "unknown worker runtime '{}' (expected podman or none)",
                other
            ),
        }
    }
}

/// Operator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Postgres connection string; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// Polling a live worker
    pub fast_requeue: Duration,

    /// After a store error or a retried worker failure
    pub default_requeue: Duration,

    /// After entering a terminal phase
    pub slow_requeue: Duration,

    /// How often every job is reconciled regardless of triggers
    pub resync_interval: Duration,

    /// Upper bound on reconciles running at the same time
    pub max_concurrent_reconciles: usize,

    pub worker_runtime: WorkerRuntime,

    /// How often the worker runtime syncs containers with worker records
    pub runtime_poll_interval: Duration,

    /// Extra environment for every worker
    pub worker_env: BTreeMap<String, String>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(bind_addr: String) -> Self {
        let policy = RequeuePolicy::default();
        Self {
            bind_addr,
            database_url: None,
            fast_requeue: policy.fast,
            default_requeue: policy.default,
            slow_requeue: policy.slow,
            resync_interval: Duration::from_secs(30),
            max_concurrent_reconciles: 4,
            worker_runtime: WorkerRuntime::None,
            runtime_poll_interval: Duration::from_secs(2),
            worker_env: BTreeMap::new(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - OPERATOR_BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - DATABASE_URL (optional, in-memory store when unset)
    /// - FAST_REQUEUE_SECS (optional, default: 5)
    /// - DEFAULT_REQUEUE_SECS (optional, default: 10)
    /// - SLOW_REQUEUE_SECS (optional, default: 60)
    /// - RESYNC_INTERVAL_SECS (optional, default: 30)
    /// - MAX_CONCURRENT_RECONCILES (optional, default: 4)
    /// - WORKER_RUNTIME (optional, podman or none, default: none)
    /// - RUNTIME_POLL_SECS (optional, default: 2)
    /// - WORKER_ENV_<NAME> (optional, forwarded to workers as <NAME>)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Builds configuration from an explicit set of variables
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> anyhow::Result<Self> {
        let vars: BTreeMap<String, String> = vars.into_iter().collect();
        let defaults = Self::default();

        let secs = |key: &str, default: Duration| {
            vars.get(key)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        let worker_runtime = match vars.get("WORKER_RUNTIME") {
            Some(value) => value.parse()?,
            None => defaults.worker_runtime,
        };

        let worker_env = vars
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(WORKER_ENV_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect();

        Ok(Self {
            bind_addr: vars
                .get("OPERATOR_BIND_ADDR")
                .cloned()
                .unwrap_or(defaults.bind_addr),
            database_url: vars
                .get("DATABASE_URL")
                .filter(|url| !url.is_empty())
                .cloned(),
            fast_requeue: secs("FAST_REQUEUE_SECS", defaults.fast_requeue),
            default_requeue: secs("DEFAULT_REQUEUE_SECS", defaults.default_requeue),
            slow_requeue: secs("SLOW_REQUEUE_SECS", defaults.slow_requeue),
            resync_interval: secs("RESYNC_INTERVAL_SECS", defaults.resync_interval),
            max_concurrent_reconciles: vars
                .get("MAX_CONCURRENT_RECONCILES")
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(defaults.max_concurrent_reconciles),
            worker_runtime,
            runtime_poll_interval: secs("RUNTIME_POLL_SECS", defaults.runtime_poll_interval),
            worker_env,
        })
    }

    /// Requeue tiers for the reconciler
    pub fn requeue_policy(&self) -> RequeuePolicy {
        RequeuePolicy {
            fast: self.fast_requeue,
            default: self.default_requeue,
            slow: self.slow_requeue,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                anyhow::bail!("database_url must start with postgres:// or postgresql://");
            }
        }

        if self.fast_requeue.is_zero()
            || self.default_requeue.is_zero()
            || self.slow_requeue.is_zero()
        {
            anyhow::bail!("requeue intervals must be greater than 0");
        }

        if self.resync_interval.is_zero() {
            anyhow::bail!("resync_interval must be greater than 0");
        }

        if self.max_concurrent_reconciles == 0 {
            anyhow::bail!("max_concurrent_reconciles must be greater than 0");
        }

        if self.runtime_poll_interval.is_zero() {
            anyhow::bail!("runtime_poll_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("0.0.0.0:8080".to_string())
    }
}
