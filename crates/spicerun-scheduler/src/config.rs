//! Scheduler configuration.
//!
//! Every field is a required input here. Defaults belong to the layer that
//! reads configuration files (the CLI), not to the scheduler.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spicerun_backend::{BackendRegistry, RegistryBuilder};
use spicerun_spec::PollingPolicy;

use crate::error::{SchedulerError, SchedulerResult};

/// Runtime parameters of a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of workers, and so the maximum number of jobs in flight.
    pub concurrency: usize,
    /// How many times a job may be requeued before it fails.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub retry_backoff_ms: u64,
    /// Upper bound of the retry delay.
    pub retry_backoff_max_ms: u64,
    /// How long terminal jobs stay visible before eviction.
    pub result_ttl_secs: u64,
    /// Directory that holds the per-job working directories.
    pub workspace_root: PathBuf,
    /// Where the job table is persisted, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
    /// Backend to switch to when a backend times out waiting for artifacts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fallbacks: BTreeMap<String, String>,
    /// Per-backend replacements for the artifact polling policy.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub poll_overrides: BTreeMap<String, PollingPolicy>,
}

impl SchedulerConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn retry_backoff_max(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_max_ms)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    /// Fallback backend configured for `backend`.
    pub fn fallback_for(&self, backend: &str) -> Option<&str> {
        self.fallbacks.get(backend).map(String::as_str)
    }

    /// Adds the polling overrides to a registry under construction.
    pub fn apply_poll_overrides(&self, mut builder: RegistryBuilder) -> RegistryBuilder {
        for (id, policy) in &self.poll_overrides {
            builder = builder.polling_override(id.clone(), *policy);
        }
        builder
    }

    /// Checks the configuration against the registry it will run with.
    pub fn validate(&self, registry: &BackendRegistry) -> SchedulerResult<()> {
        let invalid = |msg: String| Err(SchedulerError::InvalidConfig(msg));

        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1".into());
        }
        if self.retry_backoff_ms > self.retry_backoff_max_ms {
            return invalid(format!(
                "retry_backoff_ms ({}) exceeds retry_backoff_max_ms ({})",
                self.retry_backoff_ms, self.retry_backoff_max_ms
            ));
        }
        if self.workspace_root.as_os_str().is_empty() {
            return invalid("workspace_root must not be empty".into());
        }
        for (from, to) in &self.fallbacks {
            if !registry.contains(from) {
                return invalid(format!("fallback configured for unknown backend '{from}'"));
            }
            if !registry.contains(to) {
                return invalid(format!("fallback '{from}' -> '{to}' names an unknown backend"));
            }
            if from == to {
                return invalid(format!("backend '{from}' cannot fall back to itself"));
            }
        }
        for id in self.poll_overrides.keys() {
            if !registry.contains(id) {
                return invalid(format!("polling override for unknown backend '{id}'"));
            }
        }
        Ok(())
    }
}
