//! Configuration file loading.
//!
//! The file is JSON and every field is optional; missing fields take the
//! defaults below. The result is a complete [`SchedulerConfig`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spicerun_backend::BackendRegistry;
use spicerun_scheduler::SchedulerConfig;
use spicerun_spec::PollingPolicy;

pub const DEFAULT_CONCURRENCY: usize = 2;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_RETRY_BACKOFF_MAX_MS: u64 = 30_000;
pub const DEFAULT_RESULT_TTL_SECS: u64 = 3_600;

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "SPICERUN_CONFIG";

/// Contents of a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub retry_backoff_max_ms: Option<u64>,
    pub result_ttl_secs: Option<u64>,
    pub workspace_root: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    #[serde(default)]
    pub fallbacks: BTreeMap<String, String>,
    #[serde(default)]
    pub poll_overrides: BTreeMap<String, PollingPolicy>,
}

impl FileConfig {
    /// Loads `path`, or the file named by `SPICERUN_CONFIG`, or nothing.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(PathBuf::from(p)),
            None => std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        };
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Fills in defaults.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_backoff_ms: self.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
            retry_backoff_max_ms: self
                .retry_backoff_max_ms
                .unwrap_or(DEFAULT_RETRY_BACKOFF_MAX_MS),
            result_ttl_secs: self.result_ttl_secs.unwrap_or(DEFAULT_RESULT_TTL_SECS),
            workspace_root: self
                .workspace_root
                .clone()
                .unwrap_or_else(default_workspace_root),
            state_file: self.state_file.clone(),
            fallbacks: self.fallbacks.clone(),
            poll_overrides: self.poll_overrides.clone(),
        }
    }
}

/// `<tmp>/spicerun`.
pub fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("spicerun")
}

/// Builds the backend registry with the configured polling overrides.
pub fn build_registry(config: &SchedulerConfig) -> Result<BackendRegistry> {
    config
        .apply_poll_overrides(BackendRegistry::builder().with_builtins())
        .build()
        .context("Invalid backend configuration")
}
