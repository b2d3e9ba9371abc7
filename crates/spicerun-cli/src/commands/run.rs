//! Run command implementation
//!
//! Runs one job on an in-process scheduler and waits for it. Ctrl-C cancels
//! the job, which stops the backend process and removes its workspace.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use spicerun_backend::ProcessRunner;
use spicerun_scheduler::{ClientError, JobClient, Scheduler, SchedulerConfig, SubmitRequest};
use spicerun_spec::parse_override_args;

use super::reporting;
use crate::config::{build_registry, FileConfig};

/// Run a single simulation and print its traces.
///
/// # Arguments
/// * `schematic` - Path to the schematic or netlist
/// * `backend` - Backend id
/// * `params` - Raw `--param` values
/// * `switches` - Extra backend switches from `--switch`
/// * `config_path` - Optional config file
/// * `json` - Whether to output machine-readable JSON
///
/// # Returns
/// Exit code: 0 when the job completed, 1 when it failed or was cancelled
pub fn run(
    schematic: &str,
    backend: &str,
    params: &[String],
    switches: &[String],
    config_path: Option<&str>,
    json: bool,
) -> Result<ExitCode> {
    let overrides = parse_override_args(params).context("Invalid --param value")?;
    let schematic = std::fs::canonicalize(Path::new(schematic))
        .with_context(|| format!("Schematic not found: {}", schematic))?;

    let mut config = FileConfig::load(config_path)?.scheduler_config();
    // One-shot runs never resume jobs from an earlier process.
    config.state_file = None;

    let request = SubmitRequest::new(schematic, backend)
        .with_overrides(overrides)
        .with_switches(switches.to_vec());
    let runtime = super::scheduler_runtime()?;
    runtime.block_on(async move {
        let scheduler = start_scheduler(config)?;
        let handle = scheduler.handle();

        let outcome = match handle.submit(request).await {
            Ok(id) => {
                if !json {
                    eprintln!("{} job {}", "Submitted".cyan().bold(), id);
                }
                tokio::select! {
                    waited = handle.wait_for_terminal(id) => match waited {
                        Ok(_) => handle.fetch(id).await,
                        Err(e) => Err(e),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!(job_id = %id, "interrupted, cancelling job");
                        handle.cancel(id).await.and(Err(ClientError::JobCancelled { id }))
                    }
                }
            }
            Err(e) => Err(e),
        };

        scheduler.shutdown().await;
        reporting::report_fetch(outcome, json)
    })
}

/// Builds the registry and runner for `config` and starts a scheduler.
/// Must be called inside a tokio runtime.
pub(crate) fn start_scheduler(config: SchedulerConfig) -> Result<Scheduler> {
    let registry = Arc::new(build_registry(&config)?);
    let runner = Arc::new(ProcessRunner::new(
        registry.clone(),
        config.workspace_root.clone(),
    ));
    Scheduler::start(config, registry, runner).context("Failed to start scheduler")
}
