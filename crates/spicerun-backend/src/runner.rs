//! Running one simulation end to end.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use spicerun_spec::{
    GenerationMethod, JobError, JobId, JobResult, JobStatus, NetlistArtifact, ParameterOverrides,
    SimulationResult,
};
use tracing::Instrument;

use crate::launcher::{self, ArtifactPaths, LaunchMode};
use crate::logfile;
use crate::monitor;
use crate::netlist::{self, NetlistPlan};
use crate::overrides::stage_input;
use crate::registry::BackendRegistry;
use crate::workspace::JobWorkspace;

/// Progress milestones a runner reports while it works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// The backend process has been launched.
    Running,
    /// The process has exited (or detached) and artifacts are being confirmed.
    AwaitingArtifacts,
}

impl RunPhase {
    pub fn status(&self) -> JobStatus {
        match self {
            RunPhase::Running => JobStatus::Running,
            RunPhase::AwaitingArtifacts => JobStatus::AwaitingArtifacts,
        }
    }
}

/// Receives progress from a runner.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, phase: RunPhase);
}

/// A reporter that drops every update.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _phase: RunPhase) {}
}

/// Everything a runner needs to execute one attempt of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub job_id: JobId,
    pub schematic: PathBuf,
    pub overrides: ParameterOverrides,
    pub backend: String,
    /// Extra backend switches.
    pub switches: Vec<String>,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// A successful run: the decoded result and the workspace holding the
/// artifacts. Dropping the workspace deletes them.
#[derive(Debug)]
pub struct RunOutput {
    pub result: SimulationResult,
    pub workspace: JobWorkspace,
}

/// Executes simulation jobs.
///
/// Dropping the future returned by `run` must stop the backend and release
/// its workspace; this is how running jobs are cancelled.
#[async_trait]
pub trait SimulationRunner: Send + Sync + 'static {
    async fn run(&self, request: RunRequest, progress: &dyn ProgressReporter)
        -> JobResult<RunOutput>;
}

/// Runner that launches real simulator processes.
pub struct ProcessRunner {
    registry: Arc<BackendRegistry>,
    workspace_root: PathBuf,
}

impl ProcessRunner {
    pub fn new(registry: Arc<BackendRegistry>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            workspace_root: workspace_root.into(),
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    async fn run_attempt(
        &self,
        request: RunRequest,
        progress: &dyn ProgressReporter,
    ) -> JobResult<RunOutput> {
        let descriptor = self.registry.lookup(&request.backend)?;
        let plan = netlist::plan(&request.schematic, descriptor)?;
        let workspace = JobWorkspace::create(&self.workspace_root, &request.job_id)?;

        let (input, netlist) = match plan {
            NetlistPlan::Reuse(path) => {
                let staged = stage_input(&path, &workspace, &request.overrides)?;
                let artifact = NetlistArtifact {
                    schematic: request.schematic.clone(),
                    netlist: path,
                    method: GenerationMethod::Reused,
                };
                (staged, Some(artifact))
            }
            NetlistPlan::Direct => {
                let staged = stage_input(&request.schematic, &workspace, &request.overrides)?;
                (staged, None)
            }
            NetlistPlan::Export => {
                let staged = stage_input(&request.schematic, &workspace, &request.overrides)?;
                let artifact = netlist::auto_export(&staged, &request.schematic, descriptor).await?;
                (artifact.netlist.clone(), Some(artifact))
            }
        };

        let paths = ArtifactPaths::for_input(&input);
        let plan = launcher::prepare(descriptor, LaunchMode::Run, &paths, &request.switches)?;
        tracing::info!(command = %plan.display(), "launching backend");
        let mut process = launcher::spawn(&plan)?;
        progress.report(RunPhase::Running);

        let awaiting = AtomicBool::new(false);
        let enter_awaiting = || {
            if !awaiting.swap(true, Ordering::SeqCst) {
                progress.report(RunPhase::AwaitingArtifacts);
            }
        };
        let waited = monitor::await_artifacts(
            &mut process,
            &[paths.log.clone(), paths.raw.clone()],
            &descriptor.polling,
            |_| enter_awaiting(),
        )
        .await;
        let detached = matches!(waited, Ok(ref c) if c.detached);
        let diagnostics = process.finish(detached).await;
        if let Err(timeout) = waited {
            return Err(timeout.into_job_error(&paths.log, &diagnostics.stderr_tail));
        }
        enter_awaiting();

        let raw = spicerun_raw::read_raw_file(&paths.raw, Some(descriptor.dialect))?;
        let plot = raw.into_primary();
        let plot_name = plot.plot_name().to_string();
        let result = SimulationResult::new(
            request.job_id,
            descriptor.id.clone(),
            plot_name,
            plot.into_traces(),
            logfile::excerpt(&paths.log),
            diagnostics,
        )
        .map_err(|e| JobError::parse(paths.raw.display().to_string(), e.to_string()))?
        .with_netlist(netlist);

        tracing::info!(
            traces = result.traces().len(),
            elapsed_ms = result.diagnostics.elapsed_ms,
            "simulation complete"
        );
        Ok(RunOutput { result, workspace })
    }
}

#[async_trait]
impl SimulationRunner for ProcessRunner {
    async fn run(
        &self,
        request: RunRequest,
        progress: &dyn ProgressReporter,
    ) -> JobResult<RunOutput> {
        let span = tracing::info_span!(
            "run",
            job_id = %request.job_id,
            backend = %request.backend,
            attempt = request.attempt
        );
        self.run_attempt(request, progress).instrument(span).await
    }
}
