//! Scheduler behaviour against a scripted runner.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use spicerun_backend::{
    BackendRegistry, JobWorkspace, ProgressReporter, RunOutput, RunPhase, RunRequest,
    SimulationRunner,
};
use spicerun_spec::{
    JobError, JobId, JobResult, JobSnapshot, JobStatus, LaunchDiagnostics, NetlistFailureKind,
    SimulationResult, WaveformTrace,
};
use tempfile::TempDir;

use super::*;

const WAIT: Duration = Duration::from_secs(10);

#[derive(Clone)]
enum Behavior {
    Succeed(Duration),
    Fail(JobError),
    Hang,
}

struct FakeRunner {
    behavior: Box<dyn Fn(&RunRequest) -> Behavior + Send + Sync>,
    root: PathBuf,
    attempts: Mutex<Vec<RunRequest>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    abandoned: AtomicUsize,
    workspaces: Mutex<Vec<PathBuf>>,
}

impl FakeRunner {
    fn new(
        root: &Path,
        behavior: impl Fn(&RunRequest) -> Behavior + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            behavior: Box::new(behavior),
            root: root.to_path_buf(),
            attempts: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            abandoned: AtomicUsize::new(0),
            workspaces: Mutex::new(Vec::new()),
        })
    }

    fn attempts_for(&self, id: JobId) -> Vec<RunRequest> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.job_id == id)
            .cloned()
            .collect()
    }

    fn output(&self, request: &RunRequest) -> JobResult<RunOutput> {
        let workspace = JobWorkspace::create(&self.root, &request.job_id)?;
        std::fs::write(workspace.artifact("rc", "raw"), b"raw").unwrap();
        self.workspaces
            .lock()
            .unwrap()
            .push(workspace.path().to_path_buf());
        let trace = WaveformTrace::from_real("v(out)", "V", &[0.0, 1e-3], &[0.0, 1.0]).unwrap();
        let result = SimulationResult::new(
            request.job_id,
            request.backend.clone(),
            "Transient Analysis",
            vec![trace],
            "ok",
            LaunchDiagnostics::default(),
        )
        .unwrap();
        Ok(RunOutput { result, workspace })
    }
}

/// Tracks one in-progress run; counts runs dropped before finishing.
struct RunGuard<'a> {
    runner: &'a FakeRunner,
    finished: bool,
}

impl<'a> RunGuard<'a> {
    fn enter(runner: &'a FakeRunner) -> Self {
        let now = runner.running.fetch_add(1, Ordering::SeqCst) + 1;
        runner.max_running.fetch_max(now, Ordering::SeqCst);
        Self {
            runner,
            finished: false,
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runner.running.fetch_sub(1, Ordering::SeqCst);
        if !self.finished {
            self.runner.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl SimulationRunner for FakeRunner {
    async fn run(
        &self,
        request: RunRequest,
        progress: &dyn ProgressReporter,
    ) -> JobResult<RunOutput> {
        self.attempts.lock().unwrap().push(request.clone());
        let behavior = (self.behavior)(&request);
        let mut guard = RunGuard::enter(self);
        progress.report(RunPhase::Running);

        let outcome = match behavior {
            Behavior::Succeed(delay) => {
                tokio::time::sleep(delay).await;
                progress.report(RunPhase::AwaitingArtifacts);
                self.output(&request)
            }
            Behavior::Fail(error) => Err(error),
            Behavior::Hang => std::future::pending::<JobResult<RunOutput>>().await,
        };
        guard.finished = true;
        outcome
    }
}

fn config(root: &Path, concurrency: usize) -> SchedulerConfig {
    SchedulerConfig {
        concurrency,
        max_retries: 2,
        retry_backoff_ms: 1,
        retry_backoff_max_ms: 10,
        result_ttl_secs: 3600,
        workspace_root: root.to_path_buf(),
        state_file: None,
        fallbacks: BTreeMap::new(),
        poll_overrides: BTreeMap::new(),
    }
}

fn start(config: SchedulerConfig, runner: Arc<FakeRunner>) -> (Scheduler, SchedulerHandle) {
    let scheduler = Scheduler::start(config, Arc::new(BackendRegistry::builtin()), runner).unwrap();
    let handle = scheduler.handle();
    (scheduler, handle)
}

async fn submit(handle: &SchedulerHandle, backend: &str) -> JobId {
    handle
        .submit(SubmitRequest::new("rc.asc", backend))
        .await
        .unwrap()
}

async fn finish(handle: &SchedulerHandle, id: JobId) -> JobSnapshot {
    tokio::time::timeout(WAIT, handle.wait_for_terminal(id))
        .await
        .expect("job did not finish in time")
        .unwrap()
}

/// Polls until `check` holds.
async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn timeout_error() -> JobError {
    JobError::ArtifactTimeout {
        missing: "rc.raw".into(),
        timeout_ms: 100,
        exit_code: Some(0),
    }
}

#[tokio::test]
async fn test_completed_job_can_be_fetched() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| Behavior::Succeed(Duration::from_millis(5)));
    let (scheduler, handle) = start(config(root.path(), 2), runner.clone());

    let id = submit(&handle, "ltspice").await;
    assert!(handle.status(id).await.is_ok());
    let snapshot = finish(&handle, id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.retry_count, 0);
    assert!(snapshot.timestamps.dispatched_at.is_some());
    assert!(snapshot.timestamps.completed_at.is_some());

    let workspace = runner.workspaces.lock().unwrap()[0].clone();
    assert!(workspace.exists());
    let result = handle.fetch(id).await.unwrap();
    assert_eq!(result.job_id, id);
    assert_eq!(result.trace_names(), vec!["v(out)"]);

    // The first fetch releases the artifacts; the result stays available.
    assert!(!workspace.exists());
    assert_eq!(handle.fetch(id).await.unwrap(), result);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_running_count_never_exceeds_concurrency() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| Behavior::Succeed(Duration::from_millis(20)));
    let (scheduler, handle) = start(config(root.path(), 2), runner.clone());

    let mut ids = Vec::new();
    for _ in 0..7 {
        ids.push(submit(&handle, "ngspice").await);
    }
    let in_flight = handle
        .list()
        .iter()
        .filter(|s| s.status.is_in_flight())
        .count();
    assert!(in_flight <= 2);

    for id in ids {
        assert_eq!(finish(&handle, id).await.status, JobStatus::Completed);
    }
    assert!(runner.max_running.load(Ordering::SeqCst) <= 2);
    assert_eq!(runner.attempts.lock().unwrap().len(), 7);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_switches_are_validated_and_forwarded() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| Behavior::Succeed(Duration::ZERO));
    let (scheduler, handle) = start(config(root.path(), 1), runner.clone());

    let err = handle
        .submit(SubmitRequest::new("rc.asc", "ltspice").with_switches(vec!["other.net".into()]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidRequest { .. }), "{err:?}");
    assert!(handle.list().is_empty());

    let id = handle
        .submit(
            SubmitRequest::new("rc.asc", "ltspice")
                .with_switches(vec!["-ascii".into(), "-log".into()]),
        )
        .await
        .unwrap();
    let snapshot = finish(&handle, id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    let attempts = runner.attempts_for(id);
    assert_eq!(attempts[0].switches, vec!["-ascii".to_string(), "-log".to_string()]);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_exit_zero_without_waveform_fails() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| Behavior::Fail(timeout_error()));
    let (scheduler, handle) = start(config(root.path(), 1), runner.clone());

    let id = submit(&handle, "ngspice").await;
    let snapshot = finish(&handle, id).await;
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.error, Some(timeout_error()));
    assert_eq!(runner.attempts_for(id).len(), 1);

    match handle.fetch(id).await.unwrap_err() {
        ClientError::JobFailed { detail, .. } => assert_eq!(detail, timeout_error()),
        other => panic!("unexpected error: {other:?}"),
    }
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_timeout_switches_to_fallback_backend() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |req| {
        if req.backend == "ltspice" {
            Behavior::Fail(timeout_error())
        } else {
            Behavior::Succeed(Duration::ZERO)
        }
    });
    let mut cfg = config(root.path(), 1);
    cfg.fallbacks.insert("ltspice".into(), "ltspice-wine".into());
    let (scheduler, handle) = start(cfg, runner.clone());

    let id = submit(&handle, "ltspice").await;
    let snapshot = finish(&handle, id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.backend, "ltspice-wine");
    assert_eq!(snapshot.retry_count, 1);

    let backends: Vec<_> = runner
        .attempts_for(id)
        .into_iter()
        .map(|r| (r.backend, r.attempt))
        .collect();
    assert_eq!(
        backends,
        vec![("ltspice".to_string(), 1), ("ltspice-wine".to_string(), 2)]
    );
    assert_eq!(handle.fetch(id).await.unwrap().backend, "ltspice-wine");
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_transient_failures_exhaust_retry_bound() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| {
        Behavior::Fail(JobError::ProcessLaunchFailed {
            program: "ngspice".into(),
            message: "resource temporarily unavailable".into(),
            transient: true,
        })
    });
    let cfg = config(root.path(), 1);
    let bound = cfg.max_retries;
    let (scheduler, handle) = start(cfg, runner.clone());

    let id = submit(&handle, "ngspice").await;
    let snapshot = finish(&handle, id).await;
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.retry_count, bound);
    let attempts: Vec<u32> = runner.attempts_for(id).iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, (1..=bound + 1).collect::<Vec<_>>());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_manual_export_fails_without_retry() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| {
        Behavior::Fail(JobError::manual_export_required(
            "export rc.net from LTspice",
        ))
    });
    let (scheduler, handle) = start(config(root.path(), 1), runner.clone());

    let id = submit(&handle, "ngspice").await;
    let snapshot = finish(&handle, id).await;
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.retry_count, 0);
    assert!(matches!(
        snapshot.error,
        Some(JobError::NetlistGenerationFailed {
            kind: NetlistFailureKind::ManualRequired,
            ..
        })
    ));
    assert_eq!(runner.attempts_for(id).len(), 1);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_parse_error_never_returns_partial_result() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| {
        Behavior::Fail(JobError::parse(
            "rc.raw",
            "truncated data: expected 80 bytes, found 32",
        ))
    });
    let (scheduler, handle) = start(config(root.path(), 1), runner);

    let id = submit(&handle, "ltspice").await;
    finish(&handle, id).await;
    match handle.fetch(id).await.unwrap_err() {
        ClientError::JobFailed { detail, .. } => {
            assert!(matches!(detail, JobError::ArtifactParseError { .. }))
        }
        other => panic!("unexpected error: {other:?}"),
    }
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_queued_job_is_never_dispatched() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| Behavior::Hang);
    let (scheduler, handle) = start(config(root.path(), 1), runner.clone());

    let blocker = submit(&handle, "ltspice").await;
    let queued = submit(&handle, "ltspice").await;
    assert_eq!(handle.snapshot(queued).unwrap().status, JobStatus::Queued);

    let ack = handle.cancel(queued).await.unwrap();
    assert_eq!(ack.status, JobStatus::Cancelled);
    assert!(!ack.already_terminal);

    handle.cancel(blocker).await.unwrap();
    finish(&handle, blocker).await;
    eventually(|| runner.running.load(Ordering::SeqCst) == 0).await;
    assert!(runner.attempts_for(queued).is_empty());
    assert!(matches!(
        handle.fetch(queued).await,
        Err(ClientError::JobCancelled { .. })
    ));

    // Cancelling a finished job changes nothing.
    let again = handle.cancel(queued).await.unwrap();
    assert!(again.already_terminal);
    assert_eq!(again.status, JobStatus::Cancelled);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_cancel_running_job_stops_the_run() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |req| {
        if req.schematic.ends_with("hang.asc") {
            Behavior::Hang
        } else {
            Behavior::Succeed(Duration::ZERO)
        }
    });
    let (scheduler, handle) = start(config(root.path(), 1), runner.clone());

    let id = handle
        .submit(SubmitRequest::new("hang.asc", "ltspice"))
        .await
        .unwrap();
    eventually(|| {
        handle
            .snapshot(id)
            .map(|s| s.status == JobStatus::Running)
            .unwrap_or(false)
    })
    .await;
    assert!(matches!(
        handle.fetch(id).await,
        Err(ClientError::JobNotComplete {
            status: JobStatus::Running,
            ..
        })
    ));

    let ack = handle.cancel(id).await.unwrap();
    assert_eq!(ack.status, JobStatus::Cancelled);
    eventually(|| runner.abandoned.load(Ordering::SeqCst) == 1).await;

    // The worker is free again.
    let next = submit(&handle, "ltspice").await;
    assert_eq!(finish(&handle, next).await.status, JobStatus::Completed);
    assert_eq!(handle.snapshot(id).unwrap().status, JobStatus::Cancelled);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_unknown_ids_and_backends() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| Behavior::Hang);
    let (scheduler, handle) = start(config(root.path(), 1), runner);

    let err = handle
        .submit(SubmitRequest::new("rc.asc", "spectre"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ClientError::BackendUnknown {
            backend: "spectre".into()
        }
    );
    assert!(handle.list().is_empty());

    let id = JobId::new();
    assert_eq!(
        handle.status(id).await.unwrap_err(),
        ClientError::JobNotFound { id }
    );
    assert_eq!(
        handle.fetch(id).await.unwrap_err(),
        ClientError::JobNotFound { id }
    );
    assert_eq!(
        handle.cancel(id).await.unwrap_err(),
        ClientError::JobNotFound { id }
    );
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_terminal_jobs_are_evicted_after_ttl() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| Behavior::Succeed(Duration::ZERO));
    let mut cfg = config(root.path(), 1);
    cfg.result_ttl_secs = 0;
    let (scheduler, handle) = start(cfg, runner.clone());

    let id = submit(&handle, "ngspice").await;
    eventually(|| handle.snapshot(id).is_err()).await;
    assert!(matches!(
        handle.fetch(id).await,
        Err(ClientError::JobNotFound { .. })
    ));
    // Eviction also drops the unfetched workspace.
    let workspace = runner.workspaces.lock().unwrap()[0].clone();
    assert!(!workspace.exists());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_state_survives_restart() {
    let root = TempDir::new().unwrap();
    let state = root.path().join("state").join("jobs.json");
    let mut cfg = config(&root.path().join("work"), 1);
    cfg.state_file = Some(state.clone());

    let first = FakeRunner::new(root.path(), |req| {
        if req.backend == "ngspice" {
            Behavior::Hang
        } else {
            Behavior::Succeed(Duration::ZERO)
        }
    });
    let (scheduler, handle) = start(cfg.clone(), first);
    let done = submit(&handle, "ltspice").await;
    finish(&handle, done).await;
    let interrupted = submit(&handle, "ngspice").await;
    eventually(|| {
        handle
            .snapshot(interrupted)
            .map(|s| s.status == JobStatus::Running)
            .unwrap_or(false)
    })
    .await;
    let queued = submit(&handle, "qspice").await;
    scheduler.shutdown().await;
    assert!(state.exists());

    let second = FakeRunner::new(root.path(), |_| Behavior::Succeed(Duration::ZERO));
    let (scheduler, handle) = start(cfg, second.clone());

    assert_eq!(handle.snapshot(done).unwrap().status, JobStatus::Completed);
    assert_eq!(handle.fetch(done).await.unwrap().job_id, done);
    assert!(second.attempts_for(done).is_empty());

    let resumed = finish(&handle, interrupted).await;
    assert_eq!(resumed.status, JobStatus::Completed);
    assert_eq!(resumed.retry_count, 1);
    let queued = finish(&handle, queued).await;
    assert_eq!(queued.status, JobStatus::Completed);
    assert_eq!(queued.retry_count, 0);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let root = TempDir::new().unwrap();
    let runner = FakeRunner::new(root.path(), |_| Behavior::Hang);
    let mut cfg = config(root.path(), 1);
    cfg.fallbacks.insert("ltspice".into(), "spectre".into());
    let err = Scheduler::start(cfg, Arc::new(BackendRegistry::builtin()), runner)
        .err()
        .unwrap();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}
