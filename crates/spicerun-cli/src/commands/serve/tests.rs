//! Tests for the WebSocket job server.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::Value;
use spicerun_backend::{
    BackendRegistry, JobWorkspace, ProgressReporter, RunOutput, RunPhase, RunRequest,
    SimulationRunner,
};
use spicerun_scheduler::{ClientError, Scheduler, SchedulerConfig, SchedulerHandle};
use spicerun_spec::{JobId, JobResult, LaunchDiagnostics, SimulationResult, WaveformTrace};
use tokio_tungstenite::tungstenite::Message;

use super::handler::{dispatch, handle_request, process_message};
use super::types::{error_codes, ServeRequest, ServeResponse};

/// Succeeds at once with a single `v(out)` trace.
struct InstantRunner {
    root: PathBuf,
}

#[async_trait]
impl SimulationRunner for InstantRunner {
    async fn run(
        &self,
        request: RunRequest,
        progress: &dyn ProgressReporter,
    ) -> JobResult<RunOutput> {
        progress.report(RunPhase::Running);
        progress.report(RunPhase::AwaitingArtifacts);
        let workspace = JobWorkspace::create(&self.root, &request.job_id)?;
        let trace = WaveformTrace::from_real("v(out)", "V", &[0.0, 1e-3], &[0.0, 1.0]).unwrap();
        let result = SimulationResult::new(
            request.job_id,
            request.backend,
            "Transient Analysis",
            vec![trace],
            "",
            LaunchDiagnostics::default(),
        )
        .unwrap();
        Ok(RunOutput { result, workspace })
    }
}

fn start(root: &Path) -> (Scheduler, SchedulerHandle) {
    let config = SchedulerConfig {
        concurrency: 1,
        max_retries: 0,
        retry_backoff_ms: 1,
        retry_backoff_max_ms: 1,
        result_ttl_secs: 3600,
        workspace_root: root.to_path_buf(),
        state_file: None,
        fallbacks: BTreeMap::new(),
        poll_overrides: BTreeMap::new(),
    };
    let runner = Arc::new(InstantRunner {
        root: root.to_path_buf(),
    });
    let scheduler =
        Scheduler::start(config, Arc::new(BackendRegistry::builtin()), runner).unwrap();
    let handle = scheduler.handle();
    (scheduler, handle)
}

fn parse(text: &str) -> ServeResponse {
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn test_invalid_json_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, handle) = start(tmp.path());

    let response = parse(&handle_request(&handle, "{not json").await);
    assert!(!response.success);
    assert_eq!(response.errors[0].code, error_codes::INVALID_REQUEST);
    assert!(response.errors[0].detail.is_none());

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_unknown_request_type_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, handle) = start(tmp.path());

    let response = parse(&handle_request(&handle, r#"{"type": "reboot"}"#).await);
    assert!(!response.success);
    assert_eq!(response.errors[0].code, error_codes::INVALID_REQUEST);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_binary_must_be_utf8() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, handle) = start(tmp.path());

    let text = process_message(&handle, Message::Binary(vec![0xff, 0xfe, 0x00]))
        .await
        .unwrap();
    let response = parse(&text);
    assert_eq!(response.errors[0].code, error_codes::INVALID_UTF8);

    assert!(process_message(&handle, Message::Ping(vec![])).await.is_none());

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_status_of_unknown_job_carries_detail() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, handle) = start(tmp.path());
    let id = JobId::new();

    let response = dispatch(&handle, ServeRequest::Status { job_id: id }).await;
    assert!(!response.success);
    assert_eq!(response.errors[0].code, "CLIENT_001");
    assert_eq!(
        response.errors[0].detail,
        Some(ClientError::JobNotFound { id })
    );

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_submit_unknown_backend() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, handle) = start(tmp.path());

    let request = r#"{"type": "submit", "schematic": "/tmp/rc.net", "backend": "spectre"}"#;
    let response = parse(&handle_request(&handle, request).await);
    assert!(!response.success);
    assert_eq!(
        response.errors[0].detail,
        Some(ClientError::BackendUnknown {
            backend: "spectre".into()
        })
    );

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_submit_then_fetch() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, handle) = start(tmp.path());

    let request =
        r#"{"type": "submit", "schematic": "/tmp/rc.net", "backend": "ngspice", "overrides": {"R1": "2k"}}"#;
    let response = parse(&handle_request(&handle, request).await);
    assert!(response.success, "{:?}", response.errors);
    let id: JobId = serde_json::from_value(response.result.unwrap()["job_id"].clone()).unwrap();

    tokio::time::timeout(Duration::from_secs(10), handle.wait_for_terminal(id))
        .await
        .unwrap()
        .unwrap();

    let fetched = dispatch(&handle, ServeRequest::Fetch { job_id: id }).await;
    assert!(fetched.success);
    let result: SimulationResult = serde_json::from_value(fetched.result.unwrap()).unwrap();
    assert_eq!(result.job_id, id);
    assert_eq!(result.backend, "ngspice");
    assert_eq!(result.trace_names(), vec!["v(out)"]);

    let listed = dispatch(&handle, ServeRequest::List).await;
    let jobs = listed.result.unwrap();
    assert_eq!(jobs.as_array().map(Vec::len), Some(1));
    assert_eq!(jobs[0]["status"], "completed");

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_cancel_finished_job_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, handle) = start(tmp.path());

    let submitted = dispatch(
        &handle,
        ServeRequest::Submit {
            schematic: "/tmp/rc.net".into(),
            overrides: Default::default(),
            backend: "ngspice".into(),
            switches: Vec::new(),
        },
    )
    .await;
    let id: JobId = serde_json::from_value(submitted.result.unwrap()["job_id"].clone()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), handle.wait_for_terminal(id))
        .await
        .unwrap()
        .unwrap();

    let response = dispatch(&handle, ServeRequest::Cancel { job_id: id }).await;
    let ack = response.result.unwrap();
    assert_eq!(ack["already_terminal"], Value::Bool(true));
    assert_eq!(ack["status"], "completed");

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_backends_lists_registry() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, handle) = start(tmp.path());

    let response = dispatch(&handle, ServeRequest::Backends).await;
    let backends = response.result.unwrap();
    let ids: Vec<_> = backends
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&"ltspice".to_string()));
    assert!(ids.contains(&"ngspice".to_string()));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_submit_rejects_positional_switch() {
    let tmp = tempfile::tempdir().unwrap();
    let (scheduler, handle) = start(tmp.path());

    let request = r#"{"type": "submit", "schematic": "/tmp/rc.net", "backend": "ngspice", "switches": ["-ascii", "other.cir"]}"#;
    let response = parse(&handle_request(&handle, request).await);
    assert!(!response.success);
    assert_eq!(response.errors[0].code, "CLIENT_008");
    assert!(handle.list().is_empty());

    scheduler.shutdown().await;
}
