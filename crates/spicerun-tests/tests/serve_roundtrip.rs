//! Integration tests for the WebSocket job server.
//!
//! These tests verify the server and remote client together by:
//! - Starting a scheduler and server on a dynamic port
//! - Driving it through `RemoteClient`, the same `JobClient` interface the
//!   in-process handle implements
//! - Checking that structured errors survive the round trip
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p spicerun-tests --test serve_roundtrip
//! ```

#![cfg(unix)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use spicerun_backend::ProcessRunner;
use spicerun_cli::commands::serve::serve;
use spicerun_cli::remote::RemoteClient;
use spicerun_scheduler::{ClientError, JobClient, Scheduler, SubmitRequest};
use spicerun_spec::{parse_overrides, JobError, JobId, JobStatus, RawDialect};
use spicerun_tests::{
    rc_netlist, rc_plot, registry_with, scheduler_config, script_backend, write_rc_raw,
    ScriptBackend,
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(20);
const POLL: Duration = Duration::from_millis(20);

struct Server {
    addr: SocketAddr,
    scheduler: Scheduler,
    shutdown: broadcast::Sender<()>,
    task: tokio::task::JoinHandle<()>,
    _workspaces: TempDir,
}

impl Server {
    async fn start(fixtures: &std::path::Path) -> Self {
        let workspaces = TempDir::new().unwrap();
        let backends = vec![
            script_backend(
                "sim",
                &ScriptBackend::CopyRaw {
                    raw: write_rc_raw(fixtures, RawDialect::Spice3),
                },
                Duration::from_millis(1500),
            ),
            script_backend("silent", &ScriptBackend::Silent, Duration::from_millis(300)),
        ];
        let registry = registry_with(backends);
        let runner = Arc::new(ProcessRunner::new(registry.clone(), workspaces.path()));
        let scheduler =
            Scheduler::start(scheduler_config(workspaces.path(), 2), registry, runner).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, _) = broadcast::channel(1);
        let task = tokio::spawn(serve(listener, scheduler.handle(), shutdown.clone()));

        Self {
            addr,
            scheduler,
            shutdown,
            task,
            _workspaces: workspaces,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = tokio::time::timeout(WAIT, self.task).await;
        self.scheduler.shutdown().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_submit_wait_fetch() {
    let fixtures = TempDir::new().unwrap();
    let netlist = rc_netlist(fixtures.path());
    let server = Server::start(fixtures.path()).await;
    let client = RemoteClient::connect(&server.url()).await.unwrap();

    let request =
        SubmitRequest::new(&netlist, "sim").with_overrides(parse_overrides("C1=2u").unwrap());
    let id = client.submit(request).await.unwrap();

    let snapshot = tokio::time::timeout(WAIT, client.wait_for_terminal(id, POLL))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed, "{:?}", snapshot.error);
    assert_eq!(snapshot.backend, "sim");

    let result = client.fetch(id).await.unwrap();
    assert_eq!(result.job_id, id);
    assert_eq!(result.traces(), rc_plot().traces());

    let jobs = client.list().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, id);

    let ack = client.cancel(id).await.unwrap();
    assert!(ack.already_terminal);
    assert_eq!(ack.status, JobStatus::Completed);

    let _ = client.close().await;
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_errors_keep_their_structure() {
    let fixtures = TempDir::new().unwrap();
    let netlist = rc_netlist(fixtures.path());
    let server = Server::start(fixtures.path()).await;
    let client = RemoteClient::connect(&server.url()).await.unwrap();

    let missing = JobId::new();
    assert_eq!(
        client.status(missing).await.unwrap_err(),
        ClientError::JobNotFound { id: missing }
    );
    assert_eq!(
        client
            .submit(SubmitRequest::new(&netlist, "spectre"))
            .await
            .unwrap_err(),
        ClientError::BackendUnknown {
            backend: "spectre".to_string()
        }
    );

    let id = client
        .submit(SubmitRequest::new(&netlist, "silent"))
        .await
        .unwrap();
    let snapshot = tokio::time::timeout(WAIT, client.wait_for_terminal(id, POLL))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);

    match client.fetch(id).await.unwrap_err() {
        ClientError::JobFailed { id: failed, detail } => {
            assert_eq!(failed, id);
            assert!(matches!(detail, JobError::ArtifactTimeout { .. }));
        }
        other => panic!("expected job failure, got {other:?}"),
    }

    let _ = client.close().await;
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_backends_lists_server_registry() {
    let fixtures = TempDir::new().unwrap();
    let server = Server::start(fixtures.path()).await;
    let client = RemoteClient::connect(&server.url()).await.unwrap();

    let backends = client.backends().await.unwrap();
    let ids: Vec<_> = backends.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["silent", "sim"]);
    assert!(backends.iter().all(|b| b.available));

    let _ = client.close().await;
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_to_closed_port_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    match RemoteClient::connect(&format!("ws://{}", addr)).await {
        Err(ClientError::Transport(message)) => assert!(message.contains("cannot connect")),
        Err(other) => panic!("expected transport error, got {other:?}"),
        Ok(_) => panic!("connected to a closed port"),
    }
}
