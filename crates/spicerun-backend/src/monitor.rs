//! Completion monitor.
//!
//! A backend is done when its artifacts are on disk, not when it exits:
//! some simulators exit 0 after failing silently, others detach and keep
//! running. The monitor polls for the expected files while also watching the
//! process, with a bounded timeout and a backed-off interval.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use spicerun_spec::{JobError, PollingPolicy};
use tokio::time::Instant;

use crate::launcher::RunningProcess;
use crate::logfile;

/// Growth factor applied to the poll interval after each empty poll.
const BACKOFF_FACTOR: f64 = 1.5;

/// Artifacts were confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Exit status, if the process exited before confirmation.
    pub exit: Option<ExitStatus>,
    /// Artifacts were confirmed stable while the process was still running.
    pub detached: bool,
}

/// The timeout elapsed before every artifact appeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTimeout {
    pub missing: Vec<PathBuf>,
    pub exit: Option<ExitStatus>,
    pub timeout: Duration,
}

impl PollTimeout {
    /// Names of the missing artifacts, comma separated.
    pub fn missing_names(&self) -> String {
        self.missing
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.display().to_string())
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Maps a run timeout to the job error: a clean (or unknown) exit is an
    /// artifact timeout, a failing exit is a backend failure.
    pub fn into_job_error(self, log: &Path, stderr_tail: &str) -> JobError {
        match self.exit.and_then(|s| s.code()) {
            Some(code) if code != 0 => {
                let mut log_excerpt = logfile::excerpt(log);
                if log_excerpt.is_empty() {
                    log_excerpt = stderr_tail.to_string();
                }
                JobError::BackendFailed {
                    exit_code: code,
                    log_excerpt,
                }
            }
            exit_code => JobError::ArtifactTimeout {
                missing: self.missing_names(),
                timeout_ms: self.timeout.as_millis() as u64,
                exit_code,
            },
        }
    }
}

/// Returns the sizes of all artifacts if every one exists and is non-empty.
fn artifact_sizes(artifacts: &[PathBuf]) -> Option<Vec<u64>> {
    artifacts
        .iter()
        .map(|p| std::fs::metadata(p).ok().map(|m| m.len()).filter(|&len| len > 0))
        .collect()
}

fn missing(artifacts: &[PathBuf]) -> Vec<PathBuf> {
    artifacts
        .iter()
        .filter(|p| {
            std::fs::metadata(p)
                .map(|m| m.len() == 0)
                .unwrap_or(true)
        })
        .cloned()
        .collect()
}

/// Waits until every artifact exists with a non-zero size.
///
/// Once the process has exited, presence is enough. While it is still
/// running, sizes must also be unchanged across two consecutive polls. The
/// exit status does not decide success. `on_exit` is called once when the
/// process is seen to exit. A process still running at the timeout is killed.
pub async fn await_artifacts(
    process: &mut RunningProcess,
    artifacts: &[PathBuf],
    policy: &PollingPolicy,
    mut on_exit: impl FnMut(ExitStatus),
) -> Result<Completion, PollTimeout> {
    let deadline = Instant::now() + policy.timeout();
    let max_interval = policy.max_interval();
    let mut interval = policy.interval();
    let mut previous: Option<Vec<u64>> = None;
    let mut waiting_on_process = true;

    loop {
        if waiting_on_process {
            match process.try_wait() {
                Ok(Some(status)) => {
                    waiting_on_process = false;
                    on_exit(status);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "spicerun::monitor", error = %e, "cannot query backend process; polling artifacts only");
                    waiting_on_process = false;
                }
            }
        }

        let sizes = artifact_sizes(artifacts);
        if let Some(ref current) = sizes {
            if !waiting_on_process {
                return Ok(Completion {
                    exit: process.exit_status(),
                    detached: false,
                });
            }
            if previous.as_ref() == Some(current) {
                return Ok(Completion {
                    exit: None,
                    detached: true,
                });
            }
        }
        previous = sizes;

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let sleep = tokio::time::sleep(interval.min(deadline - now));
        if waiting_on_process {
            tokio::select! {
                result = process.wait() => {
                    waiting_on_process = false;
                    match result {
                        Ok(status) => on_exit(status),
                        Err(e) => tracing::warn!(target: "spicerun::monitor", error = %e, "wait on backend process failed"),
                    }
                    continue;
                }
                _ = sleep => {}
            }
        } else {
            sleep.await;
        }
        interval = interval.mul_f64(BACKOFF_FACTOR).min(max_interval);
    }

    let exit = process.exit_status();
    if exit.is_none() {
        tracing::warn!(target: "spicerun::monitor", program = process.program(), "backend still running at timeout; killing it");
        process.kill().await;
    }
    Err(PollTimeout {
        missing: missing(artifacts),
        exit,
        timeout: policy.timeout(),
    })
}
