//! Worker tasks.
//!
//! Each worker owns at most one job at a time. It receives assignments on
//! its own channel, runs them through the [`SimulationRunner`] and reports
//! progress and the outcome back to the coordinator as [`Event`]s.

use std::sync::Arc;

use spicerun_backend::{ProgressReporter, RunOutput, RunPhase, RunRequest, SimulationRunner};
use spicerun_spec::{JobError, JobId, JobResult};
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

/// Messages flowing into the coordinator from workers and timers.
#[derive(Debug)]
pub(crate) enum Event {
    Progress {
        job_id: JobId,
        phase: RunPhase,
    },
    Finished {
        worker: usize,
        job_id: JobId,
        outcome: JobResult<RunOutput>,
    },
    /// A retry backoff elapsed.
    RetryReady(JobId),
}

/// One job handed to a worker.
pub(crate) struct Assignment {
    pub request: RunRequest,
    /// Fires (or is dropped) when the job must stop.
    pub cancel: oneshot::Receiver<()>,
}

struct EventReporter {
    job_id: JobId,
    events: mpsc::UnboundedSender<Event>,
}

impl ProgressReporter for EventReporter {
    fn report(&self, phase: RunPhase) {
        let _ = self.events.send(Event::Progress {
            job_id: self.job_id,
            phase,
        });
    }
}

/// Starts worker `index` and returns the sender for its assignments.
pub(crate) fn spawn_worker(
    index: usize,
    runner: Arc<dyn SimulationRunner>,
    events: mpsc::UnboundedSender<Event>,
) -> mpsc::Sender<Assignment> {
    let (tx, mut rx) = mpsc::channel::<Assignment>(1);
    tokio::spawn(async move {
        while let Some(assignment) = rx.recv().await {
            let job_id = assignment.request.job_id;
            let outcome = run_assignment(runner.clone(), assignment, events.clone())
                .instrument(tracing::info_span!("worker", worker = index, job_id = %job_id))
                .await;
            let finished = Event::Finished {
                worker: index,
                job_id,
                outcome,
            };
            if events.send(finished).is_err() {
                break;
            }
        }
        tracing::debug!(worker = index, "worker stopped");
    });
    tx
}

async fn run_assignment(
    runner: Arc<dyn SimulationRunner>,
    assignment: Assignment,
    events: mpsc::UnboundedSender<Event>,
) -> JobResult<RunOutput> {
    let Assignment {
        request,
        mut cancel,
    } = assignment;
    let reporter = EventReporter {
        job_id: request.job_id,
        events,
    };
    let mut task = tokio::spawn(
        async move { runner.run(request, &reporter).await }.in_current_span(),
    );

    tokio::select! {
        biased;
        _ = &mut cancel => {
            tracing::info!("cancelling running job");
            task.abort();
            // Wait for the run future to be dropped so the process is gone
            // and the workspace removed before the worker reports back.
            let _ = task.await;
            Err(JobError::JobCancelled)
        }
        joined = &mut task => match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "simulation task failed");
                Err(JobError::workspace(format!("simulation task failed: {e}")))
            }
        },
    }
}
