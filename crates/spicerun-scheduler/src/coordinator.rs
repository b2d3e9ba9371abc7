//! The coordinator task.
//!
//! The coordinator is the only writer of the job table. Clients talk to it
//! through [`Command`]s, workers and retry timers through [`Event`]s, and
//! every change is published as a fresh snapshot table on a watch channel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use spicerun_backend::{BackendRegistry, JobWorkspace, RunOutput, RunPhase, RunRequest};
use spicerun_spec::{
    validate_switches, JobError, JobFailure, JobId, JobSnapshot, JobStatus, SimulationJob,
    SimulationResult,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::client::{CancelAck, SubmitRequest};
use crate::config::SchedulerConfig;
use crate::error::{ClientError, ClientResult};
use crate::persist::{PersistedJob, StateFile};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::worker::{Assignment, Event};

/// Snapshots of every known job, keyed by id.
pub type JobTable = HashMap<JobId, JobSnapshot>;

/// Requests from clients.
pub(crate) enum Command {
    Submit {
        request: SubmitRequest,
        reply: oneshot::Sender<ClientResult<JobId>>,
    },
    Fetch {
        id: JobId,
        reply: oneshot::Sender<ClientResult<SimulationResult>>,
    },
    Cancel {
        id: JobId,
        reply: oneshot::Sender<ClientResult<CancelAck>>,
    },
    Shutdown,
}

struct JobRecord {
    job: SimulationJob,
    result: Option<SimulationResult>,
    /// Artifacts of the completed run, kept until the first fetch.
    workspace: Option<JobWorkspace>,
    /// Stops the worker running this job.
    cancel: Option<oneshot::Sender<()>>,
    /// Requeued, waiting for the backoff timer.
    retry_pending: bool,
    terminal_since: Option<Instant>,
}

impl JobRecord {
    fn new(job: SimulationJob) -> Self {
        let terminal_since = job.status().is_terminal().then(Instant::now);
        Self {
            job,
            result: None,
            workspace: None,
            cancel: None,
            retry_pending: false,
            terminal_since,
        }
    }

    fn finish(&mut self) {
        self.cancel = None;
        self.retry_pending = false;
        self.terminal_since = Some(Instant::now());
    }
}

pub(crate) struct Coordinator {
    config: SchedulerConfig,
    registry: Arc<BackendRegistry>,
    retry: RetryPolicy,
    jobs: HashMap<JobId, JobRecord>,
    queue: VecDeque<JobId>,
    workers: Vec<mpsc::Sender<Assignment>>,
    idle: VecDeque<usize>,
    events: mpsc::UnboundedSender<Event>,
    snapshots: watch::Sender<Arc<JobTable>>,
    state: Option<StateFile>,
}

impl Coordinator {
    pub(crate) fn new(
        config: SchedulerConfig,
        registry: Arc<BackendRegistry>,
        workers: Vec<mpsc::Sender<Assignment>>,
        events: mpsc::UnboundedSender<Event>,
        snapshots: watch::Sender<Arc<JobTable>>,
    ) -> Self {
        let state = config.state_file.clone().map(StateFile::new);
        Self {
            retry: RetryPolicy::from_config(&config),
            idle: (0..workers.len()).collect(),
            config,
            registry,
            jobs: HashMap::new(),
            queue: VecDeque::new(),
            workers,
            events,
            snapshots,
            state,
        }
    }

    /// Loads persisted jobs. Terminal jobs stay visible for polling, queued
    /// jobs are enqueued again and jobs interrupted mid-run count a retry.
    pub(crate) fn restore(&mut self, persisted: Vec<PersistedJob>) {
        let mut jobs = persisted;
        jobs.sort_by_key(|p| p.job.timestamps.submitted_at);

        for PersistedJob { mut job, result } in jobs {
            let id = job.id;
            match job.status() {
                JobStatus::Queued => self.queue.push_back(id),
                status if status.is_in_flight() => {
                    if job.retry_count() < self.retry.max_retries {
                        // Legal from every in-flight state; increments the retry count.
                        let _ = job.transition(JobStatus::Queued);
                        self.queue.push_back(id);
                    } else {
                        let _ = job.fail(JobError::workspace(
                            "interrupted by a scheduler restart with no retries left",
                        ));
                    }
                }
                _ => {}
            }
            tracing::debug!(job_id = %id, status = %job.status(), "restored job");
            let mut record = JobRecord::new(job);
            record.result = result;
            self.jobs.insert(id, record);
        }
        if !self.jobs.is_empty() {
            tracing::info!(
                jobs = self.jobs.len(),
                queued = self.queue.len(),
                "restored job table"
            );
        }
        self.commit();
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        let mut eviction = tokio::time::interval(eviction_period(self.config.result_ttl()));
        eviction.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = events.recv() => self.handle_event(event),
                _ = eviction.tick() => {
                    if self.evict_expired() == 0 {
                        continue;
                    }
                }
            }
            self.commit();
        }

        // Dropping the cancel senders stops every running job.
        let in_flight = self.jobs.values().filter(|r| r.cancel.is_some()).count();
        tracing::info!(in_flight, queued = self.queue.len(), "scheduler stopping");
    }

    /// Dispatches what it can, then publishes and persists the table.
    fn commit(&mut self) {
        self.dispatch();
        self.publish();
        self.persist();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { request, reply } => {
                let _ = reply.send(self.submit(request));
            }
            Command::Fetch { id, reply } => {
                let _ = reply.send(self.fetch(id));
            }
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.cancel(id));
            }
            Command::Shutdown => {}
        }
    }

    fn submit(&mut self, request: SubmitRequest) -> ClientResult<JobId> {
        if !self.registry.contains(&request.backend) {
            return Err(ClientError::BackendUnknown {
                backend: request.backend,
            });
        }
        validate_switches(&request.switches).map_err(|e| ClientError::InvalidRequest {
            message: e.to_string(),
        })?;
        let job = SimulationJob::new(request.schematic, request.overrides, request.backend)
            .with_switches(request.switches);
        let id = job.id;
        tracing::info!(
            job_id = %id,
            backend = %job.backend,
            schematic = %job.schematic.display(),
            "job submitted"
        );
        self.jobs.insert(id, JobRecord::new(job));
        self.queue.push_back(id);
        Ok(id)
    }

    fn fetch(&mut self, id: JobId) -> ClientResult<SimulationResult> {
        let record = self
            .jobs
            .get_mut(&id)
            .ok_or(ClientError::JobNotFound { id })?;
        match record.job.status() {
            JobStatus::Completed => {}
            JobStatus::Failed => {
                return Err(ClientError::JobFailed {
                    id,
                    detail: record
                        .job
                        .error
                        .clone()
                        .unwrap_or_else(|| JobError::workspace("failed without detail")),
                })
            }
            JobStatus::Cancelled => return Err(ClientError::JobCancelled { id }),
            status => return Err(ClientError::JobNotComplete { id, status }),
        }

        let result = record
            .result
            .clone()
            .ok_or_else(|| ClientError::JobFailed {
                id,
                detail: JobError::workspace("result is no longer available"),
            })?;
        if let Some(workspace) = record.workspace.take() {
            tracing::debug!(job_id = %id, path = %workspace.path().display(), "releasing workspace");
        }
        Ok(result)
    }

    fn cancel(&mut self, id: JobId) -> ClientResult<CancelAck> {
        let record = self
            .jobs
            .get_mut(&id)
            .ok_or(ClientError::JobNotFound { id })?;
        let status = record.job.status();
        if status.is_terminal() {
            return Ok(CancelAck {
                id,
                status,
                already_terminal: true,
            });
        }

        if status == JobStatus::Queued {
            self.queue.retain(|queued| *queued != id);
        } else if let Some(cancel) = record.cancel.take() {
            let _ = cancel.send(());
        }
        if let Err(e) = record.job.transition(JobStatus::Cancelled) {
            tracing::error!(job_id = %id, error = %e, "cannot cancel job");
        }
        record.finish();
        tracing::info!(job_id = %id, from = %status, "job cancelled");
        Ok(CancelAck {
            id,
            status: record.job.status(),
            already_terminal: false,
        })
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Progress { job_id, phase } => self.progress(job_id, phase),
            Event::Finished {
                worker,
                job_id,
                outcome,
            } => {
                self.idle.push_back(worker);
                self.finished(job_id, outcome);
            }
            Event::RetryReady(id) => {
                if let Some(record) = self.jobs.get_mut(&id) {
                    if record.retry_pending && record.job.status() == JobStatus::Queued {
                        record.retry_pending = false;
                        self.queue.push_back(id);
                    }
                }
            }
        }
    }

    fn progress(&mut self, id: JobId, phase: RunPhase) {
        let Some(record) = self.jobs.get_mut(&id) else {
            return;
        };
        if !record.job.status().is_in_flight() {
            return;
        }
        if let Err(e) = record.job.advance_to(phase.status()) {
            tracing::debug!(job_id = %id, error = %e, "ignoring stale progress");
        }
    }

    fn finished(&mut self, id: JobId, outcome: Result<RunOutput, JobError>) {
        let Some(record) = self.jobs.get_mut(&id) else {
            return;
        };
        record.cancel = None;
        if record.job.status().is_terminal() {
            tracing::debug!(job_id = %id, status = %record.job.status(), "discarding outcome of finished job");
            return;
        }

        match outcome {
            Ok(output) => {
                if let Err(e) = record.job.advance_to(JobStatus::Completed) {
                    tracing::error!(job_id = %id, error = %e, "cannot complete job");
                    let _ = record.job.fail(JobError::workspace(e));
                } else {
                    tracing::info!(
                        job_id = %id,
                        backend = %output.result.backend,
                        traces = output.result.traces().len(),
                        "job completed"
                    );
                    record.result = Some(output.result);
                    record.workspace = Some(output.workspace);
                }
                record.finish();
            }
            Err(JobError::JobCancelled) => {
                let _ = record.job.transition(JobStatus::Cancelled);
                record.finish();
            }
            Err(error) => self.failed(id, error),
        }
    }

    fn failed(&mut self, id: JobId, error: JobError) {
        let Some(record) = self.jobs.get_mut(&id) else {
            return;
        };
        match self.retry.decide(&record.job, &error, &self.config) {
            RetryDecision::Retry { delay } => {
                if let Err(e) = record.job.transition(JobStatus::Queued) {
                    tracing::error!(job_id = %id, error = %e, "cannot requeue job");
                    return;
                }
                tracing::warn!(
                    job_id = %id,
                    code = error.code(),
                    error = %error,
                    retry = record.job.retry_count(),
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed; retrying"
                );
                if delay.is_zero() {
                    self.queue.push_back(id);
                } else {
                    record.retry_pending = true;
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = events.send(Event::RetryReady(id));
                    });
                }
            }
            RetryDecision::Fallback { backend } => {
                tracing::warn!(
                    job_id = %id,
                    code = error.code(),
                    from = %record.job.backend,
                    to = %backend,
                    "artifacts timed out; switching to fallback backend"
                );
                record.job.switch_backend(backend);
                if let Err(e) = record.job.transition(JobStatus::Queued) {
                    tracing::error!(job_id = %id, error = %e, "cannot requeue job");
                    return;
                }
                self.queue.push_back(id);
            }
            RetryDecision::Fail => {
                tracing::error!(
                    job_id = %id,
                    code = error.code(),
                    error = %error,
                    retries = record.job.retry_count(),
                    "job failed"
                );
                if let Err(e) = record.job.fail(error) {
                    tracing::error!(job_id = %id, error = %e, "cannot fail job");
                }
                record.finish();
            }
        }
    }

    /// Hands queued jobs to idle workers in FIFO order.
    fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            let Some(worker) = self.idle.pop_front() else {
                break;
            };
            let Some(id) = self.queue.pop_front() else {
                self.idle.push_front(worker);
                break;
            };
            let Some(record) = self.jobs.get_mut(&id) else {
                self.idle.push_front(worker);
                continue;
            };
            if let Err(e) = record.job.transition(JobStatus::Dispatched) {
                tracing::warn!(job_id = %id, error = %e, "skipping queued job");
                self.idle.push_front(worker);
                continue;
            }

            let (cancel_tx, cancel_rx) = oneshot::channel();
            record.cancel = Some(cancel_tx);
            let request = RunRequest {
                job_id: id,
                schematic: record.job.schematic.clone(),
                overrides: record.job.overrides.clone(),
                backend: record.job.backend.clone(),
                switches: record.job.switches.clone(),
                attempt: record.job.retry_count() + 1,
            };
            tracing::info!(
                job_id = %id,
                backend = %request.backend,
                attempt = request.attempt,
                worker,
                "job dispatched"
            );

            let assignment = Assignment {
                request,
                cancel: cancel_rx,
            };
            if self.workers[worker].try_send(assignment).is_err() {
                // The worker is gone; it never returns to the idle pool.
                tracing::error!(job_id = %id, worker, "worker is not accepting jobs");
                let _ = record
                    .job
                    .fail(JobError::workspace(format!("worker {worker} is not running")));
                record.finish();
            }
        }
    }

    /// Removes terminal jobs older than the result TTL.
    fn evict_expired(&mut self) -> usize {
        let ttl = self.config.result_ttl();
        let now = Instant::now();
        let before = self.jobs.len();
        self.jobs.retain(|id, record| match record.terminal_since {
            Some(since) if now.duration_since(since) >= ttl => {
                tracing::debug!(job_id = %id, "evicting job");
                false
            }
            _ => true,
        });
        before - self.jobs.len()
    }

    fn publish(&self) {
        let table: JobTable = self
            .jobs
            .iter()
            .map(|(id, record)| (*id, record.job.snapshot()))
            .collect();
        self.snapshots.send_replace(Arc::new(table));
    }

    fn persist(&self) {
        let Some(state) = &self.state else {
            return;
        };
        let jobs = self
            .jobs
            .values()
            .map(|record| (&record.job, record.result.as_ref()));
        if let Err(e) = state.save(jobs) {
            tracing::warn!(code = e.code(), error = %e, "cannot persist job table");
        }
    }
}

/// How often terminal jobs are checked for expiry.
fn eviction_period(ttl: Duration) -> Duration {
    (ttl / 4).clamp(Duration::from_millis(50), Duration::from_secs(30))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_period_bounds() {
        assert_eq!(eviction_period(Duration::ZERO), Duration::from_millis(50));
        assert_eq!(eviction_period(Duration::from_secs(8)), Duration::from_secs(2));
        assert_eq!(eviction_period(Duration::from_secs(86400)), Duration::from_secs(30));
    }
}
