//! Simulation job records and the job state machine.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::JobError;
use crate::overrides::ParameterOverrides;

/// Unique identifier of a simulation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random job id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns a short prefix for log lines and directory names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(JobId)
    }
}

/// Lifecycle state of a simulation job.
///
/// ```text
/// Queued -> Dispatched -> Running -> AwaitingArtifacts -> Completed
///    |           |           |               |
///    |           +-----------+---------------+--> Failed
///    |           +-----------+---------------+--> Queued (retry)
///    +-----------+-----------+---------------+--> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a free worker.
    Queued,
    /// Assigned to a worker; netlist resolution and launch in progress.
    Dispatched,
    /// The backend process is running.
    Running,
    /// The process has exited (or detached); waiting for log and waveform.
    AwaitingArtifacts,
    /// Artifacts confirmed and decoded.
    Completed,
    /// Terminal failure; the job carries an error detail.
    Failed,
    /// Cancelled by a client.
    Cancelled,
}

impl JobStatus {
    /// Returns the stable identifier for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Dispatched => "dispatched",
            JobStatus::Running => "running",
            JobStatus::AwaitingArtifacts => "awaiting_artifacts",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns true while a worker owns the job.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobStatus::Dispatched | JobStatus::Running | JobStatus::AwaitingArtifacts
        )
    }

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (*self, next) {
            (Queued, Dispatched) | (Queued, Cancelled) => true,
            (Dispatched, Running) => true,
            (Running, AwaitingArtifacts) => true,
            (AwaitingArtifacts, Completed) => true,
            (Dispatched | Running | AwaitingArtifacts, Queued | Failed | Cancelled) => true,
            _ => false,
        }
    }

    /// Returns the next status on the success path, if any.
    pub fn next_on_success(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Queued => Some(JobStatus::Dispatched),
            JobStatus::Dispatched => Some(JobStatus::Running),
            JobStatus::Running => Some(JobStatus::AwaitingArtifacts),
            JobStatus::AwaitingArtifacts => Some(JobStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An illegal state change was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Lifecycle timestamps of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTimestamps {
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One request to run a simulation and decode its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationJob {
    pub id: JobId,
    pub schematic: PathBuf,
    #[serde(default)]
    pub overrides: ParameterOverrides,
    pub backend: String,
    /// Extra backend switches for every attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub switches: Vec<String>,
    status: JobStatus,
    retry_count: u32,
    pub timestamps: JobTimestamps,
    /// Backend the job was originally submitted to, set once a fallback
    /// backend has taken over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl SimulationJob {
    /// Creates a new queued job.
    pub fn new(
        schematic: impl Into<PathBuf>,
        overrides: ParameterOverrides,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            schematic: schematic.into(),
            overrides,
            backend: backend.into(),
            switches: Vec::new(),
            status: JobStatus::Queued,
            retry_count: 0,
            timestamps: JobTimestamps {
                submitted_at: Utc::now(),
                dispatched_at: None,
                completed_at: None,
            },
            fallback_from: None,
            error: None,
        }
    }

    pub fn with_switches(mut self, switches: Vec<String>) -> Self {
        self.switches = switches;
        self
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Number of times the job has been requeued.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Moves the job to `next`, enforcing the state machine.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        match next {
            JobStatus::Dispatched => self.timestamps.dispatched_at = Some(now),
            JobStatus::Queued => {
                self.retry_count += 1;
                self.timestamps.dispatched_at = None;
            }
            status if status.is_terminal() => self.timestamps.completed_at = Some(now),
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    /// Walks the success path until `target` is reached.
    ///
    /// Every intermediate state is visited, so a worker that finished without
    /// reporting its progress still produces a legal history.
    pub fn advance_to(&mut self, target: JobStatus) -> Result<(), TransitionError> {
        let mut path = Vec::new();
        let mut cursor = self.status;
        while cursor != target {
            cursor = cursor.next_on_success().ok_or(TransitionError {
                from: self.status,
                to: target,
            })?;
            path.push(cursor);
        }
        for next in path {
            self.transition(next)?;
        }
        Ok(())
    }

    /// Marks the job as failed with the given error.
    pub fn fail(&mut self, error: JobError) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Switches the job to a fallback backend before it is requeued.
    pub fn switch_backend(&mut self, fallback: impl Into<String>) {
        let previous = std::mem::replace(&mut self.backend, fallback.into());
        self.fallback_from.get_or_insert(previous);
    }

    /// Returns a read-only snapshot for clients.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            schematic: self.schematic.clone(),
            backend: self.backend.clone(),
            status: self.status,
            retry_count: self.retry_count,
            timestamps: self.timestamps.clone(),
            error: self.error.clone(),
        }
    }
}

/// Read-only view of a job as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub schematic: PathBuf,
    pub backend: String,
    pub status: JobStatus,
    pub retry_count: u32,
    pub timestamps: JobTimestamps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> SimulationJob {
        SimulationJob::new("rc.asc", ParameterOverrides::new(), "ltspice")
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = job();
        for next in [
            JobStatus::Dispatched,
            JobStatus::Running,
            JobStatus::AwaitingArtifacts,
            JobStatus::Completed,
        ] {
            job.transition(next).unwrap();
        }
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.timestamps.dispatched_at.is_some());
        assert!(job.timestamps.completed_at.is_some());
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let mut job = job();
        let err = job.transition(JobStatus::Running).unwrap_err();
        assert_eq!(err.from, JobStatus::Queued);
        assert_eq!(err.to, JobStatus::Running);

        job.transition(JobStatus::Dispatched).unwrap();
        assert!(job.transition(JobStatus::Completed).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            for next in [
                JobStatus::Queued,
                JobStatus::Dispatched,
                JobStatus::Running,
                JobStatus::AwaitingArtifacts,
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_retry_increments_count() {
        let mut job = job();
        job.transition(JobStatus::Dispatched).unwrap();
        job.transition(JobStatus::Queued).unwrap();
        assert_eq!(job.retry_count(), 1);
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(job.timestamps.dispatched_at.is_none());
    }

    #[test]
    fn test_advance_visits_intermediate_states() {
        let mut job = job();
        job.transition(JobStatus::Dispatched).unwrap();
        job.advance_to(JobStatus::Completed).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);

        let mut job = self::job();
        job.transition(JobStatus::Dispatched).unwrap();
        assert!(job.advance_to(JobStatus::Cancelled).is_err());
        assert_eq!(job.status(), JobStatus::Dispatched);
    }

    #[test]
    fn test_switch_backend_remembers_original() {
        let mut job = job();
        job.switch_backend("ltspice-wine");
        job.switch_backend("ngspice");
        assert_eq!(job.backend, "ngspice");
        assert_eq!(job.fallback_from.as_deref(), Some("ltspice"));
    }

    #[test]
    fn test_switches_survive_persistence() {
        let job = job().with_switches(vec!["-ascii".into(), "-log".into()]);
        let json = serde_json::to_string(&job).unwrap();
        let back: SimulationJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.switches, vec!["-ascii", "-log"]);

        let plain = serde_json::to_value(self::job()).unwrap();
        assert!(plain.get("switches").is_none());
    }

    #[test]
    fn test_job_id_round_trips_through_str() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.short().len(), 8);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }
}
