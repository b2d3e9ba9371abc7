//! The job client interface.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spicerun_spec::{JobId, JobSnapshot, JobStatus, ParameterOverrides, SimulationResult};

use crate::error::ClientResult;

/// A request to run one simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub schematic: PathBuf,
    #[serde(default)]
    pub overrides: ParameterOverrides,
    pub backend: String,
    /// Extra backend switches, such as `-ascii`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub switches: Vec<String>,
}

impl SubmitRequest {
    pub fn new(schematic: impl Into<PathBuf>, backend: impl Into<String>) -> Self {
        Self {
            schematic: schematic.into(),
            overrides: ParameterOverrides::new(),
            backend: backend.into(),
            switches: Vec::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: ParameterOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_switches(mut self, switches: Vec<String>) -> Self {
        self.switches = switches;
        self
    }
}

/// Acknowledgement of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    pub id: JobId,
    /// Status after the request was handled.
    pub status: JobStatus,
    /// The job had already finished; nothing was changed.
    pub already_terminal: bool,
}

/// Operations a client can perform on the scheduler.
///
/// Implemented in process by [`SchedulerHandle`](crate::SchedulerHandle) and
/// over WebSocket by the CLI's remote client.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Queues a job and returns its id without waiting for it to run.
    async fn submit(&self, request: SubmitRequest) -> ClientResult<JobId>;

    /// Latest published snapshot of a job.
    async fn status(&self, id: JobId) -> ClientResult<JobSnapshot>;

    /// Result of a completed job.
    async fn fetch(&self, id: JobId) -> ClientResult<SimulationResult>;

    /// Cancels a job. Cancelling a finished job is a no-op.
    async fn cancel(&self, id: JobId) -> ClientResult<CancelAck>;
}
