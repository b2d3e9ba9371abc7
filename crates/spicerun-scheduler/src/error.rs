//! Error types for the scheduler and its clients.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use spicerun_spec::{JobError, JobFailure, JobId, JobStatus};
use thiserror::Error;

/// Result type for starting and configuring the scheduler.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised while starting the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A configuration value is out of range or names an unknown backend.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// The state file exists but could not be read or parsed.
    #[error("cannot load state file {path}: {message}")]
    StateLoad { path: PathBuf, message: String },

    /// The state file could not be written.
    #[error("cannot save state file {path}: {message}")]
    StateSave { path: PathBuf, message: String },
}

impl JobFailure for SchedulerError {
    fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidConfig(_) => "SCHED_001",
            SchedulerError::StateLoad { .. } => "SCHED_002",
            SchedulerError::StateSave { .. } => "SCHED_003",
        }
    }

    fn category(&self) -> &'static str {
        "scheduler"
    }
}

/// Errors returned to clients of the job interface.
///
/// Serializable so that remote clients can reconstruct the exact error the
/// server produced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientError {
    #[error("job {id} not found")]
    JobNotFound { id: JobId },

    #[error("job {id} is not complete (status: {status})")]
    JobNotComplete { id: JobId, status: JobStatus },

    #[error("job {id} failed: {detail}")]
    JobFailed { id: JobId, detail: JobError },

    #[error("job {id} was cancelled")]
    JobCancelled { id: JobId },

    #[error("unknown backend '{backend}'")]
    BackendUnknown { backend: String },

    /// The scheduler has stopped and no longer accepts requests.
    #[error("scheduler is not running")]
    SchedulerClosed,

    /// The remote connection failed or returned something unreadable.
    #[error("transport error: {0}")]
    Transport(String),

    /// The submission was malformed.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl ClientError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

impl JobFailure for ClientError {
    fn code(&self) -> &'static str {
        match self {
            ClientError::JobNotFound { .. } => "CLIENT_001",
            ClientError::JobNotComplete { .. } => "CLIENT_002",
            ClientError::JobFailed { .. } => "CLIENT_003",
            ClientError::JobCancelled { .. } => "CLIENT_004",
            ClientError::BackendUnknown { .. } => "CLIENT_005",
            ClientError::SchedulerClosed => "CLIENT_006",
            ClientError::Transport(_) => "CLIENT_007",
            ClientError::InvalidRequest { .. } => "CLIENT_008",
        }
    }

    fn category(&self) -> &'static str {
        "client"
    }
}
