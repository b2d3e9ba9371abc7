//! Error taxonomy for simulation jobs.
//!
//! Every failure a job can end in is a [`JobError`]. Errors are plain data
//! (cloneable, serializable) because they are stored in the job table,
//! persisted to the state file and sent to remote clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for job pipeline operations.
pub type JobResult<T> = Result<T, JobError>;

/// Why a netlist could not be produced for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetlistFailureKind {
    /// The backend cannot execute or export this schematic; a human has to
    /// export the netlist.
    ManualRequired,
    /// The schematic reference does not point at a readable file.
    SchematicMissing,
    /// The backend was asked to export a netlist but never wrote one.
    ExportTimeout,
}

impl NetlistFailureKind {
    /// Returns the stable identifier for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetlistFailureKind::ManualRequired => "manual-required",
            NetlistFailureKind::SchematicMissing => "schematic-missing",
            NetlistFailureKind::ExportTimeout => "export-timeout",
        }
    }
}

impl std::fmt::Display for NetlistFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the scheduler reacts to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Terminal. Surfaced to the client unchanged.
    Fatal,
    /// Retried locally up to the configured bound.
    Transient,
    /// Retried only when a fallback backend is configured.
    Fallback,
    /// Terminal, but not a failure.
    Cancelled,
}

/// Errors a simulation job can end in.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum JobError {
    /// The job names a backend the registry does not know.
    #[error("unknown backend '{backend}'")]
    BackendUnknown { backend: String },

    /// No netlist could be resolved for the job.
    #[error("netlist generation failed ({kind}): {message}")]
    NetlistGenerationFailed {
        kind: NetlistFailureKind,
        message: String,
    },

    /// The backend process could not be started.
    #[error("failed to launch '{program}': {message}")]
    ProcessLaunchFailed {
        program: String,
        message: String,
        transient: bool,
    },

    /// The backend never produced its expected artifacts.
    #[error("backend produced no {missing} within {timeout_ms} ms; it most likely failed silently")]
    ArtifactTimeout {
        missing: String,
        timeout_ms: u64,
        exit_code: Option<i32>,
    },

    /// An artifact was present but could not be decoded.
    #[error("failed to parse {artifact}: {reason}")]
    ArtifactParseError { artifact: String, reason: String },

    /// The backend exited with a failure status and produced no usable output.
    #[error("backend exited with status {exit_code}: {log_excerpt}")]
    BackendFailed { exit_code: i32, log_excerpt: String },

    /// A parameter override could not be applied to the circuit.
    #[error("parameter override failed: {message}")]
    ParameterOverrideFailed { message: String },

    /// The job-scoped working directory could not be prepared.
    #[error("job workspace error: {message}")]
    Workspace { message: String },

    /// The job was cancelled before it finished.
    #[error("job was cancelled")]
    JobCancelled,
}

impl JobError {
    /// Creates a manual-export error carrying the steps a human has to take.
    pub fn manual_export_required(instructions: impl Into<String>) -> Self {
        Self::NetlistGenerationFailed {
            kind: NetlistFailureKind::ManualRequired,
            message: instructions.into(),
        }
    }

    /// Creates a netlist error of the given kind.
    pub fn netlist(kind: NetlistFailureKind, message: impl Into<String>) -> Self {
        Self::NetlistGenerationFailed {
            kind,
            message: message.into(),
        }
    }

    /// Creates a parse error for the named artifact.
    pub fn parse(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArtifactParseError {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    /// Creates a workspace error from any displayable cause.
    pub fn workspace(message: impl std::fmt::Display) -> Self {
        Self::Workspace {
            message: message.to_string(),
        }
    }

    /// Creates a parameter override error.
    pub fn override_failed(message: impl Into<String>) -> Self {
        Self::ParameterOverrideFailed {
            message: message.into(),
        }
    }

    /// Returns how the scheduler should treat this error.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            JobError::ProcessLaunchFailed {
                transient: true, ..
            } => RetryClass::Transient,
            JobError::ArtifactTimeout { .. } => RetryClass::Fallback,
            JobError::JobCancelled => RetryClass::Cancelled,
            _ => RetryClass::Fatal,
        }
    }

    /// Returns true for netlist failures that need a human export step.
    pub fn is_manual_required(&self) -> bool {
        matches!(
            self,
            JobError::NetlistGenerationFailed {
                kind: NetlistFailureKind::ManualRequired,
                ..
            }
        )
    }
}

/// Common reporting interface for errors surfaced to operators.
///
/// Each error type in the workspace implements this trait so that the CLI
/// and the server can render stable codes without matching on every enum.
pub trait JobFailure: std::error::Error {
    /// Stable error code such as `JOB_004`.
    fn code(&self) -> &'static str;

    /// Human-readable message.
    fn message(&self) -> String {
        self.to_string()
    }

    /// Error category used for grouping (`job`, `client`, `raw`, ...).
    fn category(&self) -> &'static str;
}

impl JobFailure for JobError {
    fn code(&self) -> &'static str {
        match self {
            JobError::BackendUnknown { .. } => "JOB_001",
            JobError::NetlistGenerationFailed { .. } => "JOB_002",
            JobError::ProcessLaunchFailed { .. } => "JOB_003",
            JobError::ArtifactTimeout { .. } => "JOB_004",
            JobError::ArtifactParseError { .. } => "JOB_005",
            JobError::BackendFailed { .. } => "JOB_006",
            JobError::ParameterOverrideFailed { .. } => "JOB_007",
            JobError::Workspace { .. } => "JOB_008",
            JobError::JobCancelled => "JOB_009",
        }
    }

    fn category(&self) -> &'static str {
        "job"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classes() {
        let transient = JobError::ProcessLaunchFailed {
            program: "ltspice".into(),
            message: "resource temporarily unavailable".into(),
            transient: true,
        };
        assert_eq!(transient.retry_class(), RetryClass::Transient);

        let missing = JobError::ProcessLaunchFailed {
            program: "ltspice".into(),
            message: "not found".into(),
            transient: false,
        };
        assert_eq!(missing.retry_class(), RetryClass::Fatal);

        let timeout = JobError::ArtifactTimeout {
            missing: "waveform".into(),
            timeout_ms: 100,
            exit_code: Some(0),
        };
        assert_eq!(timeout.retry_class(), RetryClass::Fallback);

        assert_eq!(
            JobError::manual_export_required("export it").retry_class(),
            RetryClass::Fatal
        );
        assert_eq!(JobError::JobCancelled.retry_class(), RetryClass::Cancelled);
    }

    #[test]
    fn test_error_display_and_codes() {
        let err = JobError::manual_export_required("File > Export Netlist");
        assert!(err.is_manual_required());
        assert!(err.to_string().contains("manual-required"));
        assert!(err.to_string().contains("File > Export Netlist"));
        assert_eq!(err.code(), "JOB_002");
        assert_eq!(err.category(), "job");
    }

    #[test]
    fn test_error_serializes_with_error_tag() {
        let err = JobError::netlist(NetlistFailureKind::ExportTimeout, "no .net after 5s");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "netlist_generation_failed");
        assert_eq!(json["kind"], "export-timeout");

        let back: JobError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }
}
