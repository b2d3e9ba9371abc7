//! Error types for raw waveform decoding.

use spicerun_spec::{JobError, JobFailure, TraceError};
use thiserror::Error;

/// Result type for raw file operations.
pub type RawResult<T> = Result<T, RawError>;

/// Errors that can occur while decoding or encoding a raw file.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RawError {
    /// The input was empty.
    #[error("raw file is empty")]
    Empty,

    /// Header text was not valid UTF-8 / UTF-16.
    #[error("header text is not valid {encoding}")]
    InvalidText { encoding: &'static str },

    /// The header never reached a `Binary:` or `Values:` line.
    #[error("header ended before the data section")]
    MissingDataSection,

    /// A required header field is absent.
    #[error("missing header field '{0}'")]
    MissingField(&'static str),

    /// A header field could not be parsed.
    #[error("invalid value for '{field}': '{value}'")]
    InvalidField { field: &'static str, value: String },

    /// The `Flags:` line contains a flag this decoder does not know.
    #[error("unrecognized encoding flag '{0}'")]
    UnknownFlag(String),

    /// `real` and `complex` were both set.
    #[error("flags declare both real and complex samples")]
    ConflictingFlags,

    /// A line of the variable table is malformed.
    #[error("malformed variable entry '{0}'")]
    MalformedVariable(String),

    /// The variable table does not match `No. Variables`.
    #[error("header declares {declared} variables but lists {listed}")]
    VariableCountMismatch { declared: usize, listed: usize },

    /// Binary data ended before `No. Points` rows were read.
    #[error("truncated data: header declares {points} points ({expected} bytes) but only {found} bytes follow")]
    Truncated {
        points: usize,
        expected: usize,
        found: usize,
    },

    /// ASCII data ended before `No. Points` rows were read.
    #[error("data section holds {found} complete points but header declares {expected}")]
    PointCountMismatch { expected: usize, found: usize },

    /// A point index in ASCII data is out of sequence.
    #[error("point index {found} out of sequence (expected {expected})")]
    PointIndex { expected: usize, found: String },

    /// A sample could not be parsed as a number.
    #[error("invalid number '{token}' at point {point}")]
    InvalidNumber { token: String, point: usize },

    /// Decoded samples violate a trace invariant.
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// Traces handed to the writer are inconsistent.
    #[error("cannot encode plot: {0}")]
    Inconsistent(String),

    /// Writing encoded output failed.
    #[error("write failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for RawError {
    fn from(err: std::io::Error) -> Self {
        RawError::Io(err.to_string())
    }
}

impl RawError {
    /// Converts into the job-level parse error for the named artifact.
    pub fn into_job_error(self, artifact: impl Into<String>) -> JobError {
        JobError::parse(artifact, self.to_string())
    }
}

impl JobFailure for RawError {
    fn code(&self) -> &'static str {
        match self {
            RawError::Empty => "RAW_001",
            RawError::InvalidText { .. } => "RAW_002",
            RawError::MissingDataSection => "RAW_003",
            RawError::MissingField(_) => "RAW_004",
            RawError::InvalidField { .. } => "RAW_005",
            RawError::UnknownFlag(_) => "RAW_006",
            RawError::ConflictingFlags => "RAW_007",
            RawError::MalformedVariable(_) => "RAW_008",
            RawError::VariableCountMismatch { .. } => "RAW_009",
            RawError::Truncated { .. } => "RAW_010",
            RawError::PointCountMismatch { .. } => "RAW_011",
            RawError::PointIndex { .. } => "RAW_012",
            RawError::InvalidNumber { .. } => "RAW_013",
            RawError::Trace(_) => "RAW_014",
            RawError::Inconsistent(_) => "RAW_015",
            RawError::Io(_) => "RAW_016",
        }
    }

    fn category(&self) -> &'static str {
        "raw"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_message() {
        let err = RawError::Truncated {
            points: 10,
            expected: 160,
            found: 80,
        };
        assert!(err.to_string().contains("10 points"));
        assert_eq!(err.code(), "RAW_010");
    }

    #[test]
    fn test_into_job_error() {
        let err = RawError::UnknownFlag("zipped".into()).into_job_error("rc.raw");
        match err {
            JobError::ArtifactParseError { artifact, reason } => {
                assert_eq!(artifact, "rc.raw");
                assert!(reason.contains("zipped"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
