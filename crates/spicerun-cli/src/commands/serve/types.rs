//! Request and response types for the WebSocket job server.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spicerun_scheduler::ClientError;
use spicerun_spec::{JobFailure, JobId, ParameterOverrides};

/// Error codes for failures outside the job interface itself.
pub mod error_codes {
    /// Binary frame was not UTF-8.
    pub const INVALID_UTF8: &str = "SERVE_001";
    /// Request JSON did not parse.
    pub const INVALID_REQUEST: &str = "SERVE_002";
    /// The response could not be serialized.
    pub const SERIALIZE: &str = "SERVE_003";
}

/// Request types supported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServeRequest {
    /// Queue a job. Paths are resolved on the server.
    Submit {
        schematic: PathBuf,
        #[serde(default)]
        overrides: ParameterOverrides,
        backend: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        switches: Vec<String>,
    },
    /// Latest snapshot of a job.
    Status { job_id: JobId },
    /// Result of a completed job.
    Fetch { job_id: JobId },
    /// Cancel a job.
    Cancel { job_id: JobId },
    /// Snapshots of every job the server knows.
    List,
    /// Backends configured on the server.
    Backends,
}

/// One error in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
    /// The structured client error, when the failure came from the job
    /// interface. Remote clients rebuild the error from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ClientError>,
}

impl WireError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            detail: None,
        }
    }
}

impl From<ClientError> for WireError {
    fn from(error: ClientError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.message(),
            detail: Some(error),
        }
    }
}

/// Response to every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<WireError>,
}

impl ServeResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            errors: Vec::new(),
        }
    }

    pub fn error(error: impl Into<WireError>) -> Self {
        Self {
            success: false,
            result: None,
            errors: vec![error.into()],
        }
    }
}
