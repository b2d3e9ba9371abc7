//! Error types for building the backend registry.

use spicerun_spec::JobFailure;
use thiserror::Error;

/// Result type for registry construction.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised when a backend descriptor is rejected at registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two descriptors share an id.
    #[error("backend '{0}' is registered twice")]
    Duplicate(String),

    /// A descriptor's id is empty.
    #[error("backend id must not be empty")]
    EmptyId,

    /// The capability flags contradict each other or the invocation style.
    #[error("backend '{id}' is inconsistent: {reason}")]
    Inconsistent { id: String, reason: String },

    /// A polling override names a backend that is not registered.
    #[error("polling override for unknown backend '{0}'")]
    UnknownOverride(String),
}

impl RegistryError {
    pub(crate) fn inconsistent(id: &str, reason: impl Into<String>) -> Self {
        Self::Inconsistent {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

impl JobFailure for RegistryError {
    fn code(&self) -> &'static str {
        match self {
            RegistryError::Duplicate(_) => "REGISTRY_001",
            RegistryError::EmptyId => "REGISTRY_002",
            RegistryError::Inconsistent { .. } => "REGISTRY_003",
            RegistryError::UnknownOverride(_) => "REGISTRY_004",
        }
    }

    fn category(&self) -> &'static str {
        "registry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::inconsistent("ngspice", "export without export template");
        assert!(err.to_string().contains("ngspice"));
        assert_eq!(err.code(), "REGISTRY_003");
        assert_eq!(err.category(), "registry");
    }
}
