/*!
 * Error Types
 * Unified sandbox error taxonomy with thiserror and serde support
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sandbox operation result
///
/// # Must Use
/// Sandbox operations can fail and must be handled
#[must_use = "sandbox operations can fail and must be handled"]
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Unified error type for every public sandbox operation
///
/// Permission denials are additionally recorded as violations and raised as
/// events, so callers get a synchronous answer plus an audit trail.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum SandboxError {
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Restricted operation: {0}")]
    RestrictedOperation(String),

    #[error("Process creation failed: {0}")]
    ProcessCreationFailed(String),

    #[error("Network access restricted: {0}")]
    NetworkRestricted(String),

    #[error("Execution blocked: {0}")]
    ExecutionBlocked(String),

    #[error("Sandbox not found: {0}")]
    SandboxNotFound(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SandboxError::SandboxNotFound("s1".to_string());
        assert_eq!(err.to_string(), "Sandbox not found: s1");
    }

    #[test]
    fn test_error_serialization_tag() {
        let err = SandboxError::InvalidPath("/bad\0path".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"invalid_path\""));
    }
}
