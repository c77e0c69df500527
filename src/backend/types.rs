/*!
 * Platform Backend Types
 * Shared types for the per-OS isolation providers
 */

use crate::core::types::SandboxId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend operation result
///
/// # Must Use
/// Backend operations can fail and must be handled
#[must_use = "backend operations can fail and must be handled"]
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by a platform backend
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum BackendError {
    #[error("Platform not supported: {0}")]
    PlatformNotSupported(String),

    #[error("Isolation context not found: {0}")]
    ContextNotFound(String),

    #[error("Process spawn failed: {0}")]
    ProcessSpawnFailed(String),

    #[error("Resource limit failed: {0}")]
    ResourceLimitFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}

/// Platform implementation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    /// Linux namespaces + cgroups + seccomp
    LinuxNamespaces,
    /// Windows job objects + restricted tokens + integrity levels
    WindowsJobObjects,
    /// macOS placeholder for a future sandbox-profile backend
    MacStub,
}

/// Hardening applied to a sandboxed process before it executes caller code
///
/// `syscall_filter` requests a reject-by-default syscall allow-list on Linux
/// and is recorded elsewhere. `restrict_privileges` requests capability-set
/// reduction on Linux, and a restricted token plus low integrity label on
/// Windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HardeningFlags {
    pub syscall_filter: bool,
    pub restrict_privileges: bool,
}

/// Opaque handle for a backend isolation context
///
/// Owned exclusively by the sandbox's registry entry. Deliberately not
/// `Clone`: the handle is the release token and is consumed exactly once by
/// `destroy_isolation_context`.
#[derive(Debug)]
pub struct IsolationContext {
    id: SandboxId,
    platform: PlatformKind,
}

impl IsolationContext {
    pub(crate) fn new(id: SandboxId, platform: PlatformKind) -> Self {
        Self { id, platform }
    }

    pub fn id(&self) -> &SandboxId {
        &self.id
    }

    pub fn platform(&self) -> PlatformKind {
        self.platform
    }
}

/// Point-in-time resource accounting for one isolation context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContextUsage {
    pub memory_bytes: u64,
    pub cpu_time_ms: u64,
}
