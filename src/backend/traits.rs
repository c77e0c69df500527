/*!
 * Platform Backend Traits
 * OS-independent capability interface for isolation providers
 */

use super::types::*;
use crate::core::types::{Pid, SandboxId};
use crate::policy::IsolationKind;
use std::path::PathBuf;

/// One isolation-primitive group (namespaces+cgroups, job objects, ...)
///
/// The contract is uniform across platforms: a limit the OS cannot enforce
/// is accepted as a logged no-op, never a hard failure.
pub trait IsolationProvider: Send + Sync {
    /// Prepare backend-global state
    fn initialize(&self) -> BackendResult<()>;

    /// Tear down every remaining context
    fn shutdown(&self) -> BackendResult<()>;

    /// Create an isolation context for a sandbox and return its handle
    fn create_isolation_context(
        &self,
        id: &SandboxId,
        kinds: &[IsolationKind],
    ) -> BackendResult<IsolationContext>;

    /// Release a context, forcibly terminating bound processes first
    ///
    /// Consumes the handle: a context is released exactly once.
    fn destroy_isolation_context(&self, ctx: IsolationContext) -> BackendResult<()>;

    /// Place an already-running process under a context's limits
    fn add_process_to_context(&self, id: &SandboxId, pid: Pid) -> BackendResult<()>;

    /// Cap memory for a context
    fn set_memory_limit(&self, id: &SandboxId, limit_bytes: u64) -> BackendResult<()>;

    /// Cap CPU for a context (percentage of one core)
    fn set_cpu_limit(&self, id: &SandboxId, percent: u32) -> BackendResult<()>;

    /// Cap the number of live processes in a context
    fn set_process_limit(&self, id: &SandboxId, max_processes: u32) -> BackendResult<()>;

    /// Record the filesystem prefixes a context may touch
    fn set_filesystem_access(&self, id: &SandboxId, allowed_paths: &[PathBuf])
        -> BackendResult<()>;

    /// Toggle network reachability for a context
    fn set_network_access(&self, id: &SandboxId, enabled: bool) -> BackendResult<()>;

    /// Spawn a process confined to a context before it executes caller code
    fn create_sandboxed_process(
        &self,
        executable: &str,
        args: &[String],
        id: &SandboxId,
        hardening: HardeningFlags,
    ) -> BackendResult<Pid>;

    /// Terminate a process: graceful signal, then forced kill after a short
    /// wait. Terminating an unknown or dead pid is a benign no-op.
    fn terminate_process(&self, pid: Pid) -> BackendResult<()>;

    /// Read OS accounting for a context
    fn get_resource_usage(&self, id: &SandboxId) -> BackendResult<ContextUsage>;

    /// Pids currently bound to a context
    fn context_processes(&self, id: &SandboxId) -> Vec<Pid>;

    /// Collect pids whose processes have exited since the last sweep
    fn reap_exited(&self) -> Vec<Pid> {
        Vec::new()
    }

    /// Whether this provider can enforce isolation on the current host
    fn is_supported(&self) -> bool;

    /// The platform family this provider implements
    fn platform(&self) -> PlatformKind;
}
