/*!
 * macOS Isolation Backend (stub)
 * Lifecycle placeholder reserved for a future sandbox-profile backend
 *
 * Contexts are tracked and processes spawn and terminate, but limits are
 * accepted as logged no-ops and accounting reads zero. The interface is the
 * full `IsolationProvider` contract so `SandboxManager` never changes when
 * a profile-based implementation lands.
 */

use super::traits::IsolationProvider;
use super::types::*;
use crate::core::types::{Pid, SandboxId};
use crate::policy::IsolationKind;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

#[derive(Debug, Default)]
struct StubContext {
    processes: Vec<Pid>,
}

/// macOS backend stub
pub struct MacBackend {
    contexts: Arc<DashMap<SandboxId, StubContext, RandomState>>,
    children: Arc<DashMap<Pid, Child, RandomState>>,
    pid_to_context: Arc<DashMap<Pid, SandboxId, RandomState>>,
}

impl MacBackend {
    pub fn new() -> Self {
        info!("macOS backend initialized (stub, no kernel isolation)");
        Self {
            contexts: Arc::new(DashMap::with_hasher(RandomState::new())),
            children: Arc::new(DashMap::with_hasher(RandomState::new())),
            pid_to_context: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    fn unbind(&self, pid: Pid) {
        if let Some((_, id)) = self.pid_to_context.remove(&pid) {
            if let Some(mut ctx) = self.contexts.get_mut(&id) {
                ctx.processes.retain(|p| *p != pid);
            }
        }
    }

    fn release_context(&self, id: &SandboxId) {
        let Some((_, state)) = self.contexts.remove(id) else {
            warn!("isolation context {} already released", id);
            return;
        };
        for pid in state.processes {
            if let Err(e) = self.terminate_process(pid) {
                warn!("failed to terminate pid {} in context {}: {}", pid, id, e);
            }
        }
        info!("destroyed isolation context {}", id);
    }
}

impl Default for MacBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MacBackend {
    fn clone(&self) -> Self {
        Self {
            contexts: Arc::clone(&self.contexts),
            children: Arc::clone(&self.children),
            pid_to_context: Arc::clone(&self.pid_to_context),
        }
    }
}

impl IsolationProvider for MacBackend {
    fn initialize(&self) -> BackendResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> BackendResult<()> {
        let ids: Vec<SandboxId> = self.contexts.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.release_context(&id);
        }
        info!("macOS backend shut down");
        Ok(())
    }

    fn create_isolation_context(
        &self,
        id: &SandboxId,
        kinds: &[IsolationKind],
    ) -> BackendResult<IsolationContext> {
        if self.contexts.contains_key(id) {
            debug!("isolation context {} already exists", id);
            return Ok(IsolationContext::new(id.clone(), self.platform()));
        }
        if !kinds.is_empty() {
            warn!(
                "{} isolation kinds requested for {}; stub backend records them only",
                kinds.len(),
                id
            );
        }
        self.contexts.insert(id.clone(), StubContext::default());
        info!("created isolation context {} (stub)", id);
        Ok(IsolationContext::new(id.clone(), self.platform()))
    }

    fn destroy_isolation_context(&self, ctx: IsolationContext) -> BackendResult<()> {
        self.release_context(ctx.id());
        Ok(())
    }

    fn add_process_to_context(&self, id: &SandboxId, pid: Pid) -> BackendResult<()> {
        let mut ctx = self
            .contexts
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        if !ctx.processes.contains(&pid) {
            ctx.processes.push(pid);
        }
        self.pid_to_context.insert(pid, id.clone());
        Ok(())
    }

    fn set_memory_limit(&self, id: &SandboxId, limit_bytes: u64) -> BackendResult<()> {
        self.contexts
            .get(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        warn!(
            "memory limit for sandbox {} accepted as a no-op ({} bytes, stub backend)",
            id, limit_bytes
        );
        Ok(())
    }

    fn set_cpu_limit(&self, id: &SandboxId, percent: u32) -> BackendResult<()> {
        self.contexts
            .get(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        warn!(
            "cpu limit for sandbox {} accepted as a no-op ({}%, stub backend)",
            id, percent
        );
        Ok(())
    }

    fn set_process_limit(&self, id: &SandboxId, max_processes: u32) -> BackendResult<()> {
        self.contexts
            .get(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        warn!(
            "process limit for sandbox {} accepted as a no-op ({}, stub backend)",
            id, max_processes
        );
        Ok(())
    }

    fn set_filesystem_access(
        &self,
        id: &SandboxId,
        allowed_paths: &[PathBuf],
    ) -> BackendResult<()> {
        self.contexts
            .get(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        debug!(
            "filesystem access for {} recorded ({} paths); enforcement is policy-level",
            id,
            allowed_paths.len()
        );
        Ok(())
    }

    fn set_network_access(&self, id: &SandboxId, enabled: bool) -> BackendResult<()> {
        self.contexts
            .get(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        warn!(
            "network access toggle ({}) for sandbox {} accepted as a no-op (stub backend)",
            enabled, id
        );
        Ok(())
    }

    fn create_sandboxed_process(
        &self,
        executable: &str,
        args: &[String],
        id: &SandboxId,
        hardening: HardeningFlags,
    ) -> BackendResult<Pid> {
        self.contexts
            .get(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        if hardening.syscall_filter || hardening.restrict_privileges {
            warn!("hardening requested for sandbox {} ignored by stub backend", id);
        }

        let child = Command::new(executable)
            .args(args)
            .env("SANDBOX_ID", id.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BackendError::ProcessSpawnFailed(format!("{}: {}", executable, e)))?;
        let pid = child.id();

        self.children.insert(pid, child);
        if let Some(mut ctx) = self.contexts.get_mut(id) {
            ctx.processes.push(pid);
        }
        self.pid_to_context.insert(pid, id.clone());
        info!("spawned process {} in stub context {}", pid, id);
        Ok(pid)
    }

    fn terminate_process(&self, pid: Pid) -> BackendResult<()> {
        let Some((_, mut child)) = self.children.remove(&pid) else {
            debug!("terminate of unknown pid {} is a no-op", pid);
            self.unbind(pid);
            return Ok(());
        };
        let _ = child.kill();
        let _ = child.wait();
        self.unbind(pid);
        info!("terminated process {}", pid);
        Ok(())
    }

    fn get_resource_usage(&self, id: &SandboxId) -> BackendResult<ContextUsage> {
        self.contexts
            .get(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        Ok(ContextUsage::default())
    }

    fn context_processes(&self, id: &SandboxId) -> Vec<Pid> {
        self.contexts
            .get(id)
            .map(|ctx| ctx.processes.clone())
            .unwrap_or_default()
    }

    fn reap_exited(&self) -> Vec<Pid> {
        let mut exited = Vec::new();
        for mut entry in self.children.iter_mut() {
            let pid = *entry.key();
            match entry.value_mut().try_wait() {
                Ok(Some(_)) => exited.push(pid),
                Ok(None) => {}
                Err(e) => {
                    warn!("error checking pid {}: {}", pid, e);
                    exited.push(pid);
                }
            }
        }
        for pid in &exited {
            self.children.remove(pid);
            self.unbind(*pid);
        }
        exited
    }

    fn is_supported(&self) -> bool {
        cfg!(target_os = "macos")
    }

    fn platform(&self) -> PlatformKind {
        PlatformKind::MacStub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_limits_are_noops() {
        let backend = MacBackend::new();
        let id = SandboxId::new("stub-1");
        let ctx = backend.create_isolation_context(&id, &[]).unwrap();

        assert!(backend.set_memory_limit(&id, 1024).is_ok());
        assert!(backend.set_cpu_limit(&id, 10).is_ok());
        assert!(backend.set_process_limit(&id, 2).is_ok());
        assert!(backend.set_network_access(&id, true).is_ok());
        assert_eq!(
            backend.get_resource_usage(&id).unwrap(),
            ContextUsage::default()
        );

        backend.destroy_isolation_context(ctx).unwrap();
    }

    #[test]
    fn test_stub_unknown_context() {
        let backend = MacBackend::new();
        let err = backend.set_memory_limit(&SandboxId::new("ghost"), 1024);
        assert!(matches!(err, Err(BackendError::ContextNotFound(_))));
    }
}
