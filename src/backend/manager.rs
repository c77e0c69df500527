/*!
 * Platform Backend Dispatcher
 * Selects the isolation provider for the current operating system
 */

use super::linux::LinuxBackend;
use super::macos::MacBackend;
use super::traits::IsolationProvider;
use super::types::*;
use super::windows::WindowsBackend;
use crate::core::types::{Pid, SandboxId};
use crate::policy::IsolationKind;
use log::info;
use std::path::PathBuf;

/// Unified backend that routes to the platform implementation
#[derive(Clone)]
pub struct PlatformBackend {
    provider: ProviderImpl,
}

#[derive(Clone)]
enum ProviderImpl {
    #[allow(dead_code)]
    Linux(LinuxBackend),
    #[allow(dead_code)]
    Windows(WindowsBackend),
    #[allow(dead_code)]
    Mac(MacBackend),
}

impl PlatformBackend {
    /// Construct the backend for the current platform
    ///
    /// A construction failure here aborts `SandboxManager::initialize`
    /// entirely; no partially initialized state is observable.
    pub fn detect() -> BackendResult<Self> {
        #[cfg(target_os = "linux")]
        {
            let backend = LinuxBackend::new();
            if backend.is_supported() {
                info!("platform backend selected: Linux (namespaces + cgroups)");
                return Ok(Self {
                    provider: ProviderImpl::Linux(backend),
                });
            }
        }

        #[cfg(windows)]
        {
            let backend = WindowsBackend::new();
            if backend.is_supported() {
                info!("platform backend selected: Windows (job objects)");
                return Ok(Self {
                    provider: ProviderImpl::Windows(backend),
                });
            }
        }

        #[cfg(target_os = "macos")]
        {
            let backend = MacBackend::new();
            if backend.is_supported() {
                info!("platform backend selected: macOS (stub)");
                return Ok(Self {
                    provider: ProviderImpl::Mac(backend),
                });
            }
        }

        Err(BackendError::PlatformNotSupported(
            "no isolation backend for this platform".to_string(),
        ))
    }

    fn inner(&self) -> &dyn IsolationProvider {
        match &self.provider {
            ProviderImpl::Linux(b) => b,
            ProviderImpl::Windows(b) => b,
            ProviderImpl::Mac(b) => b,
        }
    }
}

impl IsolationProvider for PlatformBackend {
    fn initialize(&self) -> BackendResult<()> {
        self.inner().initialize()
    }

    fn shutdown(&self) -> BackendResult<()> {
        self.inner().shutdown()
    }

    fn create_isolation_context(
        &self,
        id: &SandboxId,
        kinds: &[IsolationKind],
    ) -> BackendResult<IsolationContext> {
        self.inner().create_isolation_context(id, kinds)
    }

    fn destroy_isolation_context(&self, ctx: IsolationContext) -> BackendResult<()> {
        self.inner().destroy_isolation_context(ctx)
    }

    fn add_process_to_context(&self, id: &SandboxId, pid: Pid) -> BackendResult<()> {
        self.inner().add_process_to_context(id, pid)
    }

    fn set_memory_limit(&self, id: &SandboxId, limit_bytes: u64) -> BackendResult<()> {
        self.inner().set_memory_limit(id, limit_bytes)
    }

    fn set_cpu_limit(&self, id: &SandboxId, percent: u32) -> BackendResult<()> {
        self.inner().set_cpu_limit(id, percent)
    }

    fn set_process_limit(&self, id: &SandboxId, max_processes: u32) -> BackendResult<()> {
        self.inner().set_process_limit(id, max_processes)
    }

    fn set_filesystem_access(
        &self,
        id: &SandboxId,
        allowed_paths: &[PathBuf],
    ) -> BackendResult<()> {
        self.inner().set_filesystem_access(id, allowed_paths)
    }

    fn set_network_access(&self, id: &SandboxId, enabled: bool) -> BackendResult<()> {
        self.inner().set_network_access(id, enabled)
    }

    fn create_sandboxed_process(
        &self,
        executable: &str,
        args: &[String],
        id: &SandboxId,
        hardening: HardeningFlags,
    ) -> BackendResult<Pid> {
        self.inner()
            .create_sandboxed_process(executable, args, id, hardening)
    }

    fn terminate_process(&self, pid: Pid) -> BackendResult<()> {
        self.inner().terminate_process(pid)
    }

    fn get_resource_usage(&self, id: &SandboxId) -> BackendResult<ContextUsage> {
        self.inner().get_resource_usage(id)
    }

    fn context_processes(&self, id: &SandboxId) -> Vec<Pid> {
        self.inner().context_processes(id)
    }

    fn reap_exited(&self) -> Vec<Pid> {
        self.inner().reap_exited()
    }

    fn is_supported(&self) -> bool {
        self.inner().is_supported()
    }

    fn platform(&self) -> PlatformKind {
        self.inner().platform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_selects_current_platform() {
        let backend = PlatformBackend::detect().unwrap();
        #[cfg(target_os = "linux")]
        assert_eq!(backend.platform(), PlatformKind::LinuxNamespaces);
        #[cfg(windows)]
        assert_eq!(backend.platform(), PlatformKind::WindowsJobObjects);
        #[cfg(target_os = "macos")]
        assert_eq!(backend.platform(), PlatformKind::MacStub);
    }
}
