/*!
 * Sandbox Manager
 * Public orchestration API over the registry, cache, events, and backend
 *
 * Operations are synchronous and callable from any thread. The registry and
 * cache share one coarse lock; process spawn and terminate waits happen
 * outside it.
 */

use super::cache::{ResourceUsageCache, ResourceUsageSnapshot};
use super::events::{EventBus, SandboxEvent};
use super::monitor::{MonitorHandle, RESOURCE_SWEEP_TICKS, TICK_INTERVAL};
use super::registry::{SandboxRecord, SandboxRegistry};
use crate::backend::{HardeningFlags, IsolationProvider, PlatformBackend};
use crate::core::errors::{SandboxError, SandboxResult};
use crate::core::types::{now_ms, SandboxId};
use crate::policy::{path, validator, network, Permission, SandboxConfig, Violation};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::{Arc, Weak};

/// Commands any sandbox may run through `execute_command`
#[cfg(windows)]
const SAFE_COMMANDS: &[&str] = &["where.exe"];
#[cfg(not(windows))]
const SAFE_COMMANDS: &[&str] = &["/usr/bin/which", "/bin/which"];

struct ManagerState {
    initialized: bool,
    default_config: SandboxConfig,
    backend: Option<PlatformBackend>,
    registry: SandboxRegistry,
    cache: ResourceUsageCache,
    monitor: Option<MonitorHandle>,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            initialized: false,
            default_config: SandboxConfig::default(),
            backend: None,
            registry: SandboxRegistry::new(),
            cache: ResourceUsageCache::new(),
            monitor: None,
        }
    }

    fn ensure_initialized(&self) -> SandboxResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(SandboxError::InitializationFailed(
                "sandbox manager is not initialized".to_string(),
            ))
        }
    }

    fn backend(&self) -> SandboxResult<PlatformBackend> {
        self.backend.clone().ok_or_else(|| {
            SandboxError::InitializationFailed("platform backend unavailable".to_string())
        })
    }

    /// Append to the violation log and build the event to emit after unlock
    fn record_violation(&mut self, id: &str, message: String) -> Option<SandboxEvent> {
        warn!("sandbox {} violation: {}", id, message);
        let record = self.registry.get_mut(id)?;
        record.violations.push(Violation::new(message.clone()));
        Some(SandboxEvent::ViolationDetected {
            id: SandboxId::from(id),
            message,
        })
    }
}

/// Orchestrates named, policy-configured execution sandboxes
#[derive(Clone)]
pub struct SandboxManager {
    inner: Arc<Mutex<ManagerState>>,
    events: Arc<EventBus>,
}

impl SandboxManager {
    /// Create an uninitialized manager; call `initialize` before use
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManagerState::new())),
            events: Arc::new(EventBus::new()),
        }
    }

    /// Subscribe to lifecycle, violation, and resource events
    pub fn subscribe(&self) -> flume::Receiver<SandboxEvent> {
        self.events.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    /// Bring up the backend and monitor with a default configuration
    ///
    /// Idempotent once initialized. A backend construction failure aborts
    /// the call entirely; no partial state is observable.
    pub fn initialize(&self, config: SandboxConfig) -> SandboxResult<()> {
        let mut state = self.inner.lock();
        if state.initialized {
            return Ok(());
        }

        Self::validate_config(&config)?;

        let backend = PlatformBackend::detect()
            .map_err(|e| SandboxError::InitializationFailed(e.to_string()))?;
        backend
            .initialize()
            .map_err(|e| SandboxError::InitializationFailed(e.to_string()))?;

        let weak = Arc::downgrade(&self.inner);
        let events = Arc::clone(&self.events);
        let monitor = MonitorHandle::spawn(TICK_INTERVAL, move |tick| {
            Self::monitor_sweep(&weak, &events, tick);
        })
        .map_err(|e| {
            let _ = backend.shutdown();
            SandboxError::InitializationFailed(format!("failed to start monitor: {}", e))
        })?;

        state.default_config = config;
        state.backend = Some(backend);
        state.monitor = Some(monitor);
        state.initialized = true;
        info!("sandbox manager initialized");
        Ok(())
    }

    /// Destroy every active sandbox, stop the monitor, release the backend
    ///
    /// Each destruction cascades its own cache policy, then the cache is
    /// cleared with the rest of the process-lifetime state. Re-initializing
    /// afterwards is permitted.
    pub fn shutdown(&self) -> SandboxResult<()> {
        let (monitor, backend, doomed) = {
            let mut state = self.inner.lock();
            if !state.initialized {
                return Ok(());
            }
            let backend = state.backend()?;

            let mut doomed = Vec::new();
            for id in state.registry.ids() {
                if let Some(mut record) = state.registry.remove(id.as_str()) {
                    record.is_active = false;
                    if state.cache.is_enabled() || record.config.enable_resource_usage_cache {
                        let snapshot = ResourceUsageSnapshot {
                            memory_bytes: record.memory_bytes,
                            cpu_time_ms: record.cpu_time_ms,
                            timestamp_ms: now_ms(),
                            is_destroyed: true,
                        };
                        state.cache.store(record.id.clone(), snapshot);
                    }
                    doomed.push((record.id.clone(), record.context.take()));
                }
            }

            state.cache.clear(None);
            state.initialized = false;
            (state.monitor.take(), Some(backend), doomed)
        };

        // Process termination and context release block for bounded windows,
        // so they run after the lock is dropped.
        let mut destroyed_ids = Vec::new();
        if let Some(backend) = backend {
            for (id, ctx) in doomed {
                for pid in backend.context_processes(&id) {
                    if let Err(e) = backend.terminate_process(pid) {
                        warn!("failed to terminate pid {} during shutdown: {}", pid, e);
                    }
                }
                if let Some(ctx) = ctx {
                    if let Err(e) = backend.destroy_isolation_context(ctx) {
                        warn!("failed to release isolation context {}: {}", id, e);
                    }
                }
                destroyed_ids.push(id);
            }
            if let Err(e) = backend.shutdown() {
                warn!("backend shutdown reported: {}", e);
            }
        }
        if let Some(monitor) = monitor {
            monitor.stop();
        }

        for id in destroyed_ids {
            self.events.emit(SandboxEvent::Destroyed { id });
        }
        info!("sandbox manager shut down");
        Ok(())
    }

    /// The default configuration the manager was initialized with
    pub fn global_config(&self) -> SandboxResult<SandboxConfig> {
        let state = self.inner.lock();
        state.ensure_initialized()?;
        Ok(state.default_config.clone())
    }

    /// Create a named sandbox; creating an existing id is a logged no-op
    pub fn create_sandbox(&self, id: &str, config: SandboxConfig) -> SandboxResult<()> {
        {
            let mut state = self.inner.lock();
            state.ensure_initialized()?;

            if !validator::is_valid_identifier(id) {
                return Err(SandboxError::ConfigurationError(format!(
                    "invalid sandbox identifier: {:?}",
                    id
                )));
            }
            if state.registry.contains(id) {
                warn!("sandbox {} already exists", id);
                return Ok(());
            }
            Self::validate_config(&config)?;

            let backend = state.backend()?;
            let sandbox_id = SandboxId::from(id);
            let context = backend
                .create_isolation_context(&sandbox_id, &config.isolation)
                .map_err(|e| SandboxError::ConfigurationError(e.to_string()))?;

            // Brief OS limit-setting calls; failures degrade to logged
            // warnings inside the backend.
            if let Err(e) = backend.set_memory_limit(&sandbox_id, config.max_memory_bytes) {
                warn!("memory limit for {} not applied: {}", id, e);
            }
            if let Err(e) = backend.set_process_limit(&sandbox_id, config.max_processes) {
                warn!("process limit for {} not applied: {}", id, e);
            }
            if let Err(e) = backend.set_filesystem_access(&sandbox_id, &config.allowed_paths) {
                warn!("filesystem access for {} not applied: {}", id, e);
            }
            if let Err(e) = backend.set_network_access(&sandbox_id, config.enable_network_access) {
                warn!("network access for {} not applied: {}", id, e);
            }

            state
                .registry
                .insert(SandboxRecord::new(sandbox_id, config, context));
        }

        info!("sandbox {} created", id);
        self.events.emit(SandboxEvent::Created {
            id: SandboxId::from(id),
        });
        Ok(())
    }

    /// Destroy a sandbox: terminate processes, cache usage if applicable,
    /// release the isolation context, erase the registry entry
    pub fn destroy_sandbox(&self, id: &str) -> SandboxResult<()> {
        let (backend, context, pids) = {
            let mut state = self.inner.lock();
            state.ensure_initialized()?;

            let mut record = state.registry.remove(id).ok_or_else(|| {
                SandboxError::ConfigurationError(format!("unknown sandbox: {}", id))
            })?;
            record.is_active = false;
            record.monitoring = false;

            if state.cache.is_enabled() || record.config.enable_resource_usage_cache {
                let snapshot = ResourceUsageSnapshot {
                    memory_bytes: record.memory_bytes,
                    cpu_time_ms: record.cpu_time_ms,
                    timestamp_ms: now_ms(),
                    is_destroyed: true,
                };
                state.cache.store(record.id.clone(), snapshot);
            }

            (state.backend()?, record.context.take(), record.processes)
        };

        // Graceful-then-forced termination waits happen outside the lock.
        for pid in pids {
            if let Err(e) = backend.terminate_process(pid) {
                warn!("failed to terminate pid {} in sandbox {}: {}", pid, id, e);
            }
        }
        if let Some(ctx) = context {
            if let Err(e) = backend.destroy_isolation_context(ctx) {
                warn!("failed to release isolation context {}: {}", id, e);
            }
        }

        info!("sandbox {} destroyed", id);
        self.events.emit(SandboxEvent::Destroyed {
            id: SandboxId::from(id),
        });
        Ok(())
    }

    /// Check a permission category; denials are recorded and raised
    pub fn check_permission(&self, id: &str, permission: Permission) -> SandboxResult<bool> {
        let event = {
            let mut state = self.inner.lock();
            state.ensure_initialized()?;
            let record = state.registry.get(id).ok_or_else(|| {
                SandboxError::ConfigurationError(format!("unknown sandbox: {}", id))
            })?;

            let config = &record.config;
            // Category gates short-circuit before set membership.
            let gate_open = match permission {
                Permission::NetworkAccess => config.enable_network_access,
                Permission::SystemCall => config.enable_system_calls,
                Permission::ProcessCreation => config.enable_process_creation,
                _ => true,
            };
            let granted = gate_open && config.permissions.contains(&permission);
            if granted {
                return Ok(true);
            }
            state.record_violation(id, format!("Permission denied: {}", permission))
        };
        if let Some(event) = event {
            self.events.emit(event);
        }
        Ok(false)
    }

    /// Check path access for one permission category
    ///
    /// Denied prefixes short-circuit to false; otherwise the path must sit
    /// under an allowed prefix. The permission names the attempted
    /// operation in the audit trail.
    pub fn check_path_access(
        &self,
        id: &str,
        target: impl AsRef<Path>,
        permission: Permission,
    ) -> SandboxResult<bool> {
        let target = target.as_ref();
        let event = {
            let mut state = self.inner.lock();
            state.ensure_initialized()?;
            let record = state.registry.get(id).ok_or_else(|| {
                SandboxError::ConfigurationError(format!("unknown sandbox: {}", id))
            })?;

            let path_str = target
                .to_str()
                .ok_or_else(|| SandboxError::InvalidPath(format!("{:?}", target)))?;
            if !validator::is_path_safe(path_str) {
                return Err(SandboxError::InvalidPath(path_str.to_string()));
            }

            match path::evaluate(&record.config, target) {
                path::PathDecision::Allowed => return Ok(true),
                path::PathDecision::DeniedPrefix => state.record_violation(
                    id,
                    format!("Path access denied ({}): {}", permission, path_str),
                ),
                path::PathDecision::NotAllowListed => state.record_violation(
                    id,
                    format!("Path not in allowed list ({}): {}", permission, path_str),
                ),
            }
        };
        if let Some(event) = event {
            self.events.emit(event);
        }
        Ok(false)
    }

    /// Check network access to a domain and port
    pub fn check_network_access(&self, id: &str, domain: &str, port: u16) -> SandboxResult<bool> {
        let event = {
            let mut state = self.inner.lock();
            state.ensure_initialized()?;
            let record = state.registry.get(id).ok_or_else(|| {
                SandboxError::ConfigurationError(format!("unknown sandbox: {}", id))
            })?;

            let config = &record.config;
            if !config.enable_network_access {
                state.record_violation(
                    id,
                    format!("Network access denied for domain: {}:{}", domain, port),
                )
            } else if network::is_domain_allowed(&config.allowed_network_domains, domain) {
                return Ok(true);
            } else {
                state.record_violation(id, format!("Domain not in allowed list: {}", domain))
            }
        };
        if let Some(event) = event {
            self.events.emit(event);
        }
        Ok(false)
    }

    /// Ad-hoc network grants are denied by policy
    pub fn request_network_access(&self, domain: &str, port: u16) -> SandboxResult<()> {
        self.inner.lock().ensure_initialized()?;
        warn!(
            "network access requested for {}:{} - denied by policy",
            domain, port
        );
        Err(SandboxError::NetworkRestricted(format!(
            "{}:{}",
            domain, port
        )))
    }

    /// Spawn an allow-listed executable inside a sandbox
    ///
    /// Only success or failure crosses this boundary; the OS process handle
    /// stays with the backend.
    pub fn execute_in_sandbox(
        &self,
        id: &str,
        executable: &str,
        args: &[String],
    ) -> SandboxResult<()> {
        let (backend, sandbox_id, hardening) = {
            let mut state = self.inner.lock();
            state.ensure_initialized()?;
            let (creation_enabled, allow_listed, under_limit, max_processes, hardening) = {
                let record = state.registry.get(id).ok_or_else(|| {
                    SandboxError::ConfigurationError(format!("unknown sandbox: {}", id))
                })?;
                let config = &record.config;
                (
                    config.enable_process_creation,
                    config.allowed_executables.iter().any(|e| e == executable),
                    record.processes.len() < config.max_processes as usize,
                    config.max_processes,
                    HardeningFlags {
                        syscall_filter: !config.enable_system_calls,
                        restrict_privileges: true,
                    },
                )
            };

            if !creation_enabled {
                let event = state.record_violation(id, "Process creation is disabled".to_string());
                drop(state);
                if let Some(event) = event {
                    self.events.emit(event);
                }
                return Err(SandboxError::FeatureDisabled(format!(
                    "process creation is disabled for sandbox {}",
                    id
                )));
            }
            if !allow_listed {
                let event =
                    state.record_violation(id, format!("Executable not allowed: {}", executable));
                drop(state);
                if let Some(event) = event {
                    self.events.emit(event);
                }
                return Err(SandboxError::RestrictedOperation(format!(
                    "executable not allow-listed: {}",
                    executable
                )));
            }
            if !under_limit {
                let event = state
                    .record_violation(id, format!("Process limit reached: {}", max_processes));
                drop(state);
                if let Some(event) = event {
                    self.events.emit(event);
                }
                return Err(SandboxError::RestrictedOperation(format!(
                    "process limit reached for sandbox {}",
                    id
                )));
            }

            (state.backend()?, SandboxId::from(id), hardening)
        };

        // The spawn may block for a bounded window awaiting start
        // confirmation; it runs outside the lock.
        let pid = backend
            .create_sandboxed_process(executable, args, &sandbox_id, hardening)
            .map_err(|e| SandboxError::ProcessCreationFailed(e.to_string()))?;

        let mut state = self.inner.lock();
        if state.initialized && state.registry.contains(id) {
            state.registry.bind_process(&sandbox_id, pid);
            info!("process {} started in sandbox {}: {}", pid, id, executable);
            Ok(())
        } else {
            // The sandbox vanished while the spawn was in flight.
            drop(state);
            let _ = backend.terminate_process(pid);
            Err(SandboxError::SandboxNotFound(id.to_string()))
        }
    }

    /// Read a file after a `ReadFile` path check
    pub fn read_file_in_sandbox(&self, id: &str, file_path: &str) -> SandboxResult<Vec<u8>> {
        if !self.check_path_access(id, file_path, Permission::ReadFile)? {
            return Err(SandboxError::PermissionDenied(file_path.to_string()));
        }
        std::fs::read(file_path).map_err(|e| SandboxError::InvalidPath(format!("{}: {}", file_path, e)))
    }

    /// Write a file after a `WriteFile` path check
    pub fn write_file_in_sandbox(&self, id: &str, file_path: &str, data: &[u8]) -> SandboxResult<()> {
        if !self.check_path_access(id, file_path, Permission::WriteFile)? {
            return Err(SandboxError::PermissionDenied(file_path.to_string()));
        }
        std::fs::write(file_path, data)
            .map_err(|e| SandboxError::InvalidPath(format!("{}: {}", file_path, e)))
    }

    /// Process-wide gate for host commands outside any sandbox
    pub fn execute_command(&self, command: &str, args: &[String]) -> SandboxResult<()> {
        self.inner.lock().ensure_initialized()?;
        if SAFE_COMMANDS.contains(&command) {
            info!("allowing execution of safe command: {} {:?}", command, args);
            return Ok(());
        }
        warn!("command execution blocked: {}", command);
        Err(SandboxError::ExecutionBlocked(command.to_string()))
    }

    /// Replace a sandbox's config snapshot and re-apply backend settings
    pub fn update_sandbox_config(&self, id: &str, config: SandboxConfig) -> SandboxResult<()> {
        let mut state = self.inner.lock();
        state.ensure_initialized()?;
        if !state.registry.contains(id) {
            return Err(SandboxError::ConfigurationError(format!(
                "unknown sandbox: {}",
                id
            )));
        }
        Self::validate_config(&config)?;

        let backend = state.backend()?;
        let sandbox_id = SandboxId::from(id);
        if let Err(e) = backend.set_memory_limit(&sandbox_id, config.max_memory_bytes) {
            warn!("memory limit for {} not applied: {}", id, e);
        }
        if let Err(e) = backend.set_process_limit(&sandbox_id, config.max_processes) {
            warn!("process limit for {} not applied: {}", id, e);
        }
        if let Err(e) = backend.set_filesystem_access(&sandbox_id, &config.allowed_paths) {
            warn!("filesystem access for {} not applied: {}", id, e);
        }
        if let Err(e) = backend.set_network_access(&sandbox_id, config.enable_network_access) {
            warn!("network access for {} not applied: {}", id, e);
        }

        if let Some(record) = state.registry.get_mut(id) {
            record.config = config;
        }
        info!("updated configuration for sandbox {}", id);
        Ok(())
    }

    /// Current config snapshot for a sandbox
    pub fn get_sandbox_config(&self, id: &str) -> SandboxResult<SandboxConfig> {
        let state = self.inner.lock();
        state.ensure_initialized()?;
        state
            .registry
            .get(id)
            .map(|r| r.config.clone())
            .ok_or_else(|| SandboxError::ConfigurationError(format!("unknown sandbox: {}", id)))
    }

    /// Attach or detach the periodic limit re-evaluation for one sandbox
    ///
    /// Detaching stops future checks without clearing violation history.
    pub fn enable_monitoring(&self, id: &str, enable: bool) -> SandboxResult<()> {
        let mut state = self.inner.lock();
        state.ensure_initialized()?;
        let record = state
            .registry
            .get_mut(id)
            .ok_or_else(|| SandboxError::ConfigurationError(format!("unknown sandbox: {}", id)))?;
        record.monitoring = enable;
        debug!(
            "monitoring {} for sandbox {}",
            if enable { "attached" } else { "detached" },
            id
        );
        Ok(())
    }

    /// Ordered violation log for a sandbox
    pub fn get_violations(&self, id: &str) -> SandboxResult<Vec<Violation>> {
        let state = self.inner.lock();
        state.ensure_initialized()?;
        state
            .registry
            .get(id)
            .map(|r| r.violations.clone())
            .ok_or_else(|| SandboxError::ConfigurationError(format!("unknown sandbox: {}", id)))
    }

    pub fn clear_violations(&self, id: &str) -> SandboxResult<()> {
        let mut state = self.inner.lock();
        state.ensure_initialized()?;
        let record = state
            .registry
            .get_mut(id)
            .ok_or_else(|| SandboxError::ConfigurationError(format!("unknown sandbox: {}", id)))?;
        record.violations.clear();
        Ok(())
    }

    /// Update the memory and CPU-time budgets for a sandbox
    ///
    /// The memory cap is pushed down to the OS; the CPU-time budget is
    /// enforced by the monitor sweep (it is a cumulative budget, not a
    /// rate, so there is no OS knob for it).
    pub fn set_resource_limits(
        &self,
        id: &str,
        max_memory_bytes: u64,
        max_cpu_time_secs: u64,
    ) -> SandboxResult<()> {
        let mut state = self.inner.lock();
        state.ensure_initialized()?;
        if max_memory_bytes == 0 || max_cpu_time_secs == 0 {
            return Err(SandboxError::ConfigurationError(format!(
                "resource limits must be greater than zero: memory={}, cpu={}",
                max_memory_bytes, max_cpu_time_secs
            )));
        }
        if !state.registry.contains(id) {
            return Err(SandboxError::ConfigurationError(format!(
                "unknown sandbox: {}",
                id
            )));
        }

        let backend = state.backend()?;
        if let Err(e) = backend.set_memory_limit(&SandboxId::from(id), max_memory_bytes) {
            warn!("memory limit for {} not applied: {}", id, e);
        }
        if let Some(record) = state.registry.get_mut(id) {
            record.config.max_memory_bytes = max_memory_bytes;
            record.config.max_cpu_time_secs = max_cpu_time_secs;
        }
        info!(
            "updated resource limits for sandbox {}: memory={}, cpu={}s",
            id, max_memory_bytes, max_cpu_time_secs
        );
        Ok(())
    }

    /// Current usage as a `(memory_bytes, cpu_time_ms)` pair
    ///
    /// Resolution order: live sandbox counters, then the cached snapshot of
    /// a destroyed sandbox (when caching applied), then `SandboxNotFound`.
    pub fn get_resource_usage(&self, id: &str) -> SandboxResult<(u64, u64)> {
        let mut state = self.inner.lock();
        state.ensure_initialized()?;

        if state.registry.contains(id) {
            let backend = state.backend()?;
            if let Ok(usage) = backend.get_resource_usage(&SandboxId::from(id)) {
                if let Some(record) = state.registry.get_mut(id) {
                    record.memory_bytes = usage.memory_bytes;
                    record.cpu_time_ms = usage.cpu_time_ms;
                }
            }
            let record = state.registry.get(id).ok_or_else(|| {
                SandboxError::SandboxNotFound(id.to_string())
            })?;
            return Ok((record.memory_bytes, record.cpu_time_ms));
        }

        if let Some(snapshot) = state.cache.get(id) {
            return Ok((snapshot.memory_bytes, snapshot.cpu_time_ms));
        }

        Err(SandboxError::SandboxNotFound(id.to_string()))
    }

    /// Usage with timestamp and destruction metadata
    pub fn get_detailed_resource_usage(&self, id: &str) -> SandboxResult<ResourceUsageSnapshot> {
        let state = self.inner.lock();
        state.ensure_initialized()?;

        if let Some(record) = state.registry.get(id) {
            return Ok(ResourceUsageSnapshot {
                memory_bytes: record.memory_bytes,
                cpu_time_ms: record.cpu_time_ms,
                timestamp_ms: now_ms(),
                is_destroyed: false,
            });
        }
        state
            .cache
            .get(id)
            .copied()
            .ok_or_else(|| SandboxError::SandboxNotFound(id.to_string()))
    }

    /// Toggle the resource usage cache; disabling purges it immediately
    pub fn set_resource_usage_cache_enabled(&self, enable: bool) {
        self.inner.lock().cache.set_enabled(enable);
    }

    pub fn is_resource_usage_cache_enabled(&self) -> bool {
        self.inner.lock().cache.is_enabled()
    }

    /// Clear one cached snapshot, or all of them when `id` is `None`
    pub fn clear_resource_usage_cache(&self, id: Option<&str>) {
        self.inner.lock().cache.clear(id);
    }

    /// Ids of all active sandboxes
    pub fn active_sandboxes(&self) -> SandboxResult<Vec<SandboxId>> {
        let state = self.inner.lock();
        state.ensure_initialized()?;
        Ok(state.registry.ids())
    }

    /// Validate a config: every path through the validator, limits > 0
    fn validate_config(config: &SandboxConfig) -> SandboxResult<()> {
        for path in config.allowed_paths.iter().chain(config.denied_paths.iter()) {
            let path_str = path
                .to_str()
                .ok_or_else(|| SandboxError::InvalidPath(format!("{:?}", path)))?;
            if !validator::is_path_safe(path_str) {
                return Err(SandboxError::InvalidPath(path_str.to_string()));
            }
        }
        for executable in &config.allowed_executables {
            if !validator::is_valid_executable(executable) {
                return Err(SandboxError::ConfigurationError(format!(
                    "invalid executable: {}",
                    executable
                )));
            }
        }
        if config.max_memory_bytes == 0 || config.max_cpu_time_secs == 0 || config.max_processes == 0
        {
            return Err(SandboxError::ConfigurationError(format!(
                "invalid resource limits: memory={}, cpu={}, processes={}",
                config.max_memory_bytes, config.max_cpu_time_secs, config.max_processes
            )));
        }
        Ok(())
    }

    /// One monitor tick: health sweep every second, limit sweep every fifth
    fn monitor_sweep(weak: &Weak<Mutex<ManagerState>>, events: &Arc<EventBus>, tick: u64) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let mut pending = Vec::new();
        {
            let mut state = inner.lock();
            if !state.initialized {
                return;
            }
            let Ok(backend) = state.backend() else {
                return;
            };

            // Health sweep: unbind processes that exited on their own.
            for pid in backend.reap_exited() {
                if let Some(id) = state.registry.unbind_process(pid) {
                    debug!("process {} in sandbox {} exited", pid, id);
                }
            }

            for id in state.registry.ids() {
                let Some(record) = state.registry.get(id.as_str()) else {
                    continue;
                };
                if !record.monitoring {
                    continue;
                }

                if let Ok(usage) = backend.get_resource_usage(&id) {
                    if let Some(record) = state.registry.get_mut(id.as_str()) {
                        record.memory_bytes = usage.memory_bytes;
                        record.cpu_time_ms = usage.cpu_time_ms;
                    }
                }

                if tick % RESOURCE_SWEEP_TICKS != 0 {
                    continue;
                }
                let Some(record) = state.registry.get(id.as_str()) else {
                    continue;
                };
                let memory = record.memory_bytes;
                let cpu_ms = record.cpu_time_ms;
                let max_memory = record.config.max_memory_bytes;
                let max_cpu_ms = record.config.max_cpu_time_secs.saturating_mul(1000);

                if memory > max_memory {
                    if let Some(event) = state.record_violation(
                        id.as_str(),
                        format!("Memory limit exceeded: {} > {}", memory, max_memory),
                    ) {
                        pending.push(event);
                    }
                    pending.push(SandboxEvent::ResourceLimitExceeded {
                        id: id.clone(),
                        resource: "memory".to_string(),
                    });
                }
                if cpu_ms > max_cpu_ms {
                    if let Some(event) = state.record_violation(
                        id.as_str(),
                        format!("CPU time limit exceeded: {}ms > {}ms", cpu_ms, max_cpu_ms),
                    ) {
                        pending.push(event);
                    }
                    pending.push(SandboxEvent::ResourceLimitExceeded {
                        id: id.clone(),
                        resource: "cpu".to_string(),
                    });
                }
            }
        }
        for event in pending {
            events.emit(event);
        }
    }
}

impl Default for SandboxManager {
    fn default() -> Self {
        Self::new()
    }
}
