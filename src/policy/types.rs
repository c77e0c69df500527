/*!
 * Policy Types
 * Sandbox configuration, permission categories, and violation records
 */

use crate::core::serde::{is_empty_vec, is_false};
use crate::core::types::TimestampMs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Permission categories checked against a sandbox policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadFile,
    WriteFile,
    CreateFile,
    DeleteFile,
    ExecuteFile,
    NetworkAccess,
    SystemCall,
    ProcessCreation,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Permission::ReadFile => "read_file",
            Permission::WriteFile => "write_file",
            Permission::CreateFile => "create_file",
            Permission::DeleteFile => "delete_file",
            Permission::ExecuteFile => "execute_file",
            Permission::NetworkAccess => "network_access",
            Permission::SystemCall => "system_call",
            Permission::ProcessCreation => "process_creation",
        };
        write!(f, "{}", name)
    }
}

/// Isolation primitives a sandbox may request from the platform backend
///
/// Linux maps these onto namespace clone flags. Windows ignores the subset
/// because the job object already supplies process grouping. The macOS stub
/// records them for a future profile-based backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationKind {
    Pid,
    Network,
    Mount,
    Uts,
    Ipc,
    User,
}

/// Per-sandbox policy and resource limits
///
/// Absence from `allowed_paths` is an implicit deny; `denied_paths` is
/// consulted first and always wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SandboxConfig {
    #[serde(skip_serializing_if = "is_empty_vec")]
    pub allowed_paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "is_empty_vec")]
    pub denied_paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "is_empty_vec")]
    pub allowed_executables: Vec<String>,
    #[serde(skip_serializing_if = "is_empty_vec")]
    pub allowed_network_domains: Vec<String>,
    #[serde(skip_serializing_if = "HashSet::is_empty")]
    pub permissions: HashSet<Permission>,
    #[serde(skip_serializing_if = "is_false")]
    pub enable_network_access: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub enable_system_calls: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub enable_process_creation: bool,
    pub max_memory_bytes: u64,
    pub max_cpu_time_secs: u64,
    pub max_processes: u32,
    #[serde(skip_serializing_if = "is_empty_vec")]
    pub isolation: Vec<IsolationKind>,
    #[serde(skip_serializing_if = "is_false")]
    pub enable_resource_usage_cache: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            allowed_paths: vec![],
            denied_paths: vec![],
            allowed_executables: vec![],
            allowed_network_domains: vec![],
            permissions: HashSet::new(),
            enable_network_access: false,
            enable_system_calls: false,
            enable_process_creation: false,
            max_memory_bytes: 512 * 1024 * 1024, // 512 MiB
            max_cpu_time_secs: 60,
            max_processes: 10,
            isolation: vec![],
            enable_resource_usage_cache: false,
        }
    }
}

impl SandboxConfig {
    /// Grant a permission category
    pub fn grant(&mut self, permission: Permission) {
        self.permissions.insert(permission);
    }

    /// Revoke a permission category
    pub fn revoke(&mut self, permission: &Permission) {
        self.permissions.remove(permission);
    }

    /// Add an allowed path prefix
    pub fn allow_path(&mut self, path: impl Into<PathBuf>) {
        self.allowed_paths.push(path.into());
    }

    /// Add a denied path prefix (checked before the allow-list)
    pub fn deny_path(&mut self, path: impl Into<PathBuf>) {
        self.denied_paths.push(path.into());
    }

    /// Add an allowed executable (exact match)
    pub fn allow_executable(&mut self, executable: impl Into<String>) {
        self.allowed_executables.push(executable.into());
    }

    /// Add an allowed network domain (suffix match)
    pub fn allow_domain(&mut self, domain: impl Into<String>) {
        self.allowed_network_domains.push(domain.into());
    }
}

/// One entry in a sandbox's ordered violation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Violation {
    pub message: String,
    pub recorded_at: TimestampMs,
}

impl Violation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recorded_at: crate::core::types::now_ms(),
        }
    }
}
