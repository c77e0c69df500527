/*!
 * Sandbox Registry
 * In-memory table of active sandbox records and process bindings
 *
 * The registry owns each sandbox's record exclusively, including its
 * isolation-context handle; everything else refers to sandboxes by id. The
 * registry itself is guarded by the manager's single coarse lock.
 */

use crate::backend::IsolationContext;
use crate::core::types::{now_ms, Pid, SandboxId, TimestampMs};
use crate::policy::{SandboxConfig, Violation};
use std::collections::HashMap;

/// Runtime state for one sandbox
#[derive(Debug)]
pub struct SandboxRecord {
    pub id: SandboxId,
    pub config: SandboxConfig,
    pub is_active: bool,
    pub violations: Vec<Violation>,
    pub memory_bytes: u64,
    pub cpu_time_ms: u64,
    pub created_at: TimestampMs,
    pub processes: Vec<Pid>,
    pub monitoring: bool,
    /// Release token for the backend context; taken exactly once at destroy
    pub context: Option<IsolationContext>,
}

impl SandboxRecord {
    pub fn new(id: SandboxId, config: SandboxConfig, context: IsolationContext) -> Self {
        Self {
            id,
            config,
            is_active: true,
            violations: Vec::new(),
            memory_bytes: 0,
            cpu_time_ms: 0,
            created_at: now_ms(),
            processes: Vec::new(),
            monitoring: true,
            context: Some(context),
        }
    }
}

/// Table of active sandboxes plus the pid <-> sandbox binding
#[derive(Debug, Default)]
pub struct SandboxRegistry {
    records: HashMap<SandboxId, SandboxRecord>,
    process_to_sandbox: HashMap<Pid, SandboxId>,
}

impl SandboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&SandboxRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SandboxRecord> {
        self.records.get_mut(id)
    }

    pub fn insert(&mut self, record: SandboxRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Remove a record, dropping every process binding that pointed at it
    pub fn remove(&mut self, id: &str) -> Option<SandboxRecord> {
        let record = self.records.remove(id)?;
        self.process_to_sandbox
            .retain(|_, sandbox| sandbox.as_str() != id);
        Some(record)
    }

    /// Bind a process to a sandbox (both directions)
    pub fn bind_process(&mut self, id: &SandboxId, pid: Pid) {
        if let Some(record) = self.records.get_mut(id.as_str()) {
            if !record.processes.contains(&pid) {
                record.processes.push(pid);
            }
            self.process_to_sandbox.insert(pid, id.clone());
        }
    }

    /// Drop a process binding, returning the sandbox it belonged to
    pub fn unbind_process(&mut self, pid: Pid) -> Option<SandboxId> {
        let id = self.process_to_sandbox.remove(&pid)?;
        if let Some(record) = self.records.get_mut(id.as_str()) {
            record.processes.retain(|p| *p != pid);
        }
        Some(id)
    }

    pub fn sandbox_for_process(&self, pid: Pid) -> Option<&SandboxId> {
        self.process_to_sandbox.get(&pid)
    }

    pub fn ids(&self) -> Vec<SandboxId> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
