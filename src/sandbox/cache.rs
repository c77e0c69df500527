/*!
 * Resource Usage Cache
 * Keyed snapshots that outlive their sandbox's destruction
 */

use crate::core::types::{SandboxId, TimestampMs};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Point-in-time usage record, immutable once stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResourceUsageSnapshot {
    pub memory_bytes: u64,
    pub cpu_time_ms: u64,
    pub timestamp_ms: TimestampMs,
    pub is_destroyed: bool,
}

/// Optional keyed store of last-known usage per sandbox id
///
/// Guarded by the manager's coarse lock alongside the registry. Disabling
/// the store purges every entry immediately; re-enabling reconstructs
/// nothing.
#[derive(Debug, Default)]
pub struct ResourceUsageCache {
    enabled: bool,
    entries: HashMap<SandboxId, ResourceUsageSnapshot>,
}

impl ResourceUsageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enable: bool) {
        self.enabled = enable;
        if !enable {
            self.entries.clear();
        }
        info!(
            "resource usage cache {}",
            if enable { "enabled" } else { "disabled" }
        );
    }

    /// Store a snapshot; a later sandbox reusing the id overwrites it
    pub fn store(&mut self, id: SandboxId, snapshot: ResourceUsageSnapshot) {
        debug!(
            "cached resource usage for sandbox {}: memory={}, cpu={}ms",
            id, snapshot.memory_bytes, snapshot.cpu_time_ms
        );
        self.entries.insert(id, snapshot);
    }

    pub fn get(&self, id: &str) -> Option<&ResourceUsageSnapshot> {
        self.entries.get(id)
    }

    /// Clear one entry, or everything when no id is given
    pub fn clear(&mut self, id: Option<&str>) {
        match id {
            Some(id) => {
                if self.entries.remove(id).is_some() {
                    info!("cleared cached resource usage for sandbox {}", id);
                }
            }
            None => {
                self.entries.clear();
                info!("cleared all cached resource usage");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::now_ms;

    fn snapshot(memory: u64, cpu: u64) -> ResourceUsageSnapshot {
        ResourceUsageSnapshot {
            memory_bytes: memory,
            cpu_time_ms: cpu,
            timestamp_ms: now_ms(),
            is_destroyed: true,
        }
    }

    #[test]
    fn test_store_and_get() {
        let mut cache = ResourceUsageCache::new();
        cache.store(SandboxId::from("a"), snapshot(1024, 5));

        let entry = cache.get("a").unwrap();
        assert_eq!(entry.memory_bytes, 1024);
        assert_eq!(entry.cpu_time_ms, 5);
        assert!(entry.is_destroyed);
    }

    #[test]
    fn test_disable_purges() {
        let mut cache = ResourceUsageCache::new();
        cache.set_enabled(true);
        cache.store(SandboxId::from("a"), snapshot(1, 1));
        cache.store(SandboxId::from("b"), snapshot(2, 2));

        cache.set_enabled(false);
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_reenable_restores_nothing() {
        let mut cache = ResourceUsageCache::new();
        cache.set_enabled(true);
        cache.store(SandboxId::from("a"), snapshot(1, 1));
        cache.set_enabled(false);
        cache.set_enabled(true);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_clear_by_id_and_wholesale() {
        let mut cache = ResourceUsageCache::new();
        cache.store(SandboxId::from("a"), snapshot(1, 1));
        cache.store(SandboxId::from("b"), snapshot(2, 2));

        cache.clear(Some("a"));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_id_reuse_overwrites() {
        let mut cache = ResourceUsageCache::new();
        cache.store(SandboxId::from("a"), snapshot(1, 1));
        cache.store(SandboxId::from("a"), snapshot(9, 9));
        assert_eq!(cache.get("a").unwrap().memory_bytes, 9);
    }
}
