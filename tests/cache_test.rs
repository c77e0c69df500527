/*!
 * Resource Usage Cache Contract Tests
 * Snapshot retention, purge-on-disable, and per-sandbox overrides
 */

use sandbox_core::{SandboxConfig, SandboxError, SandboxManager};

fn initialized_manager() -> SandboxManager {
    let manager = SandboxManager::new();
    manager
        .initialize(SandboxConfig::default())
        .expect("manager should initialize");
    manager
}

#[test]
fn test_cache_disabled_by_default() {
    let manager = initialized_manager();
    assert!(!manager.is_resource_usage_cache_enabled());

    manager
        .create_sandbox("c1", SandboxConfig::default())
        .unwrap();
    manager.destroy_sandbox("c1").unwrap();
    assert!(matches!(
        manager.get_resource_usage("c1"),
        Err(SandboxError::SandboxNotFound(_))
    ));
    manager.shutdown().unwrap();
}

#[test]
fn test_cache_round_trip() {
    let manager = initialized_manager();
    manager.set_resource_usage_cache_enabled(true);
    assert!(manager.is_resource_usage_cache_enabled());

    manager
        .create_sandbox("c2", SandboxConfig::default())
        .unwrap();
    let live = manager.get_resource_usage("c2").unwrap();
    manager.destroy_sandbox("c2").unwrap();

    assert_eq!(
        manager.get_resource_usage("c2").unwrap(),
        live,
        "snapshot recorded at destruction is returned verbatim"
    );
    manager.shutdown().unwrap();
}

#[test]
fn test_disabling_purges_immediately() {
    let manager = initialized_manager();
    manager.set_resource_usage_cache_enabled(true);

    manager
        .create_sandbox("c3", SandboxConfig::default())
        .unwrap();
    manager.destroy_sandbox("c3").unwrap();
    assert!(manager.get_resource_usage("c3").is_ok());

    manager.set_resource_usage_cache_enabled(false);
    assert!(
        matches!(
            manager.get_resource_usage("c3"),
            Err(SandboxError::SandboxNotFound(_))
        ),
        "disabling the cache purges all previously cached entries"
    );

    // Re-enabling does not resurrect anything destroyed while disabled.
    manager.set_resource_usage_cache_enabled(true);
    assert!(matches!(
        manager.get_resource_usage("c3"),
        Err(SandboxError::SandboxNotFound(_))
    ));
    manager.shutdown().unwrap();
}

#[test]
fn test_per_sandbox_override_caches_without_global_flag() {
    let manager = initialized_manager();
    assert!(!manager.is_resource_usage_cache_enabled());

    let mut config = SandboxConfig::default();
    config.enable_resource_usage_cache = true;
    manager.create_sandbox("c4", config).unwrap();
    manager.destroy_sandbox("c4").unwrap();

    let detailed = manager.get_detailed_resource_usage("c4").unwrap();
    assert!(
        detailed.is_destroyed,
        "sandbox-level override is sufficient to retain the snapshot"
    );
    manager.shutdown().unwrap();
}

#[test]
fn test_clear_by_id_and_wholesale() {
    let manager = initialized_manager();
    manager.set_resource_usage_cache_enabled(true);

    for id in ["c5", "c6"] {
        manager.create_sandbox(id, SandboxConfig::default()).unwrap();
        manager.destroy_sandbox(id).unwrap();
    }

    manager.clear_resource_usage_cache(Some("c5"));
    assert!(manager.get_resource_usage("c5").is_err());
    assert!(manager.get_resource_usage("c6").is_ok());

    manager.clear_resource_usage_cache(None);
    assert!(manager.get_resource_usage("c6").is_err());
    manager.shutdown().unwrap();
}

#[test]
fn test_detailed_usage_flags_live_vs_destroyed() {
    let manager = initialized_manager();
    manager.set_resource_usage_cache_enabled(true);

    manager
        .create_sandbox("c7", SandboxConfig::default())
        .unwrap();
    let live = manager.get_detailed_resource_usage("c7").unwrap();
    assert!(!live.is_destroyed);
    assert!(live.timestamp_ms > 0);

    manager.destroy_sandbox("c7").unwrap();
    let cached = manager.get_detailed_resource_usage("c7").unwrap();
    assert!(cached.is_destroyed);
    manager.shutdown().unwrap();
}

#[test]
fn test_unknown_id_is_not_found() {
    let manager = initialized_manager();
    manager.set_resource_usage_cache_enabled(true);
    assert!(matches!(
        manager.get_detailed_resource_usage("never-existed"),
        Err(SandboxError::SandboxNotFound(_))
    ));
    manager.shutdown().unwrap();
}
