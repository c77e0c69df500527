/*!
 * Sandbox Manager Integration Tests
 * Lifecycle, permission checks, violations, and process execution
 */

use sandbox_core::{
    Permission, SandboxConfig, SandboxError, SandboxEvent, SandboxId, SandboxManager,
};
use serial_test::serial;

fn initialized_manager() -> SandboxManager {
    let _ = env_logger::builder().is_test(true).try_init();
    let manager = SandboxManager::new();
    manager
        .initialize(SandboxConfig::default())
        .expect("manager should initialize");
    manager
}

fn config_with_paths(allowed: &[&str], denied: &[&str]) -> SandboxConfig {
    let mut config = SandboxConfig::default();
    for path in allowed {
        config.allow_path(*path);
    }
    for path in denied {
        config.deny_path(*path);
    }
    config
}

#[test]
fn test_uninitialized_manager_fails_before_any_lookup() {
    let manager = SandboxManager::new();
    assert!(!manager.is_initialized());

    assert!(matches!(
        manager.create_sandbox("s1", SandboxConfig::default()),
        Err(SandboxError::InitializationFailed(_))
    ));
    assert!(matches!(
        manager.get_resource_usage("s1"),
        Err(SandboxError::InitializationFailed(_))
    ));
    assert!(matches!(
        manager.check_permission("s1", Permission::ReadFile),
        Err(SandboxError::InitializationFailed(_))
    ));
    assert!(matches!(
        manager.destroy_sandbox("s1"),
        Err(SandboxError::InitializationFailed(_))
    ));
}

#[test]
fn test_initialize_is_idempotent_and_reinit_after_shutdown() {
    let manager = SandboxManager::new();
    manager.initialize(SandboxConfig::default()).unwrap();
    assert!(manager.is_initialized());
    manager.initialize(SandboxConfig::default()).unwrap();

    manager.shutdown().unwrap();
    assert!(!manager.is_initialized());
    // Shutdown of an uninitialized manager is a no-op success.
    manager.shutdown().unwrap();

    manager.initialize(SandboxConfig::default()).unwrap();
    assert!(manager.is_initialized());
    manager.shutdown().unwrap();
}

#[test]
fn test_scenario_default_deny_and_no_cache() {
    // Scenario A: allow-listed prefix grants access, everything else is
    // denied, and a destroyed sandbox leaves no usage behind by default.
    let manager = initialized_manager();

    let mut config = config_with_paths(&["/tmp/x"], &[]);
    config.max_memory_bytes = 1024;
    config.max_cpu_time_secs = 5;
    manager.create_sandbox("s1", config).unwrap();

    assert!(
        manager
            .check_path_access("s1", "/tmp/x/file.txt", Permission::ReadFile)
            .unwrap(),
        "path under allowed prefix should be accessible"
    );
    assert!(
        !manager
            .check_path_access("s1", "/etc/passwd", Permission::ReadFile)
            .unwrap(),
        "path outside allowed prefix should be denied"
    );

    manager.destroy_sandbox("s1").unwrap();
    assert!(
        matches!(
            manager.get_resource_usage("s1"),
            Err(SandboxError::SandboxNotFound(_))
        ),
        "cache is disabled by default, destroyed sandbox leaves nothing"
    );
    manager.shutdown().unwrap();
}

#[test]
fn test_scenario_cached_usage_after_destruction() {
    // Scenario B: with the cache enabled, the last live usage pair survives
    // destruction exactly.
    let manager = initialized_manager();
    manager.set_resource_usage_cache_enabled(true);

    let mut config = config_with_paths(&["/tmp/x"], &[]);
    config.max_memory_bytes = 1024;
    config.max_cpu_time_secs = 5;
    manager.create_sandbox("s1", config).unwrap();

    let live = manager.get_resource_usage("s1").unwrap();
    manager.destroy_sandbox("s1").unwrap();

    let cached = manager.get_resource_usage("s1").unwrap();
    assert_eq!(cached, live, "cached usage must equal the last live pair");

    let detailed = manager.get_detailed_resource_usage("s1").unwrap();
    assert!(detailed.is_destroyed, "snapshot must be marked destroyed");
    assert_eq!(detailed.memory_bytes, live.0);
    assert_eq!(detailed.cpu_time_ms, live.1);
    manager.shutdown().unwrap();
}

#[test]
fn test_create_duplicate_id_is_noop() {
    let manager = initialized_manager();

    manager
        .create_sandbox("dup", config_with_paths(&["/tmp/a"], &[]))
        .unwrap();
    // Second create succeeds but must not replace the existing config.
    manager
        .create_sandbox("dup", config_with_paths(&["/tmp/b"], &[]))
        .unwrap();

    let config = manager.get_sandbox_config("dup").unwrap();
    assert_eq!(
        config.allowed_paths,
        vec![std::path::PathBuf::from("/tmp/a")],
        "original config must survive a duplicate create"
    );
    manager.shutdown().unwrap();
}

#[test]
fn test_create_sandbox_validation() {
    let manager = initialized_manager();

    assert!(
        matches!(
            manager.create_sandbox("bad id!", SandboxConfig::default()),
            Err(SandboxError::ConfigurationError(_))
        ),
        "identifier with spaces and punctuation is rejected"
    );

    let traversal = config_with_paths(&["/tmp/../etc"], &[]);
    assert!(matches!(
        manager.create_sandbox("s2", traversal),
        Err(SandboxError::InvalidPath(_))
    ));

    let mut bad_exe = SandboxConfig::default();
    bad_exe.allow_executable("sh");
    assert!(matches!(
        manager.create_sandbox("s3", bad_exe),
        Err(SandboxError::ConfigurationError(_))
    ));

    let mut zero_mem = SandboxConfig::default();
    zero_mem.max_memory_bytes = 0;
    assert!(matches!(
        manager.create_sandbox("s4", zero_mem),
        Err(SandboxError::ConfigurationError(_))
    ));

    let mut zero_cpu = SandboxConfig::default();
    zero_cpu.max_cpu_time_secs = 0;
    assert!(matches!(
        manager.create_sandbox("s5", zero_cpu),
        Err(SandboxError::ConfigurationError(_))
    ));
    manager.shutdown().unwrap();
}

#[test]
fn test_destroy_unknown_and_already_destroyed() {
    let manager = initialized_manager();
    assert!(matches!(
        manager.destroy_sandbox("ghost"),
        Err(SandboxError::ConfigurationError(_))
    ));

    manager
        .create_sandbox("once", SandboxConfig::default())
        .unwrap();
    manager.destroy_sandbox("once").unwrap();
    assert!(
        matches!(
            manager.destroy_sandbox("once"),
            Err(SandboxError::ConfigurationError(_))
        ),
        "destroying an already-destroyed id reports ConfigurationError"
    );
    manager.shutdown().unwrap();
}

#[test]
fn test_checks_on_unknown_sandbox_are_errors_not_false() {
    let manager = initialized_manager();

    assert!(matches!(
        manager.check_permission("ghost", Permission::ReadFile),
        Err(SandboxError::ConfigurationError(_))
    ));
    assert!(matches!(
        manager.check_path_access("ghost", "/tmp/a", Permission::ReadFile),
        Err(SandboxError::ConfigurationError(_))
    ));
    assert!(matches!(
        manager.check_network_access("ghost", "example.com", 443),
        Err(SandboxError::ConfigurationError(_))
    ));
    manager.shutdown().unwrap();
}

#[test]
fn test_permission_categories_and_gates() {
    let manager = initialized_manager();

    let mut config = SandboxConfig::default();
    config.grant(Permission::ReadFile);
    config.grant(Permission::NetworkAccess);
    // Gate stays closed: listing the permission is not enough.
    config.enable_network_access = false;
    manager.create_sandbox("gated", config.clone()).unwrap();

    assert!(manager
        .check_permission("gated", Permission::ReadFile)
        .unwrap());
    assert!(
        !manager
            .check_permission("gated", Permission::NetworkAccess)
            .unwrap(),
        "closed category gate must deny a listed permission"
    );
    assert!(!manager
        .check_permission("gated", Permission::WriteFile)
        .unwrap());

    config.enable_network_access = true;
    manager.update_sandbox_config("gated", config).unwrap();
    assert!(manager
        .check_permission("gated", Permission::NetworkAccess)
        .unwrap());
    manager.shutdown().unwrap();
}

#[test]
fn test_denied_paths_always_win() {
    let manager = initialized_manager();
    manager
        .create_sandbox("dpx", config_with_paths(&["/tmp"], &["/tmp/secret"]))
        .unwrap();

    assert!(manager
        .check_path_access("dpx", "/tmp/ok.txt", Permission::ReadFile)
        .unwrap());
    assert!(
        !manager
            .check_path_access("dpx", "/tmp/secret/key.pem", Permission::ReadFile)
            .unwrap(),
        "denied prefix wins over the enclosing allowed prefix"
    );
    manager.shutdown().unwrap();
}

#[test]
fn test_unsafe_path_is_an_error() {
    let manager = initialized_manager();
    manager
        .create_sandbox("paths", config_with_paths(&["/tmp"], &[]))
        .unwrap();

    assert!(matches!(
        manager.check_path_access("paths", "/tmp/../etc/passwd", Permission::ReadFile),
        Err(SandboxError::InvalidPath(_))
    ));
    manager.shutdown().unwrap();
}

#[test]
fn test_sandboxed_file_io_respects_policy() {
    let manager = initialized_manager();
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_str().unwrap().to_string();

    manager
        .create_sandbox("io", config_with_paths(&[&root], &[]))
        .unwrap();

    let file = format!("{}/data.txt", root);
    manager
        .write_file_in_sandbox("io", &file, b"payload")
        .expect("write inside allowed prefix");
    let bytes = manager
        .read_file_in_sandbox("io", &file)
        .expect("read inside allowed prefix");
    assert_eq!(bytes, b"payload");

    assert!(matches!(
        manager.read_file_in_sandbox("io", "/etc/hostname"),
        Err(SandboxError::PermissionDenied(_))
    ));
    assert_eq!(
        manager.get_violations("io").unwrap().len(),
        1,
        "denied read leaves a violation"
    );
    manager.shutdown().unwrap();
}

#[test]
fn test_network_access_checks() {
    let manager = initialized_manager();

    let mut config = SandboxConfig::default();
    config.allow_domain("example.com");
    manager.create_sandbox("net", config.clone()).unwrap();

    assert!(
        !manager
            .check_network_access("net", "example.com", 443)
            .unwrap(),
        "network gate closed: even an allow-listed domain is denied"
    );

    config.enable_network_access = true;
    manager.update_sandbox_config("net", config).unwrap();

    assert!(manager
        .check_network_access("net", "example.com", 443)
        .unwrap());
    assert!(
        manager
            .check_network_access("net", "api.example.com", 443)
            .unwrap(),
        "subdomain matches the allowed suffix"
    );
    assert!(!manager
        .check_network_access("net", "other.org", 443)
        .unwrap());
    manager.shutdown().unwrap();
}

#[test]
fn test_request_network_access_denied_by_policy() {
    let manager = initialized_manager();
    assert!(matches!(
        manager.request_network_access("example.com", 443),
        Err(SandboxError::NetworkRestricted(_))
    ));
    manager.shutdown().unwrap();
}

#[test]
fn test_violations_are_recorded_and_raised() {
    let manager = initialized_manager();
    let events = manager.subscribe();

    manager
        .create_sandbox("audit", config_with_paths(&["/tmp/x"], &[]))
        .unwrap();
    let allowed = manager
        .check_path_access("audit", "/etc/passwd", Permission::WriteFile)
        .unwrap();
    assert!(!allowed);

    let violations = manager.get_violations("audit").unwrap();
    assert_eq!(violations.len(), 1, "denial must append one violation");
    assert!(
        violations[0].message.contains("/etc/passwd"),
        "violation names the denied path: {}",
        violations[0].message
    );

    let received: Vec<SandboxEvent> = events.try_iter().collect();
    assert!(received.contains(&SandboxEvent::Created {
        id: SandboxId::from("audit")
    }));
    assert!(
        received
            .iter()
            .any(|e| matches!(e, SandboxEvent::ViolationDetected { id, .. } if id.as_str() == "audit")),
        "denial must raise a violation event"
    );

    manager.clear_violations("audit").unwrap();
    assert!(manager.get_violations("audit").unwrap().is_empty());
    manager.shutdown().unwrap();
}

#[test]
fn test_execute_requires_gate_and_allow_list() {
    let manager = initialized_manager();

    let mut config = SandboxConfig::default();
    config.allow_executable("/bin/sh");
    manager.create_sandbox("exec1", config.clone()).unwrap();

    // Gate closed: process creation is disabled as a whole.
    assert!(matches!(
        manager.execute_in_sandbox("exec1", "/bin/sh", &[]),
        Err(SandboxError::FeatureDisabled(_))
    ));

    config.enable_process_creation = true;
    manager.update_sandbox_config("exec1", config).unwrap();

    // Gate open but executable not on the allow-list.
    assert!(matches!(
        manager.execute_in_sandbox("exec1", "/bin/ls", &[]),
        Err(SandboxError::RestrictedOperation(_))
    ));

    let violations = manager.get_violations("exec1").unwrap();
    assert_eq!(violations.len(), 2, "both denials leave an audit trail");
    manager.shutdown().unwrap();
}

#[cfg(unix)]
#[test]
#[serial]
fn test_execute_spawns_and_destroy_terminates() {
    let manager = initialized_manager();

    let mut config = SandboxConfig::default();
    config.enable_process_creation = true;
    config.allow_executable("/bin/sh");
    manager.create_sandbox("runner", config).unwrap();

    manager
        .execute_in_sandbox(
            "runner",
            "/bin/sh",
            &["-c".to_string(), "sleep 30".to_string()],
        )
        .expect("allow-listed executable should spawn");

    // Destroy terminates the bound process (graceful, then forced).
    manager.destroy_sandbox("runner").unwrap();
    manager.shutdown().unwrap();
}

#[cfg(unix)]
#[test]
#[serial]
fn test_execute_spawn_failure_maps_to_process_creation_failed() {
    let manager = initialized_manager();

    let mut config = SandboxConfig::default();
    config.enable_process_creation = true;
    config.allow_executable("/nonexistent/binary");
    manager.create_sandbox("broken", config).unwrap();

    assert!(matches!(
        manager.execute_in_sandbox("broken", "/nonexistent/binary", &[]),
        Err(SandboxError::ProcessCreationFailed(_))
    ));
    manager.shutdown().unwrap();
}

#[cfg(unix)]
#[test]
fn test_execute_command_safe_list() {
    let manager = initialized_manager();
    manager
        .execute_command("/usr/bin/which", &["ls".to_string()])
        .expect("safe command is allowed");
    assert!(matches!(
        manager.execute_command("/bin/rm", &["-rf".to_string()]),
        Err(SandboxError::ExecutionBlocked(_))
    ));
    manager.shutdown().unwrap();
}

#[test]
fn test_set_resource_limits() {
    let manager = initialized_manager();
    manager
        .create_sandbox("limits", SandboxConfig::default())
        .unwrap();

    manager
        .set_resource_limits("limits", 64 * 1024 * 1024, 30)
        .unwrap();
    let config = manager.get_sandbox_config("limits").unwrap();
    assert_eq!(config.max_memory_bytes, 64 * 1024 * 1024);
    assert_eq!(config.max_cpu_time_secs, 30);

    assert!(matches!(
        manager.set_resource_limits("limits", 0, 30),
        Err(SandboxError::ConfigurationError(_))
    ));
    assert!(matches!(
        manager.set_resource_limits("ghost", 1024, 30),
        Err(SandboxError::ConfigurationError(_))
    ));
    manager.shutdown().unwrap();
}

#[test]
fn test_enable_monitoring_keeps_history() {
    let manager = initialized_manager();
    manager
        .create_sandbox("mon", config_with_paths(&["/tmp/x"], &[]))
        .unwrap();

    let _ = manager.check_path_access("mon", "/etc/passwd", Permission::ReadFile);
    assert_eq!(manager.get_violations("mon").unwrap().len(), 1);

    manager.enable_monitoring("mon", false).unwrap();
    assert_eq!(
        manager.get_violations("mon").unwrap().len(),
        1,
        "detaching monitoring must not clear violation history"
    );
    manager.enable_monitoring("mon", true).unwrap();

    assert!(matches!(
        manager.enable_monitoring("ghost", true),
        Err(SandboxError::ConfigurationError(_))
    ));
    manager.shutdown().unwrap();
}

#[test]
fn test_active_sandboxes_and_global_config() {
    let manager = initialized_manager();
    manager
        .create_sandbox("a1", SandboxConfig::default())
        .unwrap();
    manager
        .create_sandbox("a2", SandboxConfig::default())
        .unwrap();

    let mut ids: Vec<String> = manager
        .active_sandboxes()
        .unwrap()
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a1", "a2"]);

    let global = manager.global_config().unwrap();
    assert_eq!(global.max_cpu_time_secs, 60);
    manager.shutdown().unwrap();
}

#[test]
fn test_shutdown_destroys_everything_and_emits_events() {
    let manager = initialized_manager();
    let events = manager.subscribe();
    manager.set_resource_usage_cache_enabled(true);
    manager
        .create_sandbox("sd1", SandboxConfig::default())
        .unwrap();

    manager.shutdown().unwrap();

    let received: Vec<SandboxEvent> = events.try_iter().collect();
    assert!(received.contains(&SandboxEvent::Destroyed {
        id: SandboxId::from("sd1")
    }));

    // Shutdown releases process-lifetime state, including the cache.
    manager.initialize(SandboxConfig::default()).unwrap();
    assert!(matches!(
        manager.get_resource_usage("sd1"),
        Err(SandboxError::SandboxNotFound(_))
    ));
    manager.shutdown().unwrap();
}

#[test]
fn test_id_reuse_starts_fresh() {
    let manager = initialized_manager();
    manager.set_resource_usage_cache_enabled(true);

    manager
        .create_sandbox("reuse", config_with_paths(&["/tmp/x"], &[]))
        .unwrap();
    let _ = manager.check_path_access("reuse", "/etc/passwd", Permission::ReadFile);
    assert_eq!(manager.get_violations("reuse").unwrap().len(), 1);
    manager.destroy_sandbox("reuse").unwrap();

    // A new sandbox under the same id is an unrelated fresh record.
    manager
        .create_sandbox("reuse", config_with_paths(&["/tmp/y"], &[]))
        .unwrap();
    assert!(
        manager.get_violations("reuse").unwrap().is_empty(),
        "no inherited violation history on id reuse"
    );
    let detailed = manager.get_detailed_resource_usage("reuse").unwrap();
    assert!(!detailed.is_destroyed, "live record shadows the old snapshot");
    manager.shutdown().unwrap();
}
