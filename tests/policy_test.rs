/*!
 * Policy Decision Tests
 * Validation predicates and default-deny decisions across the data model
 */

use pretty_assertions::assert_eq;
use sandbox_core::policy::{network, path, validator, PathDecision, SandboxConfig};
use std::path::{Path, PathBuf};

#[test]
fn test_denied_prefix_wins_regardless_of_allow_list() {
    // The deny-list short-circuits before the allow-list is consulted, for
    // every allow-list shape.
    let allow_shapes: Vec<Vec<PathBuf>> = vec![
        vec![],
        vec![PathBuf::from("/data")],
        vec![PathBuf::from("/data/secrets")],
        vec![PathBuf::from("/"), PathBuf::from("/data/secrets")],
    ];

    for allowed_paths in allow_shapes {
        let config = SandboxConfig {
            allowed_paths: allowed_paths.clone(),
            denied_paths: vec![PathBuf::from("/data/secrets")],
            ..Default::default()
        };
        assert_eq!(
            path::evaluate(&config, Path::new("/data/secrets/key.pem")),
            PathDecision::DeniedPrefix,
            "deny must win with allow-list {:?}",
            allowed_paths
        );
    }
}

#[test]
fn test_absence_from_allow_list_is_implicit_deny() {
    let config = SandboxConfig {
        allowed_paths: vec![PathBuf::from("/srv/app")],
        ..Default::default()
    };

    let cases = [
        ("/srv/app/data.db", true),
        ("/srv/app", true),
        ("/srv/apple", false),
        ("/srv", false),
        ("/etc/passwd", false),
    ];
    for (target, expected) in cases {
        assert_eq!(
            path::evaluate(&config, Path::new(target)).is_allowed(),
            expected,
            "unexpected decision for {}",
            target
        );
    }
}

#[test]
fn test_domain_suffix_matching() {
    let allowed = vec!["example.com".to_string(), "internal.net".to_string()];

    assert!(network::is_domain_allowed(&allowed, "example.com"));
    assert!(network::is_domain_allowed(&allowed, "cdn.example.com"));
    assert!(network::is_domain_allowed(&allowed, "a.b.internal.net"));
    assert!(!network::is_domain_allowed(&allowed, "badexample.com"));
    assert!(!network::is_domain_allowed(&allowed, "example.org"));
    assert!(!network::is_domain_allowed(&[], "example.com"));
}

#[test]
fn test_path_safety_predicate() {
    assert!(validator::is_path_safe("/var/lib/app/data"));
    assert!(!validator::is_path_safe("/var/../etc"));
    assert!(!validator::is_path_safe("/var/%2e%2e/etc"));
    assert!(!validator::is_path_safe("/var/\0"));
    assert!(!validator::is_path_safe(""));
}

#[test]
fn test_executable_predicate() {
    assert!(validator::is_valid_executable("/usr/bin/ffprobe"));
    assert!(!validator::is_valid_executable("ffprobe"));
    assert!(!validator::is_valid_executable("/usr/bin/ff probe; id"));
    assert!(!validator::is_valid_executable("/usr/bin/$(id)"));
}

#[test]
fn test_identifier_predicate() {
    assert!(validator::is_valid_identifier("transcode-worker.0"));
    assert!(!validator::is_valid_identifier(".hidden"));
    assert!(!validator::is_valid_identifier("a b"));
    assert!(!validator::is_valid_identifier(""));
}

#[test]
fn test_default_config_denies_everything() {
    let config = SandboxConfig::default();

    assert_eq!(
        path::evaluate(&config, Path::new("/tmp")),
        PathDecision::NotAllowListed
    );
    assert!(!network::is_domain_allowed(
        &config.allowed_network_domains,
        "example.com"
    ));
    assert!(config.permissions.is_empty());
}
