/*!
 * Path Access Decisions
 * Deny-first prefix matching over a sandbox policy
 */

use super::types::SandboxConfig;
use std::path::Path;

/// Outcome of a path access decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathDecision {
    /// Path is under an allowed prefix and not under a denied one
    Allowed,
    /// Path matched a denied prefix; checked before the allow-list, always wins
    DeniedPrefix,
    /// Path matched nothing; absence from the allow-list is an implicit deny
    NotAllowListed,
}

impl PathDecision {
    #[inline]
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, PathDecision::Allowed)
    }
}

/// Evaluate a path against a sandbox policy
///
/// Prefix matching is component-wise, so `/tmp/x` covers `/tmp/x/file.txt`
/// but not `/tmp/xy`.
#[must_use]
pub fn evaluate(config: &SandboxConfig, path: &Path) -> PathDecision {
    for denied in &config.denied_paths {
        if path.starts_with(denied) {
            return PathDecision::DeniedPrefix;
        }
    }

    for allowed in &config.allowed_paths {
        if path.starts_with(allowed) {
            return PathDecision::Allowed;
        }
    }

    PathDecision::NotAllowListed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(allowed: &[&str], denied: &[&str]) -> SandboxConfig {
        SandboxConfig {
            allowed_paths: allowed.iter().map(PathBuf::from).collect(),
            denied_paths: denied.iter().map(PathBuf::from).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_allowed_prefix() {
        let cfg = config(&["/tmp/x"], &[]);
        assert_eq!(
            evaluate(&cfg, Path::new("/tmp/x/file.txt")),
            PathDecision::Allowed
        );
        assert_eq!(
            evaluate(&cfg, Path::new("/tmp/x")),
            PathDecision::Allowed
        );
    }

    #[test]
    fn test_component_boundaries() {
        let cfg = config(&["/tmp/x"], &[]);
        assert_eq!(
            evaluate(&cfg, Path::new("/tmp/xy")),
            PathDecision::NotAllowListed
        );
    }

    #[test]
    fn test_denied_wins_over_allowed() {
        let cfg = config(&["/data"], &["/data/secrets"]);
        assert_eq!(
            evaluate(&cfg, Path::new("/data/public/a.txt")),
            PathDecision::Allowed
        );
        assert_eq!(
            evaluate(&cfg, Path::new("/data/secrets/key.pem")),
            PathDecision::DeniedPrefix
        );
    }

    #[test]
    fn test_denied_short_circuits_even_when_allow_listed() {
        // Same prefix in both lists: the deny-list is consulted first.
        let cfg = config(&["/data/secrets"], &["/data/secrets"]);
        assert_eq!(
            evaluate(&cfg, Path::new("/data/secrets/key.pem")),
            PathDecision::DeniedPrefix
        );
    }

    #[test]
    fn test_empty_allow_list_denies_all() {
        let cfg = config(&[], &[]);
        assert_eq!(
            evaluate(&cfg, Path::new("/tmp")),
            PathDecision::NotAllowListed
        );
        assert_eq!(evaluate(&cfg, Path::new("/")), PathDecision::NotAllowListed);
    }
}
