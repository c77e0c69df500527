/*!
 * Network Access Decisions
 * Suffix matching of domains against a sandbox allow-list
 */

/// Check if a domain matches an allow-list of domain suffixes
///
/// Matching is case-insensitive. An entry matches either exactly or as a
/// label-aligned suffix, so `example.com` covers `api.example.com` but not
/// `evilexample.com`.
#[must_use]
pub fn is_domain_allowed(allowed_domains: &[String], domain: &str) -> bool {
    if allowed_domains.is_empty() {
        return false;
    }

    let domain = domain.to_ascii_lowercase();
    allowed_domains.iter().any(|entry| {
        let entry = entry.trim_start_matches('.').to_ascii_lowercase();
        if entry.is_empty() {
            return false;
        }
        domain == entry || domain.ends_with(&format!(".{}", entry))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match() {
        let allowed = domains(&["example.com"]);
        assert!(is_domain_allowed(&allowed, "example.com"));
    }

    #[test]
    fn test_subdomain_suffix_match() {
        let allowed = domains(&["example.com"]);
        assert!(is_domain_allowed(&allowed, "api.example.com"));
        assert!(is_domain_allowed(&allowed, "deep.api.example.com"));
    }

    #[test]
    fn test_label_boundary() {
        let allowed = domains(&["example.com"]);
        assert!(!is_domain_allowed(&allowed, "evilexample.com"));
    }

    #[test]
    fn test_case_insensitive() {
        let allowed = domains(&["Example.COM"]);
        assert!(is_domain_allowed(&allowed, "api.example.com"));
    }

    #[test]
    fn test_leading_dot_entry() {
        let allowed = domains(&[".example.com"]);
        assert!(is_domain_allowed(&allowed, "api.example.com"));
        assert!(is_domain_allowed(&allowed, "example.com"));
    }

    #[test]
    fn test_empty_allow_list_denies() {
        assert!(!is_domain_allowed(&[], "example.com"));
    }
}
