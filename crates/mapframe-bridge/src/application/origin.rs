//! Allow-list gate evaluated on every inbound message.
//!
//! # Matching rules
//!
//! | Allow-list            | Sender                      | Result |
//! |-----------------------|-----------------------------|--------|
//! | empty                 | anything                    | allowed, with a warning |
//! | contains `"*"`        | anything                    | allowed |
//! | `https://a.example`   | `https://a.example:8443`    | allowed (same hostname) |
//! | `https://a.example`   | `https://sub.a.example`     | allowed (dot-suffix subdomain) |
//! | `https://a.example`   | `https://a.example.evil.com`| rejected |
//! | `null`                | `null`                      | allowed (not a URL, compared verbatim) |
//!
//! Scheme and port are ignored; only hostnames are compared.  When either
//! side of a comparison is not a URL with a hostname, that pair falls back to
//! exact string equality.

use tracing::warn;
use url::Url;

/// One allow-list entry, parsed once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AllowedOrigin {
    Any,
    Host { raw: String, host: String },
    Literal(String),
}

impl AllowedOrigin {
    fn parse(entry: &str) -> Self {
        if entry == "*" {
            return AllowedOrigin::Any;
        }
        match hostname(entry) {
            Some(host) => AllowedOrigin::Host {
                raw: entry.to_string(),
                host,
            },
            None => AllowedOrigin::Literal(entry.to_string()),
        }
    }

    fn admits(&self, origin: &str, origin_host: Option<&str>) -> bool {
        match (self, origin_host) {
            (AllowedOrigin::Any, _) => true,
            (AllowedOrigin::Host { host, .. }, Some(candidate)) => {
                candidate == host
                    || candidate
                        .strip_suffix(host.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
            (AllowedOrigin::Host { raw, .. }, None) => raw == origin,
            (AllowedOrigin::Literal(raw), _) => raw == origin,
        }
    }
}

fn hostname(origin: &str) -> Option<String> {
    Url::parse(origin)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .filter(|h| !h.is_empty())
}

/// Pure predicate over sender origins.
#[derive(Debug, Clone)]
pub struct OriginValidator {
    allowed: Vec<AllowedOrigin>,
}

impl OriginValidator {
    pub fn new(allowed_origins: &[String]) -> Self {
        Self {
            allowed: allowed_origins
                .iter()
                .map(|o| AllowedOrigin::parse(o))
                .collect(),
        }
    }

    /// Returns `true` if messages from `origin` may be processed.
    pub fn is_valid(&self, origin: &str) -> bool {
        if self.allowed.is_empty() {
            warn!("no allowed origins configured; accepting message from {origin}");
            return true;
        }
        let origin_host = hostname(origin);
        self.allowed
            .iter()
            .any(|entry| entry.admits(origin, origin_host.as_deref()))
    }

    /// `true` when the allow-list is empty and every origin passes.
    pub fn is_permissive(&self) -> bool {
        self.allowed.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::recording::LogCapture;

    fn validator(origins: &[&str]) -> OriginValidator {
        let owned: Vec<String> = origins.iter().map(|s| s.to_string()).collect();
        OriginValidator::new(&owned)
    }

    #[test]
    fn test_subdomain_of_allowed_host_is_valid() {
        let v = validator(&["https://a.example"]);
        assert!(v.is_valid("https://sub.a.example"));
        assert!(v.is_valid("https://deep.sub.a.example"));
    }

    #[test]
    fn test_suffix_without_dot_boundary_is_invalid() {
        let v = validator(&["https://a.example"]);
        assert!(!v.is_valid("https://a.example.evil.com"));
        assert!(!v.is_valid("https://evila.example"));
    }

    #[test]
    fn test_scheme_and_port_are_ignored() {
        let v = validator(&["https://a.example"]);
        assert!(v.is_valid("http://a.example:8080"));
    }

    #[test]
    fn test_wildcard_admits_anything() {
        let v = validator(&["https://a.example", "*"]);
        assert!(v.is_valid("https://unrelated.test"));
        assert!(v.is_valid("null"));
    }

    #[test]
    fn test_empty_list_is_permissive() {
        let v = validator(&[]);
        assert!(v.is_permissive());
        assert!(v.is_valid("https://anyone.test"));
    }

    #[test]
    fn test_empty_list_logs_a_warning_per_evaluation() {
        // Arrange
        let v = validator(&[]);
        let logs = LogCapture::new();

        // Act
        let valid = logs.capture(|| v.is_valid("https://anyone.test"));

        // Assert
        assert!(valid);
        let out = logs.contents();
        assert!(out.contains("WARN"));
        assert!(out.contains("no allowed origins configured"));
        assert!(out.contains("https://anyone.test"));
    }

    #[test]
    fn test_configured_list_logs_no_warning() {
        let v = validator(&["https://a.example"]);
        let logs = LogCapture::new();
        logs.capture(|| v.is_valid("https://a.example"));
        assert!(!logs.contents().contains("WARN"));
    }

    #[test]
    fn test_non_url_entries_compare_verbatim() {
        // Arrange
        let v = validator(&["null", "https://a.example"]);

        // Act / Assert
        assert!(v.is_valid("null"));
        assert!(!v.is_valid("not a url"));
    }

    #[test]
    fn test_unparseable_sender_against_url_entry_is_invalid() {
        let v = validator(&["https://a.example"]);
        assert!(!v.is_valid("a.example"));
    }

    #[test]
    fn test_hostname_comparison_is_case_insensitive() {
        let v = validator(&["https://A.Example"]);
        assert!(v.is_valid("https://a.example"));
    }
}
