//! Hostname to organization resolution.
//!
//! A single instance fronts one organization that may be reachable through
//! several hostnames. The mapping is computed once from configuration and
//! shared read-only with every handler invocation.

use crate::config::OrganizationConfig;
use serde::Serialize;

/// One hostname and the organization it selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationEntry {
    pub hostname: String,
    pub organization: String,
}

/// Ordered hostname to organization pairs.
///
/// An empty mapping means the tenancy check is disabled and any `Host`
/// header is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizationMapping {
    entries: Vec<OrganizationEntry>,
}

impl OrganizationMapping {
    /// Pair every hostname with the same organization.
    pub fn resolve<I, S>(hostnames: I, organization: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = hostnames
            .into_iter()
            .map(|host| OrganizationEntry {
                hostname: host.as_ref().to_lowercase(),
                organization: organization.to_string(),
            })
            .collect();
        Self { entries }
    }

    pub fn from_config(config: &OrganizationConfig) -> Self {
        Self::resolve(&config.hostnames, &config.name)
    }

    pub fn entries(&self) -> &[OrganizationEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether requests must present a known host.
    pub fn is_enforced(&self) -> bool {
        !self.is_empty()
    }

    /// Organization selected by a `Host` header value. The port, if any, is ignored.
    pub fn lookup(&self, host: &str) -> Option<&str> {
        let host = strip_port(host).to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.hostname == host)
            .map(|entry| entry.organization.as_str())
    }
}

/// Remove a trailing `:port` from a host, keeping bracketed IPv6 literals intact.
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_pairs_every_host() {
        let mapping = OrganizationMapping::resolve(["localhost", "127.0.0.1"], "local");
        assert_eq!(mapping.entries().len(), 2);
        assert!(mapping.entries().iter().all(|e| e.organization == "local"));
        assert_eq!(mapping.entries()[0].hostname, "localhost");
        assert_eq!(mapping.entries()[1].hostname, "127.0.0.1");
    }

    #[test]
    fn test_empty_hostnames_disable_enforcement() {
        let mapping = OrganizationMapping::resolve(Vec::<String>::new(), "local");
        assert!(mapping.is_empty());
        assert!(!mapping.is_enforced());
        assert_eq!(mapping.lookup("anything"), None);
    }

    #[test]
    fn test_lookup_ignores_port_and_case() {
        let mapping = OrganizationMapping::resolve(["Assets.Example.com"], "acme");
        assert_eq!(mapping.lookup("assets.example.com:4001"), Some("acme"));
        assert_eq!(mapping.lookup("ASSETS.EXAMPLE.COM"), Some("acme"));
        assert_eq!(mapping.lookup("cdn.example.com"), None);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("localhost:4001"), "localhost");
        assert_eq!(strip_port("localhost"), "localhost");
        assert_eq!(strip_port("[::1]:4001"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
    }

    #[test]
    fn test_from_config() {
        let mapping = OrganizationMapping::from_config(&OrganizationConfig::default());
        assert_eq!(mapping.lookup("127.0.0.1:9999"), Some("local"));
    }
}
