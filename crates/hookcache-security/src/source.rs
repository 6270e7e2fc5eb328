//! Source allow-list.
//!
//! Entries are `*` (any source), an exact IP address, or a CIDR network.
//! Networks are matched with `ipnet`, so non-octet-aligned masks behave.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::{SecurityError, SecurityResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceRule {
    Address(IpAddr),
    Network(IpNet),
}

/// Parsed allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePolicy {
    unrestricted: bool,
    rules: Vec<SourceRule>,
}

impl SourcePolicy {
    /// Parse configured entries. An unparseable entry is a configuration error.
    pub fn parse(entries: &[String]) -> SecurityResult<Self> {
        let mut unrestricted = false;
        let mut rules = Vec::with_capacity(entries.len());

        for raw in entries {
            let entry = raw.trim();
            if entry == "*" {
                unrestricted = true;
                continue;
            }
            if entry.contains('/') {
                let net = entry.parse::<IpNet>().map_err(|e| {
                    SecurityError::config(format!("invalid CIDR source '{}': {}", entry, e))
                })?;
                rules.push(SourceRule::Network(net.trunc()));
            } else {
                let addr = entry.parse::<IpAddr>().map_err(|e| {
                    SecurityError::config(format!("invalid source address '{}': {}", entry, e))
                })?;
                rules.push(SourceRule::Address(addr));
            }
        }

        Ok(Self {
            unrestricted,
            rules,
        })
    }

    /// Policy that accepts any source.
    pub fn unrestricted() -> Self {
        Self {
            unrestricted: true,
            rules: Vec::new(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }

    /// Whether `client_ip` may deliver webhooks. Unparseable addresses are
    /// only accepted by an unrestricted policy.
    pub fn allows(&self, client_ip: &str) -> bool {
        if self.unrestricted {
            return true;
        }
        let Ok(addr) = client_ip.trim().parse::<IpAddr>() else {
            return false;
        };
        let addr = canonical(addr);
        self.rules.iter().any(|rule| match rule {
            SourceRule::Address(allowed) => canonical(*allowed) == addr,
            SourceRule::Network(net) => net.contains(&addr),
        })
    }
}

/// Stable identifier for a client address, used to key per-client state.
///
/// Addresses that parse are rendered in canonical form (IPv4-mapped IPv6 as
/// IPv4, compressed lowercase IPv6); anything else is used as given.
pub fn client_key(client_ip: &str) -> String {
    match client_ip.trim().parse::<IpAddr>() {
        Ok(addr) => canonical(addr).to_string(),
        Err(_) => client_ip.to_string(),
    }
}

/// Map IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) to IPv4.
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(entries: &[&str]) -> SourcePolicy {
        let entries: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        SourcePolicy::parse(&entries).unwrap()
    }

    #[test]
    fn test_wildcard_allows_anything() {
        let p = policy(&["*"]);
        assert!(p.allows("203.0.113.9"));
        assert!(p.allows("not-an-ip"));
    }

    #[test]
    fn test_exact_match() {
        let p = policy(&["1.2.3.4"]);
        assert!(p.allows("1.2.3.4"));
        assert!(!p.allows("1.2.3.40"));
        assert!(!p.allows("garbage"));
    }

    #[test]
    fn test_non_octet_aligned_mask() {
        // 10.0.0.0/12 covers 10.0.0.0 - 10.15.255.255
        let p = policy(&["10.0.0.0/12"]);
        assert!(p.allows("10.15.200.1"));
        assert!(!p.allows("10.16.0.1"));
        // A string-prefix shortcut would accept this one.
        assert!(!p.allows("10.100.0.1"));
    }

    #[test]
    fn test_host_bits_in_network_entry() {
        let p = policy(&["192.168.1.77/24"]);
        assert!(p.allows("192.168.1.1"));
        assert!(!p.allows("192.168.2.1"));
    }

    #[test]
    fn test_ipv6_and_mapped_ipv4() {
        let p = policy(&["2001:db8::/32", "1.2.3.4"]);
        assert!(p.allows("2001:db8:1::5"));
        assert!(!p.allows("2001:db9::1"));
        assert!(p.allows("::ffff:1.2.3.4"));
    }

    #[test]
    fn test_client_key_is_canonical() {
        assert_eq!(client_key("::ffff:1.2.3.4"), "1.2.3.4");
        assert_eq!(client_key(" 1.2.3.4 "), "1.2.3.4");
        assert_eq!(client_key("2001:DB8:0:0::1"), "2001:db8::1");
        assert_eq!(client_key("not-an-ip"), "not-an-ip");
    }

    #[test]
    fn test_empty_policy_denies() {
        let p = policy(&[]);
        assert!(!p.allows("127.0.0.1"));
    }

    #[test]
    fn test_invalid_entries() {
        assert!(SourcePolicy::parse(&["10.0.0.0/33".to_string()]).is_err());
        assert!(SourcePolicy::parse(&["example.com".to_string()]).is_err());
    }
}
