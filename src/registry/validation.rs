//! Syntax checks shared by the entity models

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

use super::errors::{RegistryError, RegistryResult};
use crate::config::ClusterConfig;

/// Builtin ACLs provided by the call engine itself
pub const BUILTIN_ACLS: [&str; 5] = [
    "rfc1918.auto",
    "nat.auto",
    "localnet.auto",
    "loopback.auto",
    "none",
];

/// Marker for "every cluster member" in interconnection node lists
pub const ALL_NODES: &str = "_ALL_";

pub const MAX_WEIGHT: u32 = 100;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").expect("static pattern"))
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9\-]{0,61}[A-Za-z0-9])?$").expect("static pattern")
    })
}

pub fn is_builtin_acl(name: &str) -> bool {
    BUILTIN_ACLS.contains(&name)
}

/// Entity names: letters, digits, `_`, `.`, `-`; 1 to 64 characters
pub fn check_name(field: &str, name: &str) -> RegistryResult<()> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(RegistryError::validation(
            field,
            format!("'{}' is not a valid name", name),
        ))
    }
}

pub fn check_names(field: &str, names: &[String]) -> RegistryResult<()> {
    names.iter().try_for_each(|n| check_name(field, n))
}

pub fn is_hostname(value: &str) -> bool {
    let trimmed = value.strip_suffix('.').unwrap_or(value);
    !trimmed.is_empty()
        && trimmed.len() <= 253
        && trimmed.split('.').all(|label| label_pattern().is_match(label))
}

pub fn is_host_or_ip(value: &str) -> bool {
    value.parse::<IpAddr>().is_ok() || is_hostname(value)
}

/// Parse `addr` or `addr/prefix` into an address and prefix length
pub fn parse_network(value: &str) -> Option<(IpAddr, u8)> {
    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (value, None),
    };
    let addr: IpAddr = addr.parse().ok()?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    let prefix = match prefix {
        Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max)?,
        None => max,
    };
    Some((addr, prefix))
}

pub fn check_networks(field: &str, values: &[String]) -> RegistryResult<()> {
    for value in values {
        if parse_network(value).is_none() {
            return Err(RegistryError::validation(
                field,
                format!("'{}' is not an IP network", value),
            ));
        }
    }
    Ok(())
}

pub fn check_ip(field: &str, value: &str) -> RegistryResult<()> {
    value
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| RegistryError::validation(field, format!("'{}' is not an IP address", value)))
}

pub fn check_pattern(field: &str, pattern: &str) -> RegistryResult<()> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| RegistryError::validation(field, format!("invalid pattern: {}", e)))
}

/// Weighted endpoint lists: 1 to `max` endpoints, no duplicates, and one
/// weight in `0..=100` per endpoint once there is more than one endpoint.
pub fn check_endpoints(endpoints: &[String], weights: &[u32], max: usize) -> RegistryResult<()> {
    if endpoints.is_empty() || endpoints.len() > max {
        return Err(RegistryError::validation(
            "endpoints",
            format!("expected 1 to {} endpoints", max),
        ));
    }
    check_names("endpoints", endpoints)?;
    for (i, endpoint) in endpoints.iter().enumerate() {
        if endpoints[..i].contains(endpoint) {
            return Err(RegistryError::validation(
                "endpoints",
                format!("duplicate endpoint '{}'", endpoint),
            ));
        }
    }
    if endpoints.len() > 1 && weights.len() != endpoints.len() {
        return Err(RegistryError::validation(
            "weights",
            "one weight is required per endpoint",
        ));
    }
    if weights.len() > endpoints.len() {
        return Err(RegistryError::validation(
            "weights",
            "more weights than endpoints",
        ));
    }
    check_weights("weights", weights)
}

pub fn check_weights(field: &str, weights: &[u32]) -> RegistryResult<()> {
    match weights.iter().find(|w| **w > MAX_WEIGHT) {
        Some(w) => Err(RegistryError::validation(
            field,
            format!("weight {} is outside 0..={}", w, MAX_WEIGHT),
        )),
        None => Ok(()),
    }
}

/// `["_ALL_"]` or a non-empty subset of the cluster members
pub fn check_nodes(nodes: &[String], cluster: &ClusterConfig) -> RegistryResult<()> {
    if nodes.is_empty() {
        return Err(RegistryError::validation("nodes", "at least one node is required"));
    }
    if nodes.len() == 1 && nodes[0] == ALL_NODES {
        return Ok(());
    }
    for node in nodes {
        if !cluster.is_member(node) {
            return Err(RegistryError::validation(
                "nodes",
                format!("'{}' is not a cluster member", node),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert!(check_name("name", "carrier-A_1.x").is_ok());
        assert!(check_name("name", "").is_err());
        assert!(check_name("name", "has:colon").is_err());
        assert!(check_name("name", &"a".repeat(65)).is_err());
    }

    #[test]
    fn test_networks() {
        assert_eq!(
            parse_network("10.0.0.0/8"),
            Some(("10.0.0.0".parse().unwrap(), 8))
        );
        assert_eq!(parse_network("2001:db8::1").map(|(_, p)| p), Some(128));
        assert!(parse_network("10.0.0.0/33").is_none());
        assert!(parse_network("example.com").is_none());
    }

    #[test]
    fn test_hostnames() {
        assert!(is_hostname("sip.example.com"));
        assert!(is_hostname("example.com."));
        assert!(!is_hostname("-bad.example"));
        assert!(!is_hostname("under_score.example"));
        assert!(is_host_or_ip("192.0.2.10"));
    }

    #[test]
    fn test_endpoint_weights() {
        let two = vec!["a".to_string(), "b".to_string()];
        assert!(check_endpoints(&two, &[], 3).is_err());
        assert!(check_endpoints(&two, &[60, 40], 3).is_ok());
        assert!(check_endpoints(&two, &[70, 70], 3).is_ok());
        assert!(check_endpoints(&two, &[101, 1], 3).is_err());
        assert!(check_endpoints(&["a".to_string()], &[], 3).is_ok());
        let dup = vec!["a".to_string(), "a".to_string()];
        assert!(check_endpoints(&dup, &[1, 1], 3).is_err());
    }

    #[test]
    fn test_nodes() {
        let cluster = ClusterConfig::standalone("n1");
        assert!(check_nodes(&[ALL_NODES.to_string()], &cluster).is_ok());
        assert!(check_nodes(&["n1".to_string()], &cluster).is_ok());
        assert!(check_nodes(&["n9".to_string()], &cluster).is_err());
        assert!(check_nodes(&[], &cluster).is_err());
    }
}
