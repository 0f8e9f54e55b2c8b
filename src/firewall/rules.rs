//! Per-node rule set
//!
//! For every SIP profile the node accepts SIP from the far-end networks of
//! the interconnections on that profile and RTP from their media networks,
//! and drops everything else aimed at the profile's SIP ports. Far-end
//! networks of the other IP family and loopback networks are left out.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::net::IpAddr;

use super::errors::{FirewallError, FirewallResult};
use crate::registry::validation::parse_network;
use crate::registry::{Entity, EntityClass, NetAlias, Registry};

/// Rules for one SIP profile on one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRules {
    pub name: String,
    pub sip_ip: IpAddr,
    pub rtp_ip: IpAddr,
    pub sip_udp_port: u16,
    pub sip_tcp_ports: BTreeSet<u16>,
    pub farend_sip: BTreeSet<String>,
    pub farend_rtp: BTreeSet<String>,
}

/// Everything the rule file for one node is rendered from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallState {
    pub nodeid: String,
    pub rtp_start_port: u16,
    pub rtp_end_port: u16,
    pub profiles: Vec<ProfileRules>,
}

impl FirewallState {
    /// Collect the rule inputs for `nodeid` from the registry
    pub fn load(registry: &Registry, nodeid: &str) -> FirewallResult<Self> {
        let cluster = registry.cluster();
        let mut profiles = Vec::new();

        for summary in registry.list(EntityClass::SipProfile)? {
            let entity = registry.get(EntityClass::SipProfile, &summary.name)?;
            let Some(profile) = entity.as_sipprofile() else {
                continue;
            };
            let sip_ip = listen_ip(registry, &profile.sip_address, nodeid)?;
            let rtp_ip = listen_ip(registry, &profile.rtp_address, nodeid)?;

            let mut farend_sip = BTreeSet::new();
            let mut farend_rtp = BTreeSet::new();
            for nameid in registry.engaged_by(EntityClass::SipProfile, &profile.name)? {
                let Some((class, name)) = EntityClass::parse_nameid(&nameid) else {
                    continue;
                };
                match registry.get(class, name)? {
                    Entity::Inbound(intcon) => {
                        farend_sip.extend(same_family(&intcon.sip_ips, sip_ip));
                        farend_rtp.extend(same_family(&intcon.rtp_nets, rtp_ip));
                    }
                    Entity::Outbound(intcon) => {
                        farend_rtp.extend(same_family(&intcon.rtp_nets, rtp_ip));
                    }
                    _ => {}
                }
            }

            let mut sip_tcp_ports = BTreeSet::from([profile.sip_port]);
            sip_tcp_ports.extend(profile.sips_port);
            profiles.push(ProfileRules {
                name: profile.name.clone(),
                sip_ip,
                rtp_ip,
                sip_udp_port: profile.sip_port,
                sip_tcp_ports,
                farend_sip,
                farend_rtp,
            });
        }

        Ok(Self {
            nodeid: nodeid.to_string(),
            rtp_start_port: cluster.config.rtp_start_port,
            rtp_end_port: cluster.config.rtp_end_port,
            profiles,
        })
    }

    /// nftables rule file
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "#!/usr/sbin/nft -f");
        let _ = writeln!(out, "# sbcplane rules for node {}", self.nodeid);
        let _ = writeln!(out, "table inet sbcplane");
        let _ = writeln!(out, "delete table inet sbcplane");
        let _ = writeln!(out, "table inet sbcplane {{");
        let _ = writeln!(out, "    chain input {{");
        let _ = writeln!(out, "        type filter hook input priority 0; policy accept;");
        let rtp_ports = format!("{}-{}", self.rtp_start_port, self.rtp_end_port);

        for profile in &self.profiles {
            let sip_family = family(profile.sip_ip);
            let rtp_family = family(profile.rtp_ip);
            let tcp_ports = join(profile.sip_tcp_ports.iter());
            let _ = writeln!(out, "        # sipprofile {}", profile.name);
            if !profile.farend_sip.is_empty() {
                let sources = join(profile.farend_sip.iter());
                let _ = writeln!(
                    out,
                    "        {f} saddr {{ {s} }} {f} daddr {ip} udp dport {port} accept",
                    f = sip_family,
                    s = sources,
                    ip = profile.sip_ip,
                    port = profile.sip_udp_port
                );
                let _ = writeln!(
                    out,
                    "        {f} saddr {{ {s} }} {f} daddr {ip} tcp dport {{ {ports} }} accept",
                    f = sip_family,
                    s = sources,
                    ip = profile.sip_ip,
                    ports = tcp_ports
                );
            }
            if !profile.farend_rtp.is_empty() {
                let _ = writeln!(
                    out,
                    "        {f} saddr {{ {s} }} {f} daddr {ip} udp dport {ports} accept",
                    f = rtp_family,
                    s = join(profile.farend_rtp.iter()),
                    ip = profile.rtp_ip,
                    ports = rtp_ports
                );
            }
            let _ = writeln!(
                out,
                "        {f} daddr {ip} udp dport {port} drop",
                f = sip_family,
                ip = profile.sip_ip,
                port = profile.sip_udp_port
            );
            let _ = writeln!(
                out,
                "        {f} daddr {ip} tcp dport {{ {ports} }} drop",
                f = sip_family,
                ip = profile.sip_ip,
                ports = tcp_ports
            );
        }
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out, "}}");
        out
    }
}

fn listen_ip(registry: &Registry, alias: &str, nodeid: &str) -> FirewallResult<IpAddr> {
    let entity = registry.get(EntityClass::NetAlias, alias)?;
    let address = entity
        .as_netalias()
        .and_then(|a: &NetAlias| a.address_of(nodeid))
        .ok_or_else(|| {
            FirewallError::State(format!("netalias '{}' has no address for '{}'", alias, nodeid))
        })?;
    address.listen.parse().map_err(|_| {
        FirewallError::State(format!("netalias '{}' listen address is not an IP", alias))
    })
}

fn same_family(networks: &[String], listen: IpAddr) -> Vec<String> {
    networks
        .iter()
        .filter(|net| match parse_network(net) {
            Some((addr, _)) => addr.is_ipv4() == listen.is_ipv4() && !addr.is_loopback(),
            None => false,
        })
        .cloned()
        .collect()
}

fn family(ip: IpAddr) -> &'static str {
    if ip.is_ipv4() {
        "ip"
    } else {
        "ip6"
    }
}

fn join<T: ToString>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> FirewallState {
        FirewallState {
            nodeid: "sbc1".into(),
            rtp_start_port: 10000,
            rtp_end_port: 20000,
            profiles: vec![ProfileRules {
                name: "external".into(),
                sip_ip: "192.0.2.10".parse().unwrap(),
                rtp_ip: "192.0.2.11".parse().unwrap(),
                sip_udp_port: 5060,
                sip_tcp_ports: BTreeSet::from([5060, 5061]),
                farend_sip: BTreeSet::from(["198.51.100.0/24".to_string()]),
                farend_rtp: BTreeSet::new(),
            }],
        }
    }

    #[test]
    fn test_render_profile_rules() {
        let rules = state().render();
        assert!(rules.contains("# sipprofile external"));
        assert!(rules.contains(
            "ip saddr { 198.51.100.0/24 } ip daddr 192.0.2.10 udp dport 5060 accept"
        ));
        assert!(rules.contains("ip daddr 192.0.2.10 tcp dport { 5060, 5061 } drop"));
        // no media networks, no rtp accept
        assert!(!rules.contains("dport 10000-20000"));
    }

    #[test]
    fn test_family_and_loopback_filter() {
        let nets = vec![
            "198.51.100.0/24".to_string(),
            "2001:db8::/32".to_string(),
            "127.0.0.1".to_string(),
        ];
        let v4: IpAddr = "192.0.2.10".parse().unwrap();
        assert_eq!(same_family(&nets, v4), vec!["198.51.100.0/24".to_string()]);
        let v6: IpAddr = "2001:db8::10".parse().unwrap();
        assert_eq!(same_family(&nets, v6), vec!["2001:db8::/32".to_string()]);
    }
}
