//! Entity models
//!
//! Each model declares its outgoing references once through [`Model`];
//! engagement bookkeeping, cascading rename and existence checks are
//! derived from those declarations by the registry.

use std::collections::BTreeSet;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::entity::{record_id, EntityClass, DEFAULT_ENTRY};
use super::errors::{RegistryError, RegistryResult};
use super::validation::{
    check_endpoints, check_ip, check_name, check_names, check_networks, check_nodes,
    check_pattern, check_weights, is_builtin_acl, is_host_or_ip, is_hostname, ALL_NODES,
};
use crate::config::ClusterConfig;

/// Outgoing reference to another entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub class: EntityClass,
    pub name: String,
}

impl Reference {
    pub fn new(class: EntityClass, name: impl Into<String>) -> Self {
        Self {
            class,
            name: name.into(),
        }
    }

    pub fn nameid(&self) -> String {
        self.class.nameid(&self.name)
    }

    pub fn record_key(&self) -> String {
        self.class.record_key(&self.name)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nameid())
    }
}

/// Per-class declarations used by the registry
pub trait Model: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync {
    const CLASS: EntityClass;

    /// Identifier within the class
    fn id(&self) -> String;

    fn desc(&self) -> &str {
        ""
    }

    /// Entities this one depends on
    fn references(&self) -> BTreeSet<Reference>;

    /// Point every reference to `(class, old)` at `new`.
    ///
    /// Returns whether anything changed.
    fn rename_reference(&mut self, class: EntityClass, old: &str, new: &str) -> bool;

    /// Canonical form, applied before validation
    fn normalize(&mut self) {}

    /// Rules that need no store access
    fn check(&self, cluster: &ClusterConfig) -> RegistryResult<()>;
}

fn rename_in(slot: &mut String, old: &str, new: &str) -> bool {
    if slot == old {
        *slot = new.to_string();
        true
    } else {
        false
    }
}

fn rename_all(slots: &mut [String], old: &str, new: &str) -> bool {
    let mut changed = false;
    for slot in slots {
        changed |= rename_in(slot, old, new);
    }
    changed
}

fn all_nodes() -> Vec<String> {
    vec![ALL_NODES.to_string()]
}

fn enabled() -> bool {
    true
}

fn check_unique<'a>(field: &str, items: impl IntoIterator<Item = &'a str>) -> RegistryResult<()> {
    let mut seen = BTreeSet::new();
    for item in items {
        if !seen.insert(item) {
            return Err(RegistryError::validation(
                field,
                format!("duplicate entry '{}'", item),
            ));
        }
    }
    Ok(())
}

// ==================
// Network Alias
// ==================

/// Per-member listen/advertise address pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetAddress {
    pub member: String,
    pub listen: String,
    pub advertise: String,
}

/// Named set of per-member addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetAlias {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub addresses: Vec<NetAddress>,
}

impl NetAlias {
    /// Address pair of one member
    pub fn address_of(&self, member: &str) -> Option<&NetAddress> {
        self.addresses.iter().find(|a| a.member == member)
    }

    /// Exactly one address per cluster member
    pub fn check_members(&self, cluster: &ClusterConfig) -> RegistryResult<()> {
        if self.addresses.len() != cluster.members.len() {
            return Err(RegistryError::validation(
                "addresses",
                format!(
                    "expected {} addresses, one per cluster member, got {}",
                    cluster.members.len(),
                    self.addresses.len()
                ),
            ));
        }
        check_unique("addresses", self.addresses.iter().map(|a| a.member.as_str()))?;
        for address in &self.addresses {
            if !cluster.is_member(&address.member) {
                return Err(RegistryError::validation(
                    "addresses",
                    format!("'{}' is not a cluster member", address.member),
                ));
            }
        }
        Ok(())
    }
}

impl Model for NetAlias {
    const CLASS: EntityClass = EntityClass::NetAlias;

    fn id(&self) -> String {
        self.name.clone()
    }

    fn desc(&self) -> &str {
        &self.desc
    }

    fn references(&self) -> BTreeSet<Reference> {
        BTreeSet::new()
    }

    fn rename_reference(&mut self, _: EntityClass, _: &str, _: &str) -> bool {
        false
    }

    fn check(&self, cluster: &ClusterConfig) -> RegistryResult<()> {
        check_name("name", &self.name)?;
        self.check_members(cluster)?;
        for address in &self.addresses {
            check_ip("addresses.listen", &address.listen)?;
            check_ip("addresses.advertise", &address.advertise)?;
        }
        Ok(())
    }
}

// ==================
// Access Control List
// ==================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclRuleKind {
    Cidr,
    Domain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    pub action: AclAction,
    #[serde(rename = "type")]
    pub kind: AclRuleKind,
    pub value: String,
}

/// Ordered rule list with a default action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub action: AclAction,
    #[serde(default)]
    pub rules: Vec<AclRule>,
}

impl Model for Acl {
    const CLASS: EntityClass = EntityClass::Acl;

    fn id(&self) -> String {
        self.name.clone()
    }

    fn desc(&self) -> &str {
        &self.desc
    }

    fn references(&self) -> BTreeSet<Reference> {
        BTreeSet::new()
    }

    fn rename_reference(&mut self, _: EntityClass, _: &str, _: &str) -> bool {
        false
    }

    fn check(&self, _: &ClusterConfig) -> RegistryResult<()> {
        check_name("name", &self.name)?;
        if is_builtin_acl(&self.name) {
            return Err(RegistryError::validation(
                "name",
                format!("'{}' is a builtin ACL", self.name),
            ));
        }
        for rule in &self.rules {
            match rule.kind {
                AclRuleKind::Cidr => check_networks("rules.value", std::slice::from_ref(&rule.value))?,
                AclRuleKind::Domain if !is_hostname(&rule.value) => {
                    return Err(RegistryError::validation(
                        "rules.value",
                        format!("'{}' is not a domain", rule.value),
                    ))
                }
                AclRuleKind::Domain => {}
            }
        }
        Ok(())
    }
}

// ==================
// SIP Profile
// ==================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtmfType {
    Rfc2833,
    Info,
    None,
}

fn default_user_agent() -> String {
    "sbcplane".to_string()
}

fn default_sip_port() -> u16 {
    5060
}

fn default_context() -> String {
    "core".to_string()
}

fn default_local_acl() -> String {
    "rfc1918.auto".to_string()
}

fn default_nonce_ttl() -> u32 {
    60
}

fn default_session_expires() -> u32 {
    120
}

fn default_tls_version() -> String {
    "tlsv1.2".to_string()
}

fn default_dtmf() -> DtmfType {
    DtmfType::Rfc2833
}

/// Signalling profile bound to a pair of network aliases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipProfile {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub disable_transfer: bool,
    #[serde(default)]
    pub manual_redirect: bool,
    #[serde(default)]
    pub disable_hold: bool,
    #[serde(default = "default_nonce_ttl")]
    pub nonce_ttl: u32,
    #[serde(default = "default_local_acl")]
    pub nat_space: String,
    #[serde(default)]
    pub sip_options_respond_503_on_busy: bool,
    #[serde(default)]
    pub enable_100rel: bool,
    #[serde(default)]
    pub enable_timer: bool,
    #[serde(default)]
    pub session_timeout: u32,
    #[serde(default = "default_session_expires")]
    pub minimum_session_expires: u32,
    #[serde(default = "default_dtmf")]
    pub dtmf_type: DtmfType,
    #[serde(default)]
    pub media_timeout: u32,
    #[serde(default)]
    pub rtp_rewrite_timestamps: bool,
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(default = "default_sip_port")]
    pub sip_port: u16,
    pub sip_address: String,
    pub rtp_address: String,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub tls_only: bool,
    #[serde(default)]
    pub sips_port: Option<u16>,
    #[serde(default = "default_tls_version")]
    pub tls_version: String,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default = "default_local_acl")]
    pub local_network_acl: String,
}

impl Model for SipProfile {
    const CLASS: EntityClass = EntityClass::SipProfile;

    fn id(&self) -> String {
        self.name.clone()
    }

    fn desc(&self) -> &str {
        &self.desc
    }

    fn references(&self) -> BTreeSet<Reference> {
        let mut refs = BTreeSet::new();
        refs.insert(Reference::new(EntityClass::NetAlias, &self.sip_address));
        refs.insert(Reference::new(EntityClass::NetAlias, &self.rtp_address));
        if !is_builtin_acl(&self.local_network_acl) {
            refs.insert(Reference::new(EntityClass::Acl, &self.local_network_acl));
        }
        refs
    }

    fn rename_reference(&mut self, class: EntityClass, old: &str, new: &str) -> bool {
        match class {
            EntityClass::NetAlias => {
                let sip = rename_in(&mut self.sip_address, old, new);
                let rtp = rename_in(&mut self.rtp_address, old, new);
                sip || rtp
            }
            EntityClass::Acl => rename_in(&mut self.local_network_acl, old, new),
            _ => false,
        }
    }

    fn check(&self, _: &ClusterConfig) -> RegistryResult<()> {
        check_name("name", &self.name)?;
        check_name("sip_address", &self.sip_address)?;
        check_name("rtp_address", &self.rtp_address)?;
        check_name("local_network_acl", &self.local_network_acl)?;
        if self.sip_port == 0 {
            return Err(RegistryError::validation("sip_port", "port must be 1..=65535"));
        }
        if self.context.trim().is_empty() {
            return Err(RegistryError::validation("context", "must not be empty"));
        }
        if self.tls_only && !self.tls {
            return Err(RegistryError::validation("tls_only", "requires tls"));
        }
        if self.tls {
            match self.sips_port {
                None | Some(0) => {
                    return Err(RegistryError::validation(
                        "sips_port",
                        "required when tls is enabled",
                    ))
                }
                Some(port) if port == self.sip_port => {
                    return Err(RegistryError::validation(
                        "sips_port",
                        "must differ from sip_port",
                    ))
                }
                Some(_) => {}
            }
        }
        if let Some(realm) = &self.realm {
            if !is_host_or_ip(realm) {
                return Err(RegistryError::validation(
                    "realm",
                    format!("'{}' is not a host", realm),
                ));
            }
        }
        Ok(())
    }
}

// ==================
// Gateway
// ==================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Udp,
    Tcp,
    Tls,
}

fn default_transport() -> Transport {
    Transport::Udp
}

fn default_none() -> String {
    "none".to_string()
}

fn default_expire_seconds() -> u32 {
    600
}

fn default_retry_seconds() -> u32 {
    60
}

fn default_ping_bound() -> u32 {
    1
}

/// Far-end SIP peer used by outbound interconnections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default = "default_none")]
    pub username: String,
    #[serde(default = "default_none")]
    pub password: String,
    pub proxy: String,
    #[serde(default = "default_sip_port")]
    pub port: u16,
    #[serde(default = "default_transport")]
    pub transport: Transport,
    #[serde(default)]
    pub do_register: bool,
    #[serde(default)]
    pub register_proxy: Option<String>,
    #[serde(default = "default_expire_seconds")]
    pub expire_seconds: u32,
    #[serde(default = "default_retry_seconds")]
    pub retry_seconds: u32,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub from_domain: Option<String>,
    #[serde(default)]
    pub caller_id_in_from: bool,
    #[serde(default = "default_none")]
    pub cid_type: String,
    /// Options ping interval in seconds, 0 disables pinging
    #[serde(default)]
    pub ping: u32,
    #[serde(default = "default_ping_bound")]
    pub ping_min: u32,
    #[serde(default = "default_ping_bound")]
    pub ping_max: u32,
}

impl Model for Gateway {
    const CLASS: EntityClass = EntityClass::Gateway;

    fn id(&self) -> String {
        self.name.clone()
    }

    fn desc(&self) -> &str {
        &self.desc
    }

    fn references(&self) -> BTreeSet<Reference> {
        BTreeSet::new()
    }

    fn rename_reference(&mut self, _: EntityClass, _: &str, _: &str) -> bool {
        false
    }

    fn check(&self, _: &ClusterConfig) -> RegistryResult<()> {
        check_name("name", &self.name)?;
        for (field, host) in [
            ("proxy", Some(&self.proxy)),
            ("register_proxy", self.register_proxy.as_ref()),
            ("realm", self.realm.as_ref()),
            ("from_domain", self.from_domain.as_ref()),
        ] {
            if let Some(host) = host {
                if !is_host_or_ip(host) {
                    return Err(RegistryError::validation(
                        field,
                        format!("'{}' is not a host", host),
                    ));
                }
            }
        }
        if self.ping_min > self.ping_max {
            return Err(RegistryError::validation(
                "ping_min",
                "must not exceed ping_max",
            ));
        }
        if self.do_register && (self.username == "none" || self.password == "none") {
            return Err(RegistryError::validation(
                "do_register",
                "registration requires username and password",
            ));
        }
        Ok(())
    }
}

// ==================
// Classes
// ==================

/// Codecs the call engine can negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    #[serde(rename = "ALAW")]
    Alaw,
    #[serde(rename = "ULAW")]
    Ulaw,
    #[serde(rename = "OPUS")]
    Opus,
    #[serde(rename = "G729")]
    G729,
    #[serde(rename = "AMR")]
    Amr,
    #[serde(rename = "AMR-WB")]
    AmrWb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecClass {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub codecs: Vec<Codec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityClass {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    /// Calls per second, -1 for unlimited
    pub cps: i64,
    /// Concurrent calls, -1 for unlimited
    pub concurrentcalls: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationClass {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub caller_number_pattern: String,
    #[serde(default)]
    pub caller_number_replacement: String,
    #[serde(default)]
    pub destination_number_pattern: String,
    #[serde(default)]
    pub destination_number_replacement: String,
    #[serde(default)]
    pub caller_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub target: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub target: String,
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManipulationClass {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<Rewrite>,
    #[serde(default)]
    pub antiactions: Vec<Rewrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingtoneClass {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub data: String,
}

macro_rules! leaf_model {
    ($ty:ty, $class:expr) => {
        impl Model for $ty {
            const CLASS: EntityClass = $class;

            fn id(&self) -> String {
                self.name.clone()
            }

            fn desc(&self) -> &str {
                &self.desc
            }

            fn references(&self) -> BTreeSet<Reference> {
                BTreeSet::new()
            }

            fn rename_reference(&mut self, _: EntityClass, _: &str, _: &str) -> bool {
                false
            }

            fn check(&self, cluster: &ClusterConfig) -> RegistryResult<()> {
                check_name("name", &self.name)?;
                self.check_payload(cluster)
            }
        }
    };
}

leaf_model!(CodecClass, EntityClass::Codec);
leaf_model!(CapacityClass, EntityClass::Capacity);
leaf_model!(TranslationClass, EntityClass::Translation);
leaf_model!(ManipulationClass, EntityClass::Manipulation);
leaf_model!(RingtoneClass, EntityClass::Ringtone);

impl CodecClass {
    fn check_payload(&self, _: &ClusterConfig) -> RegistryResult<()> {
        if self.codecs.is_empty() {
            return Err(RegistryError::validation("codecs", "at least one codec is required"));
        }
        for (i, codec) in self.codecs.iter().enumerate() {
            if self.codecs[..i].contains(codec) {
                return Err(RegistryError::validation(
                    "codecs",
                    format!("duplicate codec {:?}", codec),
                ));
            }
        }
        Ok(())
    }
}

impl CapacityClass {
    fn check_payload(&self, cluster: &ClusterConfig) -> RegistryResult<()> {
        check_limit("cps", self.cps, cluster.max_calls_per_second)?;
        check_limit("concurrentcalls", self.concurrentcalls, cluster.max_concurrent_calls)
    }
}

fn check_limit(field: &str, value: i64, cluster_max: u32) -> RegistryResult<()> {
    if value == -1 {
        return Ok(());
    }
    if value <= 0 {
        return Err(RegistryError::validation(field, "must be -1 or positive"));
    }
    if cluster_max > 0 && value > i64::from(cluster_max) {
        return Err(RegistryError::validation(
            field,
            format!("exceeds cluster maximum {}", cluster_max),
        ));
    }
    Ok(())
}

impl TranslationClass {
    fn check_payload(&self, _: &ClusterConfig) -> RegistryResult<()> {
        check_pattern("caller_number_pattern", &self.caller_number_pattern)?;
        check_pattern("destination_number_pattern", &self.destination_number_pattern)
    }
}

impl ManipulationClass {
    fn check_payload(&self, _: &ClusterConfig) -> RegistryResult<()> {
        if self.actions.is_empty() {
            return Err(RegistryError::validation("actions", "at least one action is required"));
        }
        for condition in &self.conditions {
            check_pattern("conditions.pattern", &condition.pattern)?;
        }
        for rewrite in self.actions.iter().chain(&self.antiactions) {
            if rewrite.target.is_empty() {
                return Err(RegistryError::validation("actions.target", "must not be empty"));
            }
            check_pattern("actions.pattern", &rewrite.pattern)?;
        }
        Ok(())
    }
}

impl RingtoneClass {
    fn check_payload(&self, _: &ClusterConfig) -> RegistryResult<()> {
        if self.data.trim().is_empty() {
            return Err(RegistryError::validation("data", "must not be empty"));
        }
        Ok(())
    }
}

// ==================
// Interconnections
// ==================

/// Outbound gateway selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    WeightBased,
    RoundRobin,
    HashCallid,
    HashSrcIp,
    HashDestinationNumber,
}

fn default_distribution() -> Distribution {
    Distribution::WeightBased
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayWeight {
    pub name: String,
    pub weight: u32,
}

/// Peering that places calls through gateways
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundInterconnection {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub sipprofile: String,
    #[serde(default = "default_distribution")]
    pub distribution: Distribution,
    pub gateways: Vec<GatewayWeight>,
    #[serde(default)]
    pub rtp_nets: Vec<String>,
    pub codec_class: String,
    pub capacity_class: String,
    #[serde(default)]
    pub translation_classes: Vec<String>,
    #[serde(default)]
    pub manipulation_classes: Vec<String>,
    #[serde(default = "all_nodes")]
    pub nodes: Vec<String>,
    #[serde(default = "enabled")]
    pub enable: bool,
}

impl OutboundInterconnection {
    pub fn gateway_names(&self) -> Vec<String> {
        self.gateways.iter().map(|g| g.name.clone()).collect()
    }
}

fn class_references(
    codec_class: &str,
    capacity_class: &str,
    translation_classes: &[String],
    manipulation_classes: &[String],
) -> BTreeSet<Reference> {
    let mut refs = BTreeSet::new();
    refs.insert(Reference::new(EntityClass::Codec, codec_class));
    refs.insert(Reference::new(EntityClass::Capacity, capacity_class));
    refs.extend(
        translation_classes
            .iter()
            .map(|t| Reference::new(EntityClass::Translation, t)),
    );
    refs.extend(
        manipulation_classes
            .iter()
            .map(|m| Reference::new(EntityClass::Manipulation, m)),
    );
    refs
}

impl Model for OutboundInterconnection {
    const CLASS: EntityClass = EntityClass::Outbound;

    fn id(&self) -> String {
        self.name.clone()
    }

    fn desc(&self) -> &str {
        &self.desc
    }

    fn references(&self) -> BTreeSet<Reference> {
        let mut refs = class_references(
            &self.codec_class,
            &self.capacity_class,
            &self.translation_classes,
            &self.manipulation_classes,
        );
        refs.insert(Reference::new(EntityClass::SipProfile, &self.sipprofile));
        refs.extend(
            self.gateways
                .iter()
                .map(|g| Reference::new(EntityClass::Gateway, &g.name)),
        );
        refs
    }

    fn rename_reference(&mut self, class: EntityClass, old: &str, new: &str) -> bool {
        match class {
            EntityClass::SipProfile => rename_in(&mut self.sipprofile, old, new),
            EntityClass::Codec => rename_in(&mut self.codec_class, old, new),
            EntityClass::Capacity => rename_in(&mut self.capacity_class, old, new),
            EntityClass::Translation => rename_all(&mut self.translation_classes, old, new),
            EntityClass::Manipulation => rename_all(&mut self.manipulation_classes, old, new),
            EntityClass::Gateway => {
                let mut changed = false;
                for gateway in &mut self.gateways {
                    changed |= rename_in(&mut gateway.name, old, new);
                }
                changed
            }
            _ => false,
        }
    }

    fn normalize(&mut self) {
        if self.distribution == Distribution::RoundRobin {
            for gateway in &mut self.gateways {
                gateway.weight = 1;
            }
        }
    }

    fn check(&self, cluster: &ClusterConfig) -> RegistryResult<()> {
        check_name("name", &self.name)?;
        check_name("sipprofile", &self.sipprofile)?;
        check_name("codec_class", &self.codec_class)?;
        check_name("capacity_class", &self.capacity_class)?;
        check_names("translation_classes", &self.translation_classes)?;
        check_names("manipulation_classes", &self.manipulation_classes)?;
        if self.gateways.is_empty() {
            return Err(RegistryError::validation("gateways", "at least one gateway is required"));
        }
        for gateway in &self.gateways {
            check_name("gateways", &gateway.name)?;
        }
        check_unique("gateways", self.gateways.iter().map(|g| g.name.as_str()))?;
        let weights: Vec<u32> = self.gateways.iter().map(|g| g.weight).collect();
        check_weights("gateways.weight", &weights)?;
        if self.distribution == Distribution::WeightBased && weights.iter().all(|w| *w == 0) {
            return Err(RegistryError::validation(
                "gateways.weight",
                "at least one gateway needs a positive weight",
            ));
        }
        check_networks("rtp_nets", &self.rtp_nets)?;
        check_nodes(&self.nodes, cluster)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthScheme {
    Ip,
    Digest,
    Both,
}

fn default_authscheme() -> AuthScheme {
    AuthScheme::Ip
}

/// Peering that accepts calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundInterconnection {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub sipprofile: String,
    /// Routing table calls enter
    pub routing: String,
    #[serde(default)]
    pub sip_ips: Vec<String>,
    #[serde(default)]
    pub rtp_nets: Vec<String>,
    #[serde(default)]
    pub ringready: bool,
    pub codec_class: String,
    pub capacity_class: String,
    #[serde(default)]
    pub translation_classes: Vec<String>,
    #[serde(default)]
    pub manipulation_classes: Vec<String>,
    #[serde(default)]
    pub ringtone_class: Option<String>,
    #[serde(default = "default_authscheme")]
    pub authscheme: AuthScheme,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "all_nodes")]
    pub nodes: Vec<String>,
    #[serde(default = "enabled")]
    pub enable: bool,
}

impl Model for InboundInterconnection {
    const CLASS: EntityClass = EntityClass::Inbound;

    fn id(&self) -> String {
        self.name.clone()
    }

    fn desc(&self) -> &str {
        &self.desc
    }

    fn references(&self) -> BTreeSet<Reference> {
        let mut refs = class_references(
            &self.codec_class,
            &self.capacity_class,
            &self.translation_classes,
            &self.manipulation_classes,
        );
        refs.insert(Reference::new(EntityClass::SipProfile, &self.sipprofile));
        refs.insert(Reference::new(EntityClass::RoutingTable, &self.routing));
        if let Some(ringtone) = &self.ringtone_class {
            refs.insert(Reference::new(EntityClass::Ringtone, ringtone));
        }
        refs
    }

    fn rename_reference(&mut self, class: EntityClass, old: &str, new: &str) -> bool {
        match class {
            EntityClass::SipProfile => rename_in(&mut self.sipprofile, old, new),
            EntityClass::RoutingTable => rename_in(&mut self.routing, old, new),
            EntityClass::Codec => rename_in(&mut self.codec_class, old, new),
            EntityClass::Capacity => rename_in(&mut self.capacity_class, old, new),
            EntityClass::Translation => rename_all(&mut self.translation_classes, old, new),
            EntityClass::Manipulation => rename_all(&mut self.manipulation_classes, old, new),
            EntityClass::Ringtone => match &mut self.ringtone_class {
                Some(slot) => rename_in(slot, old, new),
                None => false,
            },
            _ => false,
        }
    }

    fn check(&self, cluster: &ClusterConfig) -> RegistryResult<()> {
        check_name("name", &self.name)?;
        check_name("sipprofile", &self.sipprofile)?;
        check_name("routing", &self.routing)?;
        check_name("codec_class", &self.codec_class)?;
        check_name("capacity_class", &self.capacity_class)?;
        check_names("translation_classes", &self.translation_classes)?;
        check_names("manipulation_classes", &self.manipulation_classes)?;
        if let Some(ringtone) = &self.ringtone_class {
            check_name("ringtone_class", ringtone)?;
        }
        check_networks("sip_ips", &self.sip_ips)?;
        check_unique("sip_ips", self.sip_ips.iter().map(String::as_str))?;
        check_networks("rtp_nets", &self.rtp_nets)?;
        let secret_set = self.secret.as_deref().is_some_and(|s| !s.is_empty());
        match self.authscheme {
            AuthScheme::Ip if self.sip_ips.is_empty() => {
                return Err(RegistryError::validation(
                    "sip_ips",
                    "IP authentication requires at least one address",
                ))
            }
            AuthScheme::Digest | AuthScheme::Both if !secret_set => {
                return Err(RegistryError::validation(
                    "secret",
                    "digest authentication requires a secret",
                ))
            }
            AuthScheme::Both if self.sip_ips.is_empty() => {
                return Err(RegistryError::validation(
                    "sip_ips",
                    "IP authentication requires at least one address",
                ))
            }
            _ => {}
        }
        check_nodes(&self.nodes, cluster)
    }
}

// ==================
// Routing
// ==================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableAction {
    Query,
    Route,
    Block,
}

/// Routing table: either routes directly or is queried for records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    /// Call variables matched against record values, first one wins
    #[serde(default)]
    pub variables: Vec<String>,
    pub action: TableAction,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub weights: Vec<u32>,
}

pub const MAX_ENDPOINTS: usize = 3;

impl Model for RoutingTable {
    const CLASS: EntityClass = EntityClass::RoutingTable;

    fn id(&self) -> String {
        self.name.clone()
    }

    fn desc(&self) -> &str {
        &self.desc
    }

    fn references(&self) -> BTreeSet<Reference> {
        match self.action {
            TableAction::Route => self
                .endpoints
                .iter()
                .map(|e| Reference::new(EntityClass::Outbound, e))
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    fn rename_reference(&mut self, class: EntityClass, old: &str, new: &str) -> bool {
        match (class, self.action) {
            (EntityClass::Outbound, TableAction::Route) => rename_all(&mut self.endpoints, old, new),
            _ => false,
        }
    }

    fn check(&self, _: &ClusterConfig) -> RegistryResult<()> {
        check_name("name", &self.name)?;
        check_names("variables", &self.variables)?;
        match self.action {
            TableAction::Route => check_endpoints(&self.endpoints, &self.weights, MAX_ENDPOINTS),
            TableAction::Query if self.variables.is_empty() => Err(RegistryError::validation(
                "variables",
                "query tables need at least one variable",
            )),
            TableAction::Query | TableAction::Block
                if !self.endpoints.is_empty() || !self.weights.is_empty() =>
            {
                Err(RegistryError::validation(
                    "endpoints",
                    "only route tables carry endpoints",
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Lpm,
    Em,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Lpm => "lpm",
            MatchKind::Em => "em",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    Route,
    Block,
    Jumps,
}

/// One entry of a query table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRecord {
    pub table: String,
    #[serde(rename = "match")]
    pub matching: MatchKind,
    /// Matched value; the empty string is the table's default entry
    #[serde(default)]
    pub value: String,
    pub action: RecordAction,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub weights: Vec<u32>,
}

impl RoutingRecord {
    pub fn is_default(&self) -> bool {
        self.value.is_empty()
    }
}

impl Model for RoutingRecord {
    const CLASS: EntityClass = EntityClass::RoutingRecord;

    fn id(&self) -> String {
        record_id(&self.table, self.matching.as_str(), &self.value)
    }

    fn references(&self) -> BTreeSet<Reference> {
        let mut refs = BTreeSet::new();
        refs.insert(Reference::new(EntityClass::RoutingTable, &self.table));
        match self.action {
            RecordAction::Route => refs.extend(
                self.endpoints
                    .iter()
                    .map(|e| Reference::new(EntityClass::Outbound, e)),
            ),
            RecordAction::Jumps => refs.extend(
                self.endpoints
                    .iter()
                    .map(|e| Reference::new(EntityClass::RoutingTable, e)),
            ),
            RecordAction::Block => {}
        }
        refs
    }

    fn rename_reference(&mut self, class: EntityClass, old: &str, new: &str) -> bool {
        match class {
            EntityClass::RoutingTable => {
                let table = rename_in(&mut self.table, old, new);
                let jumps = self.action == RecordAction::Jumps
                    && rename_all(&mut self.endpoints, old, new);
                table || jumps
            }
            EntityClass::Outbound if self.action == RecordAction::Route => {
                rename_all(&mut self.endpoints, old, new)
            }
            _ => false,
        }
    }

    fn normalize(&mut self) {
        // a table has one default entry, keyed under exact match
        if self.value.is_empty() {
            self.matching = MatchKind::Em;
        }
    }

    fn check(&self, _: &ClusterConfig) -> RegistryResult<()> {
        check_name("table", &self.table)?;
        if self.value == DEFAULT_ENTRY {
            return Err(RegistryError::validation("value", "reserved value"));
        }
        if self.value.len() > 128 || self.value.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(RegistryError::validation(
                "value",
                "at most 128 characters without whitespace or '/'",
            ));
        }
        match self.action {
            RecordAction::Route => check_endpoints(&self.endpoints, &self.weights, MAX_ENDPOINTS),
            RecordAction::Block if !self.endpoints.is_empty() || !self.weights.is_empty() => {
                Err(RegistryError::validation("endpoints", "block carries no endpoints"))
            }
            RecordAction::Block => Ok(()),
            RecordAction::Jumps => {
                if self.endpoints.len() != 1 || !self.weights.is_empty() {
                    return Err(RegistryError::validation(
                        "endpoints",
                        "jumps takes exactly one table",
                    ));
                }
                check_name("endpoints", &self.endpoints[0])?;
                if self.endpoints[0] == self.table {
                    return Err(RegistryError::validation(
                        "endpoints",
                        "a record cannot jump to its own table",
                    ));
                }
                Ok(())
            }
        }
    }
}
