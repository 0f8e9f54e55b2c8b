//! Entity classes, identifiers and key layout

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier stored for a routing record whose value is the empty string
pub const DEFAULT_ENTRY: &str = "__DEFAULT_ENTRY__";

/// Every named configuration entity class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityClass {
    #[serde(rename = "netalias")]
    NetAlias,
    Acl,
    #[serde(rename = "sipprofile")]
    SipProfile,
    Gateway,
    Codec,
    Capacity,
    Translation,
    Manipulation,
    Ringtone,
    Outbound,
    Inbound,
    RoutingTable,
    RoutingRecord,
}

impl EntityClass {
    pub const ALL: [EntityClass; 13] = [
        EntityClass::NetAlias,
        EntityClass::Acl,
        EntityClass::SipProfile,
        EntityClass::Gateway,
        EntityClass::Codec,
        EntityClass::Capacity,
        EntityClass::Translation,
        EntityClass::Manipulation,
        EntityClass::Ringtone,
        EntityClass::Outbound,
        EntityClass::Inbound,
        EntityClass::RoutingTable,
        EntityClass::RoutingRecord,
    ];

    /// Name used in API paths and the name index
    pub fn token(&self) -> &'static str {
        match self {
            EntityClass::NetAlias => "netalias",
            EntityClass::Acl => "acl",
            EntityClass::SipProfile => "sipprofile",
            EntityClass::Gateway => "gateway",
            EntityClass::Codec => "codec",
            EntityClass::Capacity => "capacity",
            EntityClass::Translation => "translation",
            EntityClass::Manipulation => "manipulation",
            EntityClass::Ringtone => "ringtone",
            EntityClass::Outbound => "outbound",
            EntityClass::Inbound => "inbound",
            EntityClass::RoutingTable => "routing-table",
            EntityClass::RoutingRecord => "routing-record",
        }
    }

    /// Prefix of the class-qualified nameid
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityClass::NetAlias => "netalias",
            EntityClass::Acl => "acl",
            EntityClass::SipProfile => "sipprofile",
            EntityClass::Gateway => "gateway",
            EntityClass::Codec => "codec",
            EntityClass::Capacity => "capacity",
            EntityClass::Translation => "translation",
            EntityClass::Manipulation => "manipulation",
            EntityClass::Ringtone => "ringtone",
            EntityClass::Outbound => "out",
            EntityClass::Inbound => "in",
            EntityClass::RoutingTable => "table",
            EntityClass::RoutingRecord => "record",
        }
    }

    fn namespace(&self) -> &'static str {
        match self {
            EntityClass::NetAlias => "base:netalias",
            EntityClass::Acl => "base:acl",
            EntityClass::SipProfile => "sipprofile",
            EntityClass::Gateway => "base:gateway",
            EntityClass::Codec => "class:codec",
            EntityClass::Capacity => "class:capacity",
            EntityClass::Translation => "class:translation",
            EntityClass::Manipulation => "class:manipulation",
            EntityClass::Ringtone => "class:ringtone",
            EntityClass::Outbound => "intcon:out",
            EntityClass::Inbound => "intcon:in",
            EntityClass::RoutingTable => "routing:table",
            EntityClass::RoutingRecord => "routing:record",
        }
    }

    /// Store key of the entity record
    pub fn record_key(&self, name: &str) -> String {
        format!("{}:{}", self.namespace(), name)
    }

    /// Class-qualified identifier, e.g. `out:carrierA`
    pub fn nameid(&self, name: &str) -> String {
        format!("{}:{}", self.prefix(), name)
    }

    /// Split a nameid into its class and name
    pub fn parse_nameid(nameid: &str) -> Option<(EntityClass, &str)> {
        let (prefix, name) = nameid.split_once(':')?;
        let class = EntityClass::ALL.into_iter().find(|c| c.prefix() == prefix)?;
        Some((class, name))
    }

    /// Whether changes to this class affect running call-engine state
    pub fn propagates(&self) -> bool {
        matches!(
            self,
            EntityClass::NetAlias
                | EntityClass::Acl
                | EntityClass::SipProfile
                | EntityClass::Gateway
                | EntityClass::Outbound
                | EntityClass::Inbound
        )
    }

    /// Whether changes to this class alter routing decisions
    pub fn affects_routing(&self) -> bool {
        matches!(
            self,
            EntityClass::Outbound | EntityClass::RoutingTable | EntityClass::RoutingRecord
        )
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for EntityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityClass::ALL
            .into_iter()
            .find(|c| c.token() == s)
            .ok_or_else(|| format!("unknown entity class '{}'", s))
    }
}

/// Identifier of a routing record: `{table}:{match}:{value}`
pub fn record_id(table: &str, match_token: &str, value: &str) -> String {
    let value = if value.is_empty() { DEFAULT_ENTRY } else { value };
    format!("{}:{}:{}", table, match_token, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_and_nameids() {
        assert_eq!(EntityClass::Gateway.record_key("gw1"), "base:gateway:gw1");
        assert_eq!(EntityClass::Outbound.record_key("c1"), "intcon:out:c1");
        assert_eq!(EntityClass::Outbound.nameid("c1"), "out:c1");
        assert_eq!(EntityClass::SipProfile.record_key("ext"), "sipprofile:ext");
    }

    #[test]
    fn test_parse_nameid() {
        assert_eq!(
            EntityClass::parse_nameid("record:t1:lpm:12"),
            Some((EntityClass::RoutingRecord, "t1:lpm:12"))
        );
        assert_eq!(
            EntityClass::parse_nameid("in:peer"),
            Some((EntityClass::Inbound, "peer"))
        );
        assert_eq!(EntityClass::parse_nameid("bogus:x"), None);
        assert_eq!(EntityClass::parse_nameid("nocolon"), None);
    }

    #[test]
    fn test_token_round_trip() {
        for class in EntityClass::ALL {
            assert_eq!(class.token().parse::<EntityClass>().unwrap(), class);
        }
        assert!("widget".parse::<EntityClass>().is_err());
    }

    #[test]
    fn test_default_record_id() {
        assert_eq!(record_id("t1", "em", ""), "t1:em:__DEFAULT_ENTRY__");
        assert_eq!(record_id("t1", "lpm", "12"), "t1:lpm:12");
    }

    #[test]
    fn test_data_only_classes_do_not_propagate() {
        assert!(!EntityClass::Codec.propagates());
        assert!(!EntityClass::RoutingRecord.propagates());
        assert!(EntityClass::NetAlias.propagates());
    }
}
