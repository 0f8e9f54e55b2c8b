//! Class-erased entity values

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use super::entity::EntityClass;
use super::errors::{RegistryError, RegistryResult};
use super::model::{
    Acl, CapacityClass, CodecClass, Gateway, InboundInterconnection, ManipulationClass, Model,
    NetAlias, OutboundInterconnection, Reference, RingtoneClass, RoutingRecord, RoutingTable,
    SipProfile, TranslationClass,
};
use crate::config::ClusterConfig;
use crate::store::{codec, Hash, StoreResult};

/// Any registry entity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entity {
    NetAlias(NetAlias),
    Acl(Acl),
    SipProfile(SipProfile),
    Gateway(Gateway),
    Codec(CodecClass),
    Capacity(CapacityClass),
    Translation(TranslationClass),
    Manipulation(ManipulationClass),
    Ringtone(RingtoneClass),
    Outbound(OutboundInterconnection),
    Inbound(InboundInterconnection),
    RoutingTable(RoutingTable),
    RoutingRecord(RoutingRecord),
}

macro_rules! dispatch {
    ($value:expr, $model:ident => $body:expr) => {
        match $value {
            Entity::NetAlias($model) => $body,
            Entity::Acl($model) => $body,
            Entity::SipProfile($model) => $body,
            Entity::Gateway($model) => $body,
            Entity::Codec($model) => $body,
            Entity::Capacity($model) => $body,
            Entity::Translation($model) => $body,
            Entity::Manipulation($model) => $body,
            Entity::Ringtone($model) => $body,
            Entity::Outbound($model) => $body,
            Entity::Inbound($model) => $body,
            Entity::RoutingTable($model) => $body,
            Entity::RoutingRecord($model) => $body,
        }
    };
}

macro_rules! by_class {
    ($class:expr, $ty:ident => $body:expr) => {
        match $class {
            EntityClass::NetAlias => {
                type $ty = NetAlias;
                $body.map(Entity::NetAlias)
            }
            EntityClass::Acl => {
                type $ty = Acl;
                $body.map(Entity::Acl)
            }
            EntityClass::SipProfile => {
                type $ty = SipProfile;
                $body.map(Entity::SipProfile)
            }
            EntityClass::Gateway => {
                type $ty = Gateway;
                $body.map(Entity::Gateway)
            }
            EntityClass::Codec => {
                type $ty = CodecClass;
                $body.map(Entity::Codec)
            }
            EntityClass::Capacity => {
                type $ty = CapacityClass;
                $body.map(Entity::Capacity)
            }
            EntityClass::Translation => {
                type $ty = TranslationClass;
                $body.map(Entity::Translation)
            }
            EntityClass::Manipulation => {
                type $ty = ManipulationClass;
                $body.map(Entity::Manipulation)
            }
            EntityClass::Ringtone => {
                type $ty = RingtoneClass;
                $body.map(Entity::Ringtone)
            }
            EntityClass::Outbound => {
                type $ty = OutboundInterconnection;
                $body.map(Entity::Outbound)
            }
            EntityClass::Inbound => {
                type $ty = InboundInterconnection;
                $body.map(Entity::Inbound)
            }
            EntityClass::RoutingTable => {
                type $ty = RoutingTable;
                $body.map(Entity::RoutingTable)
            }
            EntityClass::RoutingRecord => {
                type $ty = RoutingRecord;
                $body.map(Entity::RoutingRecord)
            }
        }
    };
}

fn class_of<M: Model>(_: &M) -> EntityClass {
    M::CLASS
}

impl Entity {
    /// Parse a JSON document as an entity of `class`
    pub fn from_json(class: EntityClass, value: Value) -> RegistryResult<Self> {
        by_class!(class, M => serde_json::from_value::<M>(value))
            .map_err(|e| RegistryError::validation("body", e.to_string()))
    }

    /// Decode a stored record of `class`
    pub fn decode(class: EntityClass, key: &str, hash: &Hash) -> StoreResult<Self> {
        by_class!(class, M => codec::decode_hash::<M>(key, hash))
    }

    pub fn encode(&self, key: &str) -> StoreResult<Hash> {
        dispatch!(self, m => codec::encode_hash(key, m))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn class(&self) -> EntityClass {
        dispatch!(self, m => class_of(m))
    }

    pub fn id(&self) -> String {
        dispatch!(self, m => m.id())
    }

    pub fn desc(&self) -> &str {
        dispatch!(self, m => m.desc())
    }

    pub fn nameid(&self) -> String {
        self.class().nameid(&self.id())
    }

    pub fn record_key(&self) -> String {
        self.class().record_key(&self.id())
    }

    pub fn references(&self) -> BTreeSet<Reference> {
        dispatch!(self, m => m.references())
    }

    pub fn rename_reference(&mut self, class: EntityClass, old: &str, new: &str) -> bool {
        dispatch!(self, m => m.rename_reference(class, old, new))
    }

    pub fn normalize(&mut self) {
        dispatch!(self, m => m.normalize())
    }

    pub fn check(&self, cluster: &ClusterConfig) -> RegistryResult<()> {
        dispatch!(self, m => m.check(cluster))
    }

    pub fn as_netalias(&self) -> Option<&NetAlias> {
        match self {
            Entity::NetAlias(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sipprofile(&self) -> Option<&SipProfile> {
        match self {
            Entity::SipProfile(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_outbound(&self) -> Option<&OutboundInterconnection> {
        match self {
            Entity::Outbound(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_inbound(&self) -> Option<&InboundInterconnection> {
        match self {
            Entity::Inbound(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&RoutingTable> {
        match self {
            Entity::RoutingTable(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RoutingRecord> {
        match self {
            Entity::RoutingRecord(m) => Some(m),
            _ => None,
        }
    }

    /// Interconnection node scope, if this entity has one
    pub fn nodes(&self) -> Option<&[String]> {
        match self {
            Entity::Outbound(m) => Some(&m.nodes),
            Entity::Inbound(m) => Some(&m.nodes),
            _ => None,
        }
    }
}

/// Name and description of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub name: String,
    pub desc: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_by_class() {
        let entity = Entity::from_json(
            EntityClass::Gateway,
            json!({"name": "gw1", "proxy": "198.51.100.7"}),
        )
        .unwrap();
        assert_eq!(entity.class(), EntityClass::Gateway);
        assert_eq!(entity.nameid(), "gateway:gw1");
        assert_eq!(entity.record_key(), "base:gateway:gw1");
    }

    #[test]
    fn test_bad_body_is_validation_failure() {
        let err = Entity::from_json(EntityClass::Gateway, json!({"name": 5})).unwrap_err();
        assert_eq!(err.code(), "SBC_VALIDATION_FAILED");
    }

    #[test]
    fn test_store_encoding_preserves_entity() {
        let entity = Entity::from_json(
            EntityClass::Outbound,
            json!({
                "name": "carrier",
                "sipprofile": "external",
                "gateways": [{"name": "gw1", "weight": 60}, {"name": "gw2", "weight": 40}],
                "codec_class": "std",
                "capacity_class": "cap",
                "rtp_nets": ["192.0.2.0/24"]
            }),
        )
        .unwrap();
        let key = entity.record_key();
        let hash = entity.encode(&key).unwrap();
        assert!(hash["gateways"].starts_with(":json:"));
        assert_eq!(hash["nodes"], ":list:_ALL_");
        let back = Entity::decode(EntityClass::Outbound, &key, &hash).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn test_record_identity() {
        let entity = Entity::from_json(
            EntityClass::RoutingRecord,
            json!({"table": "main", "match": "lpm", "value": "12", "action": "block"}),
        )
        .unwrap();
        assert_eq!(entity.id(), "main:lpm:12");
        assert_eq!(entity.nameid(), "record:main:lpm:12");
        assert_eq!(entity.to_json()["match"], "lpm");
    }
}
