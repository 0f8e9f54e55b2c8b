//! Shared fixtures for the integration suites

#![allow(dead_code)]

use std::sync::Arc;

use sbcplane::config::ClusterConfig;
use sbcplane::observability::MetricsRegistry;
use sbcplane::registry::{Entity, EntityClass, Registry};
use sbcplane::store::{MemoryStore, Store};
use serde_json::{json, Value};

pub const MEMBERS: [&str; 2] = ["n1", "n2"];

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub registry: Arc<Registry>,
}

pub fn cluster() -> ClusterConfig {
    ClusterConfig {
        name: "edge".to_string(),
        members: MEMBERS.iter().map(|m| m.to_string()).collect(),
        ..ClusterConfig::standalone("n1")
    }
}

pub fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn Store> = store.clone();
    let registry = Registry::open(shared, cluster(), Arc::new(MetricsRegistry::new()))
        .expect("open registry");
    Fixture {
        store,
        registry: Arc::new(registry),
    }
}

pub fn entity(class: EntityClass, body: Value) -> Entity {
    Entity::from_json(class, body).expect("fixture body")
}

pub fn netalias(name: &str) -> Entity {
    entity(
        EntityClass::NetAlias,
        json!({
            "name": name,
            "addresses": [
                {"member": "n1", "listen": "10.0.0.1", "advertise": "203.0.113.1"},
                {"member": "n2", "listen": "10.0.0.2", "advertise": "203.0.113.2"}
            ]
        }),
    )
}

pub fn sipprofile(name: &str, alias: &str) -> Entity {
    entity(
        EntityClass::SipProfile,
        json!({"name": name, "sip_address": alias, "rtp_address": alias}),
    )
}

pub fn gateway(name: &str, proxy: &str) -> Entity {
    entity(EntityClass::Gateway, json!({"name": name, "proxy": proxy}))
}

pub fn outbound(name: &str, profile: &str, gateways: &[(&str, u32)]) -> Entity {
    let gateways: Vec<Value> = gateways
        .iter()
        .map(|(g, w)| json!({"name": g, "weight": w}))
        .collect();
    entity(
        EntityClass::Outbound,
        json!({
            "name": name,
            "sipprofile": profile,
            "gateways": gateways,
            "codec_class": "std",
            "capacity_class": "unlimited"
        }),
    )
}

pub fn inbound(name: &str, profile: &str, sip_ips: &[&str]) -> Entity {
    entity(
        EntityClass::Inbound,
        json!({
            "name": name,
            "sipprofile": profile,
            "routing": "main",
            "sip_ips": sip_ips,
            "codec_class": "std",
            "capacity_class": "unlimited"
        }),
    )
}

pub fn query_table(name: &str) -> Entity {
    entity(
        EntityClass::RoutingTable,
        json!({"name": name, "action": "query", "variables": ["destination_number"]}),
    )
}

pub fn record(table: &str, matching: &str, value: &str, action: &str, endpoints: &[&str]) -> Entity {
    entity(
        EntityClass::RoutingRecord,
        json!({
            "table": table,
            "match": matching,
            "value": value,
            "action": action,
            "endpoints": endpoints
        }),
    )
}

/// Netalias `public`, profile `external`, classes `std`/`unlimited` and
/// gateways `gw1`..`gw3`
pub fn seeded() -> Fixture {
    let fx = fixture();
    let registry = &fx.registry;
    registry.create(netalias("public")).expect("netalias");
    registry.create(sipprofile("external", "public")).expect("sipprofile");
    registry
        .create(entity(
            EntityClass::Codec,
            json!({"name": "std", "codecs": ["ALAW", "ULAW"]}),
        ))
        .expect("codec class");
    registry
        .create(entity(
            EntityClass::Capacity,
            json!({"name": "unlimited", "cps": -1, "concurrentcalls": -1}),
        ))
        .expect("capacity class");
    for (i, name) in ["gw1", "gw2", "gw3"].iter().enumerate() {
        registry
            .create(gateway(name, &format!("198.51.100.{}", i + 1)))
            .expect("gateway");
    }
    fx
}
