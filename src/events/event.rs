//! Change events carried on the per-node queues

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::EntityClass;

/// Event class, which is also the queue name segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventClass {
    #[serde(rename = "netalias")]
    NetAlias,
    #[serde(rename = "acl")]
    Acl,
    #[serde(rename = "sipprofile")]
    SipProfile,
    #[serde(rename = "gateway")]
    Gateway,
    #[serde(rename = "outbound:intcon")]
    Outbound,
    #[serde(rename = "inbound:intcon")]
    Inbound,
    #[serde(rename = "cluster")]
    Cluster,
    #[serde(rename = "resync")]
    Resync,
}

impl EventClass {
    pub const ALL: [EventClass; 8] = [
        EventClass::NetAlias,
        EventClass::Acl,
        EventClass::SipProfile,
        EventClass::Gateway,
        EventClass::Outbound,
        EventClass::Inbound,
        EventClass::Cluster,
        EventClass::Resync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventClass::NetAlias => "netalias",
            EventClass::Acl => "acl",
            EventClass::SipProfile => "sipprofile",
            EventClass::Gateway => "gateway",
            EventClass::Outbound => "outbound:intcon",
            EventClass::Inbound => "inbound:intcon",
            EventClass::Cluster => "cluster",
            EventClass::Resync => "resync",
        }
    }

    /// Event class raised by mutations of an entity class
    pub fn for_entity(class: EntityClass) -> Option<EventClass> {
        match class {
            EntityClass::NetAlias => Some(EventClass::NetAlias),
            EntityClass::Acl => Some(EventClass::Acl),
            EntityClass::SipProfile => Some(EventClass::SipProfile),
            EntityClass::Gateway => Some(EventClass::Gateway),
            EntityClass::Outbound => Some(EventClass::Outbound),
            EntityClass::Inbound => Some(EventClass::Inbound),
            _ => None,
        }
    }

    /// Whether handling this class regenerates the firewall rules
    pub fn triggers_firewall(&self) -> bool {
        matches!(
            self,
            EventClass::NetAlias
                | EventClass::Acl
                | EventClass::SipProfile
                | EventClass::Outbound
                | EventClass::Inbound
                | EventClass::Resync
        )
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
    Resync,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Resync => "resync",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What command planning needs beyond the identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetail {
    None,
    /// SIP profiles affected by the change
    Profiles { sipprofiles: Vec<String> },
    Outbound {
        sipprofile: Option<String>,
        old_sipprofile: Option<String>,
        gateways: Vec<String>,
        /// Previous gateways and how many interconnections used each
        old_gateways: BTreeMap<String, usize>,
    },
    /// Call-engine global variables, `name=value`
    Variables { variables: Vec<String> },
}

/// One queued change for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub class: EventClass,
    pub action: Action,
    pub old_id: Option<String>,
    pub new_id: Option<String>,
    pub detail: EventDetail,
    /// Seconds to wait before acting
    pub prewait: u64,
    pub requestid: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Update that changed the entity's identifier
    pub fn is_rename(&self) -> bool {
        self.action == Action::Update && self.old_id != self.new_id
    }
}
