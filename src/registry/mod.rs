//! Entity registry
//!
//! Typed entities with referential integrity. Every entity keeps the set of
//! entities that reference it (its engagement set); an entity with a
//! non-empty engagement set cannot be deleted, and renaming it repoints
//! every dependent in the same commit.

mod entity;
mod errors;
mod model;
mod record;
mod service;
mod txn;
pub mod validation;

pub use entity::{record_id, EntityClass, DEFAULT_ENTRY};
pub use errors::{RegistryError, RegistryResult};
pub use model::{
    Acl, AclAction, AclRule, AclRuleKind, AuthScheme, CapacityClass, Codec, CodecClass, Condition,
    Distribution, DtmfType, Gateway, GatewayWeight, InboundInterconnection, ManipulationClass,
    MatchKind, Model, NetAddress, NetAlias, OutboundInterconnection, RecordAction, Reference,
    Rewrite, RingtoneClass, RoutingRecord, RoutingTable, SipProfile, TableAction,
    TranslationClass, Transport, MAX_ENDPOINTS,
};
pub use record::{Entity, Summary};
pub use service::{Applied, Mutation, Plan, Registry, RECOGNITION_OWNER};
pub use validation::{ALL_NODES, BUILTIN_ACLS};
