//! Entity registry service
//!
//! Every mutation runs in two phases. [`Registry::plan`] reads through a
//! [`WorkingSet`], validates, computes engagement-set edits and the events
//! to propagate, and produces one guarded batch. [`Registry::apply`] commits
//! that batch; if any key read during planning has moved, nothing is written
//! and the caller gets `Conflict`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use uuid::Uuid;

use super::entity::EntityClass;
use super::errors::{RegistryError, RegistryResult};
use super::model::{InboundInterconnection, OutboundInterconnection, TableAction};
use super::record::{Entity, Summary};
use super::txn::WorkingSet;
use super::validation::check_nodes;
use crate::config::{ClusterConfig, ClusterHandle, ClusterSnapshot};
use crate::events::{fan_out, Action, EventClass, EventDetail, EventDraft, NodeScope};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::store::{codec, keys, Hash, Store, WriteBatch};

/// Field of a recognition hash naming the owning inbound interconnection
pub const RECOGNITION_OWNER: &str = "intcon";

/// Requested change to one entity
#[derive(Debug, Clone)]
pub enum Mutation {
    Create(Entity),
    Update {
        class: EntityClass,
        id: String,
        entity: Entity,
    },
    Delete {
        class: EntityClass,
        id: String,
    },
}

impl Mutation {
    pub fn class(&self) -> EntityClass {
        match self {
            Mutation::Create(entity) => entity.class(),
            Mutation::Update { class, .. } | Mutation::Delete { class, .. } => *class,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Mutation::Create(_) => Action::Create,
            Mutation::Update { .. } => Action::Update,
            Mutation::Delete { .. } => Action::Delete,
        }
    }
}

/// Validated mutation, ready to commit
#[derive(Debug, Clone)]
pub struct Plan {
    pub class: EntityClass,
    pub action: Action,
    pub old_id: Option<String>,
    pub new_id: Option<String>,
    pub requestid: Uuid,
    /// Events queued by the batch
    pub events: usize,
    batch: WriteBatch,
}

impl Plan {
    pub fn batch(&self) -> &WriteBatch {
        &self.batch
    }
}

/// Result of a committed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Applied {
    pub class: EntityClass,
    pub action: Action,
    pub id: String,
    pub requestid: Uuid,
    pub events: usize,
}

/// Entity registry
pub struct Registry {
    store: Arc<dyn Store>,
    cluster: ClusterHandle,
    metrics: Arc<MetricsRegistry>,
    cluster_writer: Mutex<()>,
}

impl Registry {
    /// Open the registry over `store`.
    ///
    /// Cluster attributes already in the store take precedence over
    /// `cluster`; otherwise `cluster` is persisted.
    pub fn open(
        store: Arc<dyn Store>,
        cluster: ClusterConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> RegistryResult<Self> {
        let (stored, version) = store.read_hash(keys::CLUSTER_ATTRIBUTES)?;
        let config = match stored {
            Some(fields) => {
                let config: ClusterConfig = codec::decode_hash(keys::CLUSTER_ATTRIBUTES, &fields)?;
                log_event_with_fields(
                    Event::ConfigLoaded,
                    &[("cluster", &config.name), ("source", "store")],
                );
                config
            }
            None => {
                cluster.validate()?;
                let mut batch = WriteBatch::new();
                batch.watch(keys::CLUSTER_ATTRIBUTES, version).replace_hash(
                    keys::CLUSTER_ATTRIBUTES,
                    codec::encode_hash(keys::CLUSTER_ATTRIBUTES, &cluster)?,
                );
                store.commit(batch)?;
                log_event_with_fields(
                    Event::ConfigLoaded,
                    &[("cluster", &cluster.name), ("source", "config")],
                );
                cluster
            }
        };
        Ok(Self {
            store,
            cluster: ClusterHandle::new(config)?,
            metrics,
            cluster_writer: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Current cluster configuration
    pub fn cluster(&self) -> ClusterSnapshot {
        self.cluster.snapshot()
    }

    // ==================
    // Mutations
    // ==================

    pub fn create(&self, entity: Entity) -> RegistryResult<Applied> {
        self.execute(Mutation::Create(entity))
    }

    pub fn update(&self, class: EntityClass, id: &str, entity: Entity) -> RegistryResult<Applied> {
        self.execute(Mutation::Update {
            class,
            id: id.to_string(),
            entity,
        })
    }

    pub fn delete(&self, class: EntityClass, id: &str) -> RegistryResult<Applied> {
        self.execute(Mutation::Delete {
            class,
            id: id.to_string(),
        })
    }

    pub fn execute(&self, mutation: Mutation) -> RegistryResult<Applied> {
        let plan = self.plan(mutation)?;
        self.apply(plan)
    }

    /// Validate a mutation and build its batch without writing anything
    pub fn plan(&self, mutation: Mutation) -> RegistryResult<Plan> {
        let class = mutation.class();
        let action = mutation.action();
        self.prepare(mutation).map_err(|err| {
            self.reject(class, action, &err);
            err
        })
    }

    /// Commit a plan
    pub fn apply(&self, plan: Plan) -> RegistryResult<Applied> {
        let Plan {
            class,
            action,
            old_id,
            new_id,
            requestid,
            events,
            batch,
        } = plan;
        let id = new_id.or_else(|| old_id.clone()).unwrap_or_default();

        if let Err(err) = self.store.commit(batch) {
            let err = RegistryError::from(err);
            self.reject(class, action, &err);
            return Err(err);
        }

        self.metrics.increment_mutations_committed();
        self.metrics.add_events_propagated(events as u64);
        let event = match action {
            Action::Create => Event::EntityCreated,
            Action::Delete => Event::EntityDeleted,
            Action::Update | Action::Resync => Event::EntityUpdated,
        };
        log_event_with_fields(
            event,
            &[
                ("class", class.token()),
                ("events", &events.to_string()),
                ("id", &id),
                ("old_id", old_id.as_deref().unwrap_or("")),
                ("requestid", &requestid.to_string()),
            ],
        );
        Ok(Applied {
            class,
            action,
            id,
            requestid,
            events,
        })
    }

    fn reject(&self, class: EntityClass, action: Action, err: &RegistryError) {
        let event = if matches!(err, RegistryError::Conflict { .. }) {
            self.metrics.increment_mutations_conflicted();
            Event::MutationConflict
        } else {
            self.metrics.increment_mutations_rejected();
            Event::MutationRejected
        };
        log_event_with_fields(
            event,
            &[
                ("action", action.as_str()),
                ("class", class.token()),
                ("code", err.code()),
                ("reason", &err.to_string()),
            ],
        );
    }

    fn prepare(&self, mutation: Mutation) -> RegistryResult<Plan> {
        let requestid = Uuid::new_v4();
        let mut ws = WorkingSet::new(self.store.as_ref());
        let cluster = self.cluster_view(&mut ws)?;
        let class = mutation.class();
        let action = mutation.action();

        let (before, after) = match mutation {
            Mutation::Create(mut entity) => {
                entity.normalize();
                entity.check(&cluster)?;
                if ws.hash(&entity.record_key())?.is_some() {
                    return Err(RegistryError::AlreadyExists {
                        class,
                        id: entity.id(),
                    });
                }
                (None, Some(entity))
            }
            Mutation::Update {
                class,
                id,
                mut entity,
            } => {
                if entity.class() != class {
                    return Err(RegistryError::validation(
                        "class",
                        format!("expected a {} body", class),
                    ));
                }
                entity.normalize();
                entity.check(&cluster)?;
                let current = ws
                    .entity(class, &id)?
                    .ok_or_else(|| RegistryError::not_found(class, &id))?;
                if entity.id() != id && ws.hash(&entity.record_key())?.is_some() {
                    return Err(RegistryError::AlreadyExists {
                        class,
                        id: entity.id(),
                    });
                }
                (Some(current), Some(entity))
            }
            Mutation::Delete { class, id } => {
                let current = ws
                    .entity(class, &id)?
                    .ok_or_else(|| RegistryError::not_found(class, &id))?;
                let by = ws.set(&keys::engagement(&current.record_key()))?;
                if !by.is_empty() {
                    return Err(RegistryError::Engaged {
                        class,
                        id,
                        by: by.into_iter().collect(),
                    });
                }
                (Some(current), None)
            }
        };

        if let Some(after) = &after {
            check_integrity(&mut ws, before.as_ref(), after)?;
        }
        let draft = draft_event(&mut ws, before.as_ref(), after.as_ref())?;
        rewrite(&mut ws, before.as_ref(), after.as_ref())?;

        if let Some((draft, scope)) = draft {
            queue_events(&mut ws, &cluster, &scope, &draft, requestid)?;
        }
        let events = ws.pushed();
        Ok(Plan {
            class,
            action,
            old_id: before.as_ref().map(Entity::id),
            new_id: after.as_ref().map(Entity::id),
            requestid,
            events,
            batch: ws.into_batch(&requestid.to_string()),
        })
    }

    fn cluster_view(&self, ws: &mut WorkingSet<'_>) -> RegistryResult<ClusterConfig> {
        match ws.hash(keys::CLUSTER_ATTRIBUTES)? {
            Some(fields) => Ok(codec::decode_hash(keys::CLUSTER_ATTRIBUTES, &fields)?),
            None => Ok((*self.cluster.snapshot().config).clone()),
        }
    }

    // ==================
    // Reads
    // ==================

    pub fn get(&self, class: EntityClass, id: &str) -> RegistryResult<Entity> {
        let key = class.record_key(id);
        let (fields, _) = self.store.read_hash(&key)?;
        let fields = fields.ok_or_else(|| RegistryError::not_found(class, id))?;
        Ok(Entity::decode(class, &key, &fields)?)
    }

    pub fn list(&self, class: EntityClass) -> RegistryResult<Vec<Summary>> {
        let (names, _) = self.store.read_set(&keys::nameset(class.token()))?;
        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            match self.get(class, &name) {
                Ok(entity) => summaries.push(Summary {
                    desc: entity.desc().to_string(),
                    name,
                }),
                Err(RegistryError::NotFound { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(summaries)
    }

    /// Nameids of the entities depending on `(class, id)`
    pub fn engaged_by(&self, class: EntityClass, id: &str) -> RegistryResult<Vec<String>> {
        self.get(class, id)?;
        let (members, _) = self
            .store
            .read_set(&keys::engagement(&class.record_key(id)))?;
        Ok(members.into_iter().collect())
    }

    // ==================
    // Cluster
    // ==================

    /// Replace the cluster attributes and push the new engine variables to
    /// every member
    pub fn update_cluster(&self, config: ClusterConfig) -> RegistryResult<ClusterSnapshot> {
        let _writer = self
            .cluster_writer
            .lock()
            .map_err(|_| RegistryError::Internal("Lock poisoned".into()))?;
        config.validate()?;
        let current = self.cluster.snapshot();
        let requestid = Uuid::new_v4();
        let mut ws = WorkingSet::new(self.store.as_ref());
        let stored = self.cluster_view(&mut ws)?;

        if stored.members != config.members {
            check_membership_change(&mut ws, &config)?;
        }
        ws.put_hash(
            keys::CLUSTER_ATTRIBUTES,
            codec::encode_hash(keys::CLUSTER_ATTRIBUTES, &config)?,
        );
        let draft = EventDraft {
            class: EventClass::Cluster,
            action: Action::Update,
            old_id: Some(stored.name.clone()),
            new_id: Some(config.name.clone()),
            detail: EventDetail::Variables {
                variables: config.engine_variables(),
            },
        };
        queue_events(&mut ws, &config, &NodeScope::All, &draft, requestid)?;
        let events = ws.pushed();

        if let Err(err) = self.store.commit(ws.into_batch(&requestid.to_string())) {
            let err = RegistryError::from(err);
            if matches!(err, RegistryError::Conflict { .. }) {
                self.metrics.increment_mutations_conflicted();
            }
            return Err(err);
        }
        let version = self.cluster.replace(current.version, config)?;
        self.metrics.increment_mutations_committed();
        self.metrics.add_events_propagated(events as u64);
        log_event_with_fields(
            Event::ClusterUpdated,
            &[
                ("events", &events.to_string()),
                ("requestid", &requestid.to_string()),
                ("version", &version.to_string()),
            ],
        );
        Ok(self.cluster.snapshot())
    }

    /// Queue a full re-sync for `nodes`, or for every member when `None`
    pub fn resync(&self, nodes: Option<&[String]>) -> RegistryResult<usize> {
        let requestid = Uuid::new_v4();
        let mut ws = WorkingSet::new(self.store.as_ref());
        let cluster = self.cluster_view(&mut ws)?;
        let scope = match nodes {
            None => NodeScope::All,
            Some(nodes) => {
                check_nodes(nodes, &cluster)?;
                NodeScope::from_node_lists([nodes])
            }
        };
        let sipprofiles = ws
            .set(&keys::nameset(EntityClass::SipProfile.token()))?
            .into_iter()
            .collect();
        let draft = EventDraft {
            class: EventClass::Resync,
            action: Action::Resync,
            old_id: None,
            new_id: None,
            detail: EventDetail::Profiles { sipprofiles },
        };
        queue_events(&mut ws, &cluster, &scope, &draft, requestid)?;
        let events = ws.pushed();
        self.store.commit(ws.into_batch(&requestid.to_string()))?;
        self.metrics.add_events_propagated(events as u64);
        log_event_with_fields(
            Event::EventPropagated,
            &[
                ("class", EventClass::Resync.as_str()),
                ("events", &events.to_string()),
                ("requestid", &requestid.to_string()),
            ],
        );
        Ok(events)
    }
}

// ==================
// Integrity
// ==================

fn check_integrity(
    ws: &mut WorkingSet<'_>,
    before: Option<&Entity>,
    after: &Entity,
) -> RegistryResult<()> {
    for reference in after.references() {
        if ws.hash(&reference.record_key())?.is_none() {
            return Err(RegistryError::validation(
                reference.class.token(),
                format!("{} '{}' does not exist", reference.class, reference.name),
            ));
        }
    }
    match after {
        Entity::RoutingRecord(record) => {
            let parent = ws.entity(EntityClass::RoutingTable, &record.table)?;
            let action = parent.as_ref().and_then(Entity::as_table).map(|t| t.action);
            if action != Some(TableAction::Query) {
                return Err(RegistryError::validation(
                    "table",
                    format!("'{}' is not a query table", record.table),
                ));
            }
        }
        Entity::RoutingTable(table) if table.action != TableAction::Query => {
            if let Some(before) = before {
                let owned = ws.set(&keys::engagement(&before.record_key()))?;
                let prefix = format!("{}:", EntityClass::RoutingRecord.prefix());
                if owned.iter().any(|m| m.starts_with(&prefix)) {
                    return Err(RegistryError::validation(
                        "action",
                        "table still owns routing records",
                    ));
                }
            }
        }
        Entity::Outbound(intcon) => check_gateway_sharing(ws, before, intcon)?,
        Entity::Inbound(intcon) => check_recognition(ws, before, intcon)?,
        _ => {}
    }
    Ok(())
}

/// A gateway may only be shared by interconnections on the same SIP profile
fn check_gateway_sharing(
    ws: &mut WorkingSet<'_>,
    before: Option<&Entity>,
    intcon: &OutboundInterconnection,
) -> RegistryResult<()> {
    let own = before.map(Entity::nameid);
    for gateway in &intcon.gateways {
        let users = ws.set(&keys::engagement(
            &EntityClass::Gateway.record_key(&gateway.name),
        ))?;
        for user in users {
            if own.as_deref() == Some(user.as_str()) {
                continue;
            }
            let Some((EntityClass::Outbound, name)) = EntityClass::parse_nameid(&user) else {
                continue;
            };
            let other = ws.entity(EntityClass::Outbound, name)?;
            if let Some(other) = other.as_ref().and_then(Entity::as_outbound) {
                if other.sipprofile != intcon.sipprofile {
                    return Err(RegistryError::validation(
                        "gateways",
                        format!(
                            "gateway '{}' is shared with '{}' on sipprofile '{}'",
                            gateway.name, other.name, other.sipprofile
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// SIP source addresses are owned by one inbound interconnection per profile
fn check_recognition(
    ws: &mut WorkingSet<'_>,
    before: Option<&Entity>,
    intcon: &InboundInterconnection,
) -> RegistryResult<()> {
    let own = before.and_then(Entity::as_inbound).map(|b| b.name.clone());
    for ip in &intcon.sip_ips {
        let key = keys::recognition(&intcon.sipprofile, ip);
        let owner = ws
            .hash(&key)?
            .and_then(|fields| fields.get(RECOGNITION_OWNER).cloned());
        if let Some(owner) = owner {
            if Some(&owner) != own.as_ref() {
                return Err(RegistryError::validation(
                    "sip_ips",
                    format!(
                        "{} is already recognised on sipprofile '{}' by '{}'",
                        ip, intcon.sipprofile, owner
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn check_membership_change(ws: &mut WorkingSet<'_>, config: &ClusterConfig) -> RegistryResult<()> {
    for name in ws.set(&keys::nameset(EntityClass::NetAlias.token()))? {
        let entity = ws.entity(EntityClass::NetAlias, &name)?;
        if let Some(alias) = entity.as_ref().and_then(Entity::as_netalias) {
            alias.check_members(config).map_err(|_| {
                RegistryError::validation(
                    "members",
                    format!("netalias '{}' needs exactly one address per member", name),
                )
            })?;
        }
    }
    for class in [EntityClass::Outbound, EntityClass::Inbound] {
        for name in ws.set(&keys::nameset(class.token()))? {
            let entity = ws.entity(class, &name)?;
            if let Some(nodes) = entity.as_ref().and_then(Entity::nodes) {
                check_nodes(nodes, config).map_err(|_| {
                    RegistryError::validation(
                        "members",
                        format!("{} '{}' is pinned to a removed member", class, name),
                    )
                })?;
            }
        }
    }
    Ok(())
}

// ==================
// Engagement bookkeeping
// ==================

/// Replace `before` with `after` in the working set.
///
/// Handles create (`before` absent), delete (`after` absent) and update,
/// including identifier changes: the old record and name go away, every
/// dependent is repointed at the new identifier, and the engagement sets of
/// everything this entity references are diffed.
fn rewrite(
    ws: &mut WorkingSet<'_>,
    before: Option<&Entity>,
    after: Option<&Entity>,
) -> RegistryResult<()> {
    let old_refs = before.map(Entity::references).unwrap_or_default();
    let new_refs = after.map(Entity::references).unwrap_or_default();
    let old_nameid = before.map(Entity::nameid);
    let new_nameid = after.map(Entity::nameid);

    if let Some(before) = before {
        let class = before.class();
        let moved = after.map_or(true, |a| a.id() != before.id());
        if moved {
            ws.delete_hash(&before.record_key())?;
            ws.set_remove(&keys::nameset(class.token()), &before.id())?;
            if class.affects_routing() {
                ws.mark_routing_changed();
            }
            if let Some(after) = after {
                cascade_rename(ws, class, &before.id(), &after.id())?;
            }
        }
    }
    if let Some(after) = after {
        if before.map_or(true, |b| b.id() != after.id()) {
            ws.set_insert(&keys::nameset(after.class().token()), &after.id())?;
        }
        ws.put_entity(after)?;
    }

    if let Some(old_nameid) = &old_nameid {
        for reference in &old_refs {
            if new_nameid.as_ref() != Some(old_nameid) || !new_refs.contains(reference) {
                ws.set_remove(&keys::engagement(&reference.record_key()), old_nameid)?;
            }
        }
    }
    if let Some(new_nameid) = &new_nameid {
        for reference in &new_refs {
            ws.set_insert(&keys::engagement(&reference.record_key()), new_nameid)?;
        }
    }

    sync_recognition(
        ws,
        before.and_then(Entity::as_inbound),
        after.and_then(Entity::as_inbound),
    )
}

/// Repoint every dependent of `(class, old)` at `new`
fn cascade_rename(
    ws: &mut WorkingSet<'_>,
    class: EntityClass,
    old: &str,
    new: &str,
) -> RegistryResult<()> {
    let old_key = keys::engagement(&class.record_key(old));
    let dependents = ws.set(&old_key)?;
    ws.replace_set(&old_key, BTreeSet::new())?;

    for nameid in dependents {
        let Some((dep_class, dep_id)) = EntityClass::parse_nameid(&nameid) else {
            continue;
        };
        let Some(before) = ws.entity(dep_class, dep_id)? else {
            continue;
        };
        let mut after = before.clone();
        after.rename_reference(class, old, new);
        if after.id() != before.id() && ws.hash(&after.record_key())?.is_some() {
            return Err(RegistryError::AlreadyExists {
                class: dep_class,
                id: after.id(),
            });
        }
        rewrite(ws, Some(&before), Some(&after))?;
    }
    Ok(())
}

fn sync_recognition(
    ws: &mut WorkingSet<'_>,
    before: Option<&InboundInterconnection>,
    after: Option<&InboundInterconnection>,
) -> RegistryResult<()> {
    let recognised = |intcon: Option<&InboundInterconnection>| -> BTreeSet<String> {
        intcon
            .map(|i| {
                i.sip_ips
                    .iter()
                    .map(|ip| keys::recognition(&i.sipprofile, ip))
                    .collect()
            })
            .unwrap_or_default()
    };
    let old_keys = recognised(before);
    let new_keys = recognised(after);
    for key in old_keys.difference(&new_keys) {
        ws.delete_hash(key)?;
    }
    if let Some(after) = after {
        for key in &new_keys {
            let mut fields = Hash::new();
            fields.insert(RECOGNITION_OWNER.to_string(), after.name.clone());
            ws.put_hash(key, fields);
        }
    }
    Ok(())
}

// ==================
// Propagation
// ==================

/// Event describing the change, computed from pre-mutation state
fn draft_event(
    ws: &mut WorkingSet<'_>,
    before: Option<&Entity>,
    after: Option<&Entity>,
) -> RegistryResult<Option<(EventDraft, NodeScope)>> {
    let Some(subject) = after.or(before) else {
        return Ok(None);
    };
    let class = subject.class();
    let Some(event_class) = EventClass::for_entity(class) else {
        return Ok(None);
    };
    let action = match (before, after) {
        (None, _) => Action::Create,
        (Some(_), Some(_)) => Action::Update,
        (Some(_), None) => Action::Delete,
    };

    let detail = match class {
        EntityClass::NetAlias | EntityClass::Acl => EventDetail::Profiles {
            sipprofiles: match before {
                Some(before) => profiles_engaging(ws, before)?,
                None => Vec::new(),
            },
        },
        // nothing runs a gateway until an interconnection uses it
        EntityClass::Gateway if action != Action::Update => return Ok(None),
        EntityClass::Gateway => EventDetail::Profiles {
            sipprofiles: match before {
                Some(before) => gateway_profiles(ws, &before.id())?,
                None => Vec::new(),
            },
        },
        EntityClass::Outbound => {
            let old = before.and_then(Entity::as_outbound);
            let new = after.and_then(Entity::as_outbound);
            let mut old_gateways = BTreeMap::new();
            if let Some(old) = old {
                for gateway in &old.gateways {
                    let users = outbound_users(ws, &gateway.name)?;
                    old_gateways.insert(gateway.name.clone(), users.len());
                }
            }
            EventDetail::Outbound {
                sipprofile: new.map(|n| n.sipprofile.clone()),
                old_sipprofile: old.map(|o| o.sipprofile.clone()),
                gateways: new.map(OutboundInterconnection::gateway_names).unwrap_or_default(),
                old_gateways,
            }
        }
        _ => EventDetail::None,
    };

    let scope = match class {
        EntityClass::Outbound | EntityClass::Inbound => NodeScope::from_node_lists(
            before
                .and_then(Entity::nodes)
                .into_iter()
                .chain(after.and_then(Entity::nodes)),
        ),
        _ => NodeScope::All,
    };
    let draft = EventDraft {
        class: event_class,
        action,
        old_id: before.map(Entity::id),
        new_id: after.map(Entity::id),
        detail,
    };
    Ok(Some((draft, scope)))
}

fn profiles_engaging(ws: &mut WorkingSet<'_>, entity: &Entity) -> RegistryResult<Vec<String>> {
    let members = ws.set(&keys::engagement(&entity.record_key()))?;
    Ok(members
        .iter()
        .filter_map(|m| match EntityClass::parse_nameid(m) {
            Some((EntityClass::SipProfile, name)) => Some(name.to_string()),
            _ => None,
        })
        .collect())
}

fn outbound_users(ws: &mut WorkingSet<'_>, gateway: &str) -> RegistryResult<Vec<String>> {
    let members = ws.set(&keys::engagement(&EntityClass::Gateway.record_key(gateway)))?;
    Ok(members
        .iter()
        .filter_map(|m| match EntityClass::parse_nameid(m) {
            Some((EntityClass::Outbound, name)) => Some(name.to_string()),
            _ => None,
        })
        .collect())
}

fn gateway_profiles(ws: &mut WorkingSet<'_>, gateway: &str) -> RegistryResult<Vec<String>> {
    let mut profiles = BTreeSet::new();
    for name in outbound_users(ws, gateway)? {
        let entity = ws.entity(EntityClass::Outbound, &name)?;
        if let Some(intcon) = entity.as_ref().and_then(Entity::as_outbound) {
            profiles.insert(intcon.sipprofile.clone());
        }
    }
    Ok(profiles.into_iter().collect())
}

fn queue_events(
    ws: &mut WorkingSet<'_>,
    cluster: &ClusterConfig,
    scope: &NodeScope,
    draft: &EventDraft,
    requestid: Uuid,
) -> RegistryResult<()> {
    for (queue, event) in fan_out(cluster, scope, draft, requestid) {
        let payload = event
            .to_payload()
            .map_err(|e| RegistryError::Internal(format!("event encoding: {}", e)))?;
        ws.push(queue, payload);
    }
    Ok(())
}
