//! Event fan-out
//!
//! One event per affected member, delayed by the member's position in the
//! cluster list so a change that reaches every node does not reload them
//! all at once.

use std::collections::BTreeSet;

use chrono::Utc;
use uuid::Uuid;

use super::event::{Action, ChangeEvent, EventClass, EventDetail};
use crate::config::ClusterConfig;
use crate::registry::ALL_NODES;
use crate::store::keys;

/// Members an event is delivered to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeScope {
    All,
    Only(BTreeSet<String>),
}

impl NodeScope {
    /// Union of interconnection node lists; `_ALL_` anywhere means all
    pub fn from_node_lists<'a>(lists: impl IntoIterator<Item = &'a [String]>) -> Self {
        let mut nodes = BTreeSet::new();
        for list in lists {
            if list.iter().any(|n| n == ALL_NODES) {
                return NodeScope::All;
            }
            nodes.extend(list.iter().cloned());
        }
        NodeScope::Only(nodes)
    }

    pub fn includes(&self, nodeid: &str) -> bool {
        match self {
            NodeScope::All => true,
            NodeScope::Only(nodes) => nodes.contains(nodeid),
        }
    }
}

/// Event content before it is addressed to nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub class: EventClass,
    pub action: Action,
    pub old_id: Option<String>,
    pub new_id: Option<String>,
    pub detail: EventDetail,
}

/// Address a draft to every affected member.
///
/// Returns `(queue, event)` pairs in member order.
pub fn fan_out(
    cluster: &ClusterConfig,
    scope: &NodeScope,
    draft: &EventDraft,
    requestid: Uuid,
) -> Vec<(String, ChangeEvent)> {
    let created_at = Utc::now();
    cluster
        .members
        .iter()
        .enumerate()
        .filter(|(_, nodeid)| scope.includes(nodeid))
        .map(|(index, nodeid)| {
            let event = ChangeEvent {
                class: draft.class,
                action: draft.action,
                old_id: draft.old_id.clone(),
                new_id: draft.new_id.clone(),
                detail: draft.detail.clone(),
                prewait: cluster.prewait_coefficient.saturating_mul(index as u64),
                requestid,
                created_at,
            };
            (
                keys::event_queue(keys::CALL_ENGINE, draft.class.as_str(), nodeid),
                event,
            )
        })
        .collect()
}
