//! Routing resolution
//!
//! Resolution is a pure function of a [`RoutingSnapshot`]. The resolver
//! keeps the last snapshot and reloads it only when the store's routing
//! generation marker has moved, which every routing mutation bumps in the
//! same commit.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use super::errors::{RoutingError, RoutingResult};
use super::trie::PrefixTrie;
use crate::observability::{log_event_with_fields, Event};
use crate::registry::{
    EntityClass, MatchKind, RecordAction, Registry, RegistryError, RoutingRecord, RoutingTable,
    TableAction,
};
use crate::store::{keys, Version};

/// Upper bound on table hops for one resolution
pub const MAX_JUMPS: usize = 16;

const SNAPSHOT_RETRIES: usize = 5;

/// Outcome of one routing step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Decision {
    Route {
        endpoints: Vec<String>,
        weights: Vec<u32>,
    },
    Block,
    Jump {
        table: String,
    },
}

/// Final decision and the tables visited on the way
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub decision: Decision,
    pub path: Vec<String>,
}

#[derive(Debug, Clone)]
struct TableIndex {
    table: RoutingTable,
    exact: HashMap<String, RoutingRecord>,
    prefixes: PrefixTrie<RoutingRecord>,
    default: Option<RoutingRecord>,
}

impl TableIndex {
    fn new(table: RoutingTable) -> Self {
        Self {
            table,
            exact: HashMap::new(),
            prefixes: PrefixTrie::new(),
            default: None,
        }
    }

    fn add(&mut self, record: RoutingRecord) {
        if record.is_default() {
            self.default = Some(record);
            return;
        }
        match record.matching {
            MatchKind::Em => {
                self.exact.insert(record.value.clone(), record);
            }
            MatchKind::Lpm => {
                let value = record.value.clone();
                self.prefixes.insert(&value, record);
            }
        }
    }

    /// Exact match, then longest prefix, then the default entry
    fn lookup(&self, value: &str) -> Option<&RoutingRecord> {
        self.exact
            .get(value)
            .or_else(|| self.prefixes.longest_match(value).map(|(_, r)| r))
            .or(self.default.as_ref())
    }

    /// First declared variable
    fn variable(&self) -> Option<&str> {
        self.table.variables.first().map(String::as_str)
    }
}

/// Immutable index over every routing table and record
#[derive(Debug, Clone, Default)]
pub struct RoutingSnapshot {
    tables: HashMap<String, TableIndex>,
    generation: Version,
}

impl RoutingSnapshot {
    pub fn build(
        tables: impl IntoIterator<Item = RoutingTable>,
        records: impl IntoIterator<Item = RoutingRecord>,
        generation: Version,
    ) -> Self {
        let mut index: HashMap<String, TableIndex> = tables
            .into_iter()
            .map(|t| (t.name.clone(), TableIndex::new(t)))
            .collect();
        for record in records {
            if let Some(table) = index.get_mut(&record.table) {
                table.add(record);
            }
        }
        Self {
            tables: index,
            generation,
        }
    }

    /// Read every table and record through the registry
    pub fn load(registry: &Registry, generation: Version) -> RoutingResult<Self> {
        let mut tables = Vec::new();
        for summary in registry.list(EntityClass::RoutingTable)? {
            match registry.get(EntityClass::RoutingTable, &summary.name) {
                Ok(entity) => tables.extend(entity.as_table().cloned()),
                Err(RegistryError::NotFound { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        let mut records = Vec::new();
        for summary in registry.list(EntityClass::RoutingRecord)? {
            match registry.get(EntityClass::RoutingRecord, &summary.name) {
                Ok(entity) => records.extend(entity.as_record().cloned()),
                Err(RegistryError::NotFound { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Self::build(tables, records, generation))
    }

    pub fn generation(&self) -> Version {
        self.generation
    }

    /// One hop through `table` with `value`
    pub fn step(&self, table: &str, value: &str) -> RoutingResult<Decision> {
        let index = self
            .tables
            .get(table)
            .ok_or_else(|| RoutingError::UnknownTable(table.to_string()))?;
        Ok(step_in(index, value))
    }

    /// Follow jumps from `table`, matching `value` in every table
    pub fn resolve(&self, table: &str, value: &str) -> RoutingResult<Resolution> {
        self.resolve_with(table, |_| value.to_string())
    }

    /// Follow jumps from `table`, matching each table's first declared
    /// variable taken from `vars`
    pub fn resolve_call(
        &self,
        table: &str,
        vars: &HashMap<String, String>,
    ) -> RoutingResult<Resolution> {
        self.resolve_with(table, |index| {
            index
                .variable()
                .and_then(|name| vars.get(name))
                .cloned()
                .unwrap_or_default()
        })
    }

    fn resolve_with(
        &self,
        table: &str,
        value_for: impl Fn(&TableIndex) -> String,
    ) -> RoutingResult<Resolution> {
        let mut current = table.to_string();
        let mut path = Vec::new();
        loop {
            let index = self
                .tables
                .get(&current)
                .ok_or_else(|| RoutingError::UnknownTable(current.clone()))?;
            path.push(current.clone());
            match step_in(index, &value_for(index)) {
                Decision::Jump { table } => {
                    if path.len() > MAX_JUMPS {
                        log_event_with_fields(
                            Event::RouteDepthExceeded,
                            &[("path", &path.join(">")), ("start", &path[0])],
                        );
                        return Ok(Resolution {
                            decision: Decision::Block,
                            path,
                        });
                    }
                    current = table;
                }
                decision => return Ok(Resolution { decision, path }),
            }
        }
    }
}

fn step_in(index: &TableIndex, value: &str) -> Decision {
    match index.table.action {
        TableAction::Block => Decision::Block,
        TableAction::Route => Decision::Route {
            endpoints: index.table.endpoints.clone(),
            weights: index.table.weights.clone(),
        },
        TableAction::Query => match index.lookup(value) {
            None => Decision::Block,
            Some(record) => match record.action {
                RecordAction::Block => Decision::Block,
                RecordAction::Route => Decision::Route {
                    endpoints: record.endpoints.clone(),
                    weights: record.weights.clone(),
                },
                RecordAction::Jumps => match record.endpoints.first() {
                    Some(table) => Decision::Jump {
                        table: table.clone(),
                    },
                    None => Decision::Block,
                },
            },
        },
    }
}

/// Snapshot-caching resolver over the registry
pub struct Resolver {
    registry: Arc<Registry>,
    cache: RwLock<Option<Arc<RoutingSnapshot>>>,
}

impl Resolver {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            cache: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Current snapshot, reloaded if the routing generation moved.
    ///
    /// A load that overlaps a routing commit is retried so the snapshot
    /// never mixes two generations.
    pub fn snapshot(&self) -> RoutingResult<Arc<RoutingSnapshot>> {
        let store = self.registry.store();
        let mut generation = store
            .version(keys::ROUTING_GENERATION)
            .map_err(RegistryError::from)?;
        if let Ok(cache) = self.cache.read() {
            if let Some(snapshot) = cache.as_ref().filter(|s| s.generation == generation) {
                return Ok(snapshot.clone());
            }
        }

        let mut snapshot = RoutingSnapshot::load(&self.registry, generation)?;
        for _ in 0..SNAPSHOT_RETRIES {
            let after = store
                .version(keys::ROUTING_GENERATION)
                .map_err(RegistryError::from)?;
            if after == generation {
                break;
            }
            generation = after;
            snapshot = RoutingSnapshot::load(&self.registry, generation)?;
        }
        let snapshot = Arc::new(snapshot);
        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(snapshot.clone());
        }
        Ok(snapshot)
    }

    pub fn step(&self, table: &str, value: &str) -> RoutingResult<Decision> {
        self.snapshot()?.step(table, value)
    }

    pub fn resolve(&self, table: &str, value: &str) -> RoutingResult<Resolution> {
        let resolution = self.snapshot()?.resolve(table, value)?;
        self.registry.metrics().increment_resolutions();
        Ok(resolution)
    }

    pub fn resolve_call(
        &self,
        table: &str,
        vars: &HashMap<String, String>,
    ) -> RoutingResult<Resolution> {
        let resolution = self.snapshot()?.resolve_call(table, vars)?;
        self.registry.metrics().increment_resolutions();
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(name: &str) -> RoutingTable {
        RoutingTable {
            name: name.into(),
            desc: String::new(),
            variables: vec!["destination_number".into()],
            action: TableAction::Query,
            endpoints: vec![],
            weights: vec![],
        }
    }

    fn record(table: &str, matching: MatchKind, value: &str, action: RecordAction, endpoints: &[&str]) -> RoutingRecord {
        RoutingRecord {
            table: table.into(),
            matching,
            value: value.into(),
            action,
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            weights: vec![],
        }
    }

    fn route(endpoint: &str) -> Decision {
        Decision::Route {
            endpoints: vec![endpoint.into()],
            weights: vec![],
        }
    }

    #[test]
    fn test_longest_prefix_then_default() {
        let snapshot = RoutingSnapshot::build(
            vec![query("T")],
            vec![
                record("T", MatchKind::Lpm, "1", RecordAction::Route, &["A"]),
                record("T", MatchKind::Lpm, "12", RecordAction::Route, &["B"]),
                record("T", MatchKind::Em, "", RecordAction::Route, &["C"]),
            ],
            1,
        );
        assert_eq!(snapshot.step("T", "123").unwrap(), route("B"));
        assert_eq!(snapshot.step("T", "9").unwrap(), route("C"));
        assert_eq!(snapshot.step("T", "1").unwrap(), route("A"));
    }

    #[test]
    fn test_exact_beats_prefix() {
        let snapshot = RoutingSnapshot::build(
            vec![query("T")],
            vec![
                record("T", MatchKind::Lpm, "12", RecordAction::Route, &["P"]),
                record("T", MatchKind::Em, "123", RecordAction::Block, &[]),
            ],
            1,
        );
        assert_eq!(snapshot.step("T", "123").unwrap(), Decision::Block);
        assert_eq!(snapshot.step("T", "1234").unwrap(), route("P"));
        // no match and no default
        assert_eq!(snapshot.step("T", "9").unwrap(), Decision::Block);
    }

    #[test]
    fn test_table_level_actions() {
        let mut blocked = query("B");
        blocked.action = TableAction::Block;
        blocked.variables.clear();
        let mut direct = query("R");
        direct.action = TableAction::Route;
        direct.endpoints = vec!["X".into(), "Y".into()];
        direct.weights = vec![60, 40];
        let snapshot = RoutingSnapshot::build(vec![blocked, direct], vec![], 1);
        assert_eq!(snapshot.step("B", "anything").unwrap(), Decision::Block);
        assert_eq!(
            snapshot.step("R", "").unwrap(),
            Decision::Route {
                endpoints: vec!["X".into(), "Y".into()],
                weights: vec![60, 40],
            }
        );
        assert!(matches!(
            snapshot.step("missing", ""),
            Err(RoutingError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_jumps_are_followed() {
        let snapshot = RoutingSnapshot::build(
            vec![query("T1"), query("T2")],
            vec![
                record("T1", MatchKind::Em, "", RecordAction::Jumps, &["T2"]),
                record("T2", MatchKind::Lpm, "44", RecordAction::Route, &["uk"]),
            ],
            1,
        );
        let resolution = snapshot.resolve("T1", "4420").unwrap();
        assert_eq!(resolution.decision, route("uk"));
        assert_eq!(resolution.path, vec!["T1".to_string(), "T2".to_string()]);
        assert_eq!(
            snapshot.step("T1", "4420").unwrap(),
            Decision::Jump { table: "T2".into() }
        );
    }

    #[test]
    fn test_jump_cycle_fails_closed() {
        let snapshot = RoutingSnapshot::build(
            vec![query("A"), query("B")],
            vec![
                record("A", MatchKind::Em, "", RecordAction::Jumps, &["B"]),
                record("B", MatchKind::Em, "", RecordAction::Jumps, &["A"]),
            ],
            1,
        );
        let resolution = snapshot.resolve("A", "1").unwrap();
        assert_eq!(resolution.decision, Decision::Block);
        assert_eq!(resolution.path.len(), MAX_JUMPS + 1);
    }

    #[test]
    fn test_resolve_call_reads_each_tables_variable() {
        let mut by_caller = query("callers");
        by_caller.variables = vec!["caller_id_number".into()];
        let snapshot = RoutingSnapshot::build(
            vec![query("entry"), by_caller],
            vec![
                record("entry", MatchKind::Lpm, "1800", RecordAction::Jumps, &["callers"]),
                record("callers", MatchKind::Em, "5551234", RecordAction::Block, &[]),
                record("callers", MatchKind::Em, "", RecordAction::Route, &["tollfree"]),
            ],
            1,
        );
        let mut vars = HashMap::new();
        vars.insert("destination_number".to_string(), "18005550000".to_string());
        vars.insert("caller_id_number".to_string(), "5551234".to_string());
        assert_eq!(
            snapshot.resolve_call("entry", &vars).unwrap().decision,
            Decision::Block
        );
        vars.insert("caller_id_number".to_string(), "5550000".to_string());
        assert_eq!(
            snapshot.resolve_call("entry", &vars).unwrap().decision,
            route("tollfree")
        );
    }
}
