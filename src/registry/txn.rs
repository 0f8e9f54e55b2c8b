//! Optimistic working set
//!
//! Every key read through the working set is watched at the version it was
//! read at. Writes are staged and visible to later reads of the same
//! working set, so cascades see their own effects. Nothing reaches the store
//! until the finished batch is committed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::entity::EntityClass;
use super::errors::RegistryResult;
use super::record::Entity;
use crate::store::{keys, Hash, Store, WriteBatch};

pub(crate) struct WorkingSet<'a> {
    store: &'a dyn Store,
    hashes: HashMap<String, Option<Hash>>,
    sets: HashMap<String, BTreeSet<String>>,
    staged_hashes: BTreeMap<String, Option<Hash>>,
    staged_sets: BTreeSet<String>,
    pushes: Vec<(String, String)>,
    watched: WriteBatch,
    routing_changed: bool,
}

impl<'a> WorkingSet<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            hashes: HashMap::new(),
            sets: HashMap::new(),
            staged_hashes: BTreeMap::new(),
            staged_sets: BTreeSet::new(),
            pushes: Vec::new(),
            watched: WriteBatch::new(),
            routing_changed: false,
        }
    }

    pub fn hash(&mut self, key: &str) -> RegistryResult<Option<Hash>> {
        if let Some(cached) = self.hashes.get(key) {
            return Ok(cached.clone());
        }
        let (value, version) = self.store.read_hash(key)?;
        self.watched.watch(key, version);
        self.hashes.insert(key.to_string(), value.clone());
        Ok(value)
    }

    pub fn set(&mut self, key: &str) -> RegistryResult<BTreeSet<String>> {
        if let Some(cached) = self.sets.get(key) {
            return Ok(cached.clone());
        }
        let (members, version) = self.store.read_set(key)?;
        self.watched.watch(key, version);
        self.sets.insert(key.to_string(), members.clone());
        Ok(members)
    }

    pub fn put_hash(&mut self, key: &str, fields: Hash) {
        self.hashes.insert(key.to_string(), Some(fields.clone()));
        self.staged_hashes.insert(key.to_string(), Some(fields));
    }

    pub fn delete_hash(&mut self, key: &str) -> RegistryResult<()> {
        if self.hash(key)?.is_some() {
            self.hashes.insert(key.to_string(), None);
            self.staged_hashes.insert(key.to_string(), None);
        }
        Ok(())
    }

    pub fn replace_set(&mut self, key: &str, members: BTreeSet<String>) -> RegistryResult<()> {
        if self.set(key)? != members {
            self.sets.insert(key.to_string(), members);
            self.staged_sets.insert(key.to_string());
        }
        Ok(())
    }

    pub fn set_insert(&mut self, key: &str, member: &str) -> RegistryResult<()> {
        let mut members = self.set(key)?;
        if members.insert(member.to_string()) {
            self.replace_set(key, members)?;
        }
        Ok(())
    }

    pub fn set_remove(&mut self, key: &str, member: &str) -> RegistryResult<()> {
        let mut members = self.set(key)?;
        if members.remove(member) {
            self.replace_set(key, members)?;
        }
        Ok(())
    }

    pub fn entity(&mut self, class: EntityClass, id: &str) -> RegistryResult<Option<Entity>> {
        let key = class.record_key(id);
        match self.hash(&key)? {
            Some(fields) => Ok(Some(Entity::decode(class, &key, &fields)?)),
            None => Ok(None),
        }
    }

    pub fn put_entity(&mut self, entity: &Entity) -> RegistryResult<()> {
        let key = entity.record_key();
        let fields = entity.encode(&key)?;
        self.put_hash(&key, fields);
        if entity.class().affects_routing() {
            self.routing_changed = true;
        }
        Ok(())
    }

    pub fn mark_routing_changed(&mut self) {
        self.routing_changed = true;
    }

    pub fn push(&mut self, queue: String, payload: String) {
        self.pushes.push((queue, payload));
    }

    pub fn pushed(&self) -> usize {
        self.pushes.len()
    }

    /// Finish the working set as one guarded batch.
    ///
    /// A routing change also rewrites the generation marker, unwatched, so
    /// cached resolvers notice it.
    pub fn into_batch(self, stamp: &str) -> WriteBatch {
        let mut batch = self.watched;
        for (key, value) in self.staged_hashes {
            match value {
                Some(fields) => batch.replace_hash(key, fields),
                None => batch.delete(key),
            };
        }
        for key in self.staged_sets {
            let members = self.sets.get(&key).cloned().unwrap_or_default();
            batch.replace_set(key, members);
        }
        if self.routing_changed {
            let mut marker = Hash::new();
            marker.insert("stamp".to_string(), stamp.to_string());
            batch.replace_hash(keys::ROUTING_GENERATION, marker);
        }
        for (queue, payload) in self.pushes {
            batch.push(queue, payload);
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, WriteOp};

    #[test]
    fn test_reads_are_watched_and_cached() {
        let store = MemoryStore::new();
        let mut ws = WorkingSet::new(&store);
        assert!(ws.hash("a").unwrap().is_none());
        ws.put_hash("a", Hash::new());
        assert!(ws.hash("a").unwrap().is_some());
        let batch = ws.into_batch("s");
        assert_eq!(batch.watched().get("a"), Some(&0));
    }

    #[test]
    fn test_unchanged_sets_are_not_written() {
        let store = MemoryStore::new();
        let mut ws = WorkingSet::new(&store);
        ws.set_remove("s", "ghost").unwrap();
        ws.set_insert("t", "x").unwrap();
        let batch = ws.into_batch("s");
        let order: Vec<&str> = batch.ops().iter().map(WriteOp::key).collect();
        assert_eq!(order, vec!["t"]);
    }

    #[test]
    fn test_routing_marker_and_pushes_come_last() {
        let store = MemoryStore::new();
        let mut ws = WorkingSet::new(&store);
        ws.push("q".into(), "payload".into());
        ws.mark_routing_changed();
        ws.put_hash("h", Hash::new());
        let batch = ws.into_batch("stamp-1");
        let order: Vec<&str> = batch.ops().iter().map(WriteOp::key).collect();
        assert_eq!(order, vec!["h", keys::ROUTING_GENERATION, "q"]);
        assert!(!batch.watched().contains_key(keys::ROUTING_GENERATION));
    }
}
