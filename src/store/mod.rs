//! Store adapter
//!
//! Key-value boundary used by the registry, the resolver and the event
//! queues: hash-per-key records, set-valued indices, per-node FIFO queues
//! with a blocking pop, and an optimistic commit primitive.
//!
//! Every write or delete assigns the key a fresh version. A commit carries
//! the versions observed at read time and is applied only if none of them
//! moved; otherwise nothing is written and `StoreError::Conflict` is
//! returned.
//!
//! [`MemoryStore`] keeps the keyspace in-process; [`RedisStore`] keeps it in
//! a Redis server shared by the cluster.

pub mod codec;
mod config;
mod errors;
pub mod keys;
mod memory;
mod redis_store;

pub use config::StoreConfig;
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Field map stored under one key
pub type Hash = BTreeMap<String, String>;

/// Per-key version. A key that was never written has version 0.
pub type Version = u64;

/// Future returned by [`Store::blocking_pop`]: the queue name and the popped
/// value, or `None` when the timeout elapsed.
pub type PopFuture<'a> =
    Pin<Box<dyn Future<Output = StoreResult<Option<(String, String)>>> + Send + 'a>>;

/// One write inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Replace the whole hash at `key`
    ReplaceHash { key: String, fields: Hash },
    /// Replace the whole set at `key`
    ReplaceSet { key: String, members: BTreeSet<String> },
    /// Remove `key`
    Delete { key: String },
    /// Append to the tail of a queue
    Push { queue: String, value: String },
}

impl WriteOp {
    /// Key touched by this op
    pub fn key(&self) -> &str {
        match self {
            WriteOp::ReplaceHash { key, .. }
            | WriteOp::ReplaceSet { key, .. }
            | WriteOp::Delete { key } => key,
            WriteOp::Push { queue, .. } => queue,
        }
    }
}

/// All-or-nothing write with its optimistic read guard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    watched: BTreeMap<String, Version>,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard the commit on `key` still being at `version`.
    ///
    /// The first observed version wins if a key is watched twice.
    pub fn watch(&mut self, key: impl Into<String>, version: Version) -> &mut Self {
        self.watched.entry(key.into()).or_insert(version);
        self
    }

    pub fn replace_hash(&mut self, key: impl Into<String>, fields: Hash) -> &mut Self {
        self.ops.push(WriteOp::ReplaceHash {
            key: key.into(),
            fields,
        });
        self
    }

    pub fn replace_set(&mut self, key: impl Into<String>, members: BTreeSet<String>) -> &mut Self {
        self.ops.push(WriteOp::ReplaceSet {
            key: key.into(),
            members,
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    pub fn push(&mut self, queue: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Push {
            queue: queue.into(),
            value: value.into(),
        });
        self
    }

    pub fn watched(&self) -> &BTreeMap<String, Version> {
        &self.watched
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Key-value store boundary
pub trait Store: Send + Sync {
    /// Read a hash and its version
    fn read_hash(&self, key: &str) -> StoreResult<(Option<Hash>, Version)>;

    /// Read a set and its version; a missing set reads as empty
    fn read_set(&self, key: &str) -> StoreResult<(BTreeSet<String>, Version)>;

    /// Current version of a key
    fn version(&self, key: &str) -> StoreResult<Version>;

    /// Apply a batch atomically if every watched key is unchanged
    fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Append a value to a queue
    fn push(&self, queue: &str, value: String) -> StoreResult<()>;

    /// Number of pending values in a queue
    fn queue_len(&self, queue: &str) -> StoreResult<usize>;

    /// Pop the head of the first non-empty queue in `queues` order,
    /// waiting up to `timeout` for a value to arrive.
    fn blocking_pop<'a>(&'a self, queues: &'a [String], timeout: Duration) -> PopFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_first_watch_wins() {
        let mut batch = WriteBatch::new();
        batch.watch("a", 3).watch("a", 7);
        assert_eq!(batch.watched().get("a"), Some(&3));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_batch_preserves_op_order() {
        let mut batch = WriteBatch::new();
        batch.delete("x").push("q", "v").replace_hash("h", Hash::new());
        let keys: Vec<&str> = batch.ops().iter().map(|op| op.key()).collect();
        assert_eq!(keys, vec!["x", "q", "h"]);
    }
}
