//! In-process store
//!
//! A single mutex guards the whole keyspace, so a commit's version check and
//! its writes are one critical section. Queue pushes wake blocked poppers
//! through a `Notify`.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Hash, PopFuture, Store, StoreError, StoreResult, Version, WriteBatch, WriteOp};

#[derive(Debug, Clone)]
enum Entry {
    Hash(Hash),
    Set(BTreeSet<String>),
    Queue(VecDeque<String>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Hash(_) => "hash",
            Entry::Set(_) => "set",
            Entry::Queue(_) => "queue",
        }
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    versions: HashMap<String, Version>,
    clock: Version,
}

impl Keyspace {
    fn version(&self, key: &str) -> Version {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn push(&mut self, queue: &str, value: String) -> StoreResult<()> {
        match self
            .entries
            .entry(queue.to_string())
            .or_insert_with(|| Entry::Queue(VecDeque::new()))
        {
            Entry::Queue(items) => items.push_back(value),
            other => return Err(wrong_kind(queue, "queue", other)),
        }
        self.touch(queue);
        Ok(())
    }

    fn pop_first(&mut self, queues: &[String]) -> Option<(String, String)> {
        for queue in queues {
            let popped = match self.entries.get_mut(queue) {
                Some(Entry::Queue(items)) => items.pop_front(),
                _ => None,
            };
            if let Some(value) = popped {
                if matches!(self.entries.get(queue), Some(Entry::Queue(items)) if items.is_empty())
                {
                    self.entries.remove(queue);
                }
                self.touch(queue);
                return Some((queue.clone(), value));
            }
        }
        None
    }
}

fn wrong_kind(key: &str, expected: &str, found: &Entry) -> StoreError {
    StoreError::corrupt(
        key,
        format!("expected {} but key holds a {}", expected, found.kind()),
    )
}

/// In-memory [`Store`] implementation
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: Mutex<Keyspace>,
    arrivals: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Keyspace>> {
        self.keyspace
            .lock()
            .map_err(|_| StoreError::Unavailable("Lock poisoned".into()))
    }

    /// Whether any value is stored under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock()
            .map(|ks| ks.entries.contains_key(key))
            .unwrap_or(false)
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.lock().map(|ks| ks.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    fn read_hash(&self, key: &str) -> StoreResult<(Option<Hash>, Version)> {
        let ks = self.lock()?;
        let version = ks.version(key);
        match ks.entries.get(key) {
            None => Ok((None, version)),
            Some(Entry::Hash(fields)) => Ok((Some(fields.clone()), version)),
            Some(other) => Err(wrong_kind(key, "hash", other)),
        }
    }

    fn read_set(&self, key: &str) -> StoreResult<(BTreeSet<String>, Version)> {
        let ks = self.lock()?;
        let version = ks.version(key);
        match ks.entries.get(key) {
            None => Ok((BTreeSet::new(), version)),
            Some(Entry::Set(members)) => Ok((members.clone(), version)),
            Some(other) => Err(wrong_kind(key, "set", other)),
        }
    }

    fn version(&self, key: &str) -> StoreResult<Version> {
        Ok(self.lock()?.version(key))
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut pushed = false;
        {
            let mut ks = self.lock()?;
            for (key, expected) in batch.watched() {
                if ks.version(key) != *expected {
                    return Err(StoreError::Conflict { key: key.clone() });
                }
            }
            // type-check everything before the first write so a bad batch
            // leaves the keyspace untouched
            for op in batch.ops() {
                let expected = match op {
                    WriteOp::ReplaceHash { .. } => "hash",
                    WriteOp::ReplaceSet { .. } => "set",
                    WriteOp::Push { .. } => "queue",
                    WriteOp::Delete { .. } => continue,
                };
                if let Some(entry) = ks.entries.get(op.key()) {
                    if entry.kind() != expected {
                        return Err(wrong_kind(op.key(), expected, entry));
                    }
                }
            }
            for op in batch.ops() {
                match op {
                    WriteOp::ReplaceHash { key, fields } => {
                        ks.entries.insert(key.clone(), Entry::Hash(fields.clone()));
                        ks.touch(key);
                    }
                    WriteOp::ReplaceSet { key, members } => {
                        if members.is_empty() {
                            ks.entries.remove(key);
                        } else {
                            ks.entries.insert(key.clone(), Entry::Set(members.clone()));
                        }
                        ks.touch(key);
                    }
                    WriteOp::Delete { key } => {
                        ks.entries.remove(key);
                        ks.touch(key);
                    }
                    WriteOp::Push { queue, value } => {
                        ks.push(queue, value.clone())?;
                        pushed = true;
                    }
                }
            }
        }
        if pushed {
            self.arrivals.notify_waiters();
        }
        Ok(())
    }

    fn push(&self, queue: &str, value: String) -> StoreResult<()> {
        self.lock()?.push(queue, value)?;
        self.arrivals.notify_waiters();
        Ok(())
    }

    fn queue_len(&self, queue: &str) -> StoreResult<usize> {
        let ks = self.lock()?;
        match ks.entries.get(queue) {
            None => Ok(0),
            Some(Entry::Queue(items)) => Ok(items.len()),
            Some(other) => Err(wrong_kind(queue, "queue", other)),
        }
    }

    fn blocking_pop<'a>(&'a self, queues: &'a [String], timeout: Duration) -> PopFuture<'a> {
        Box::pin(async move {
            let deadline = Instant::now() + timeout;
            loop {
                // register interest before checking so a push between the
                // check and the await is not missed
                let notified = self.arrivals.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let popped = self.lock()?.pop_first(queues);
                if popped.is_some() {
                    return Ok(popped);
                }

                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    let popped = self.lock()?.pop_first(queues);
                    return Ok(popped);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn hash(pairs: &[(&str, &str)]) -> Hash {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_key_has_version_zero() {
        let store = MemoryStore::new();
        let (value, version) = store.read_hash("nope").unwrap();
        assert!(value.is_none());
        assert_eq!(version, 0);
    }

    #[test]
    fn test_commit_bumps_versions() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.replace_hash("h", hash(&[("a", "1")]));
        store.commit(batch).unwrap();

        let (value, v1) = store.read_hash("h").unwrap();
        assert_eq!(value.unwrap()["a"], "1");
        assert!(v1 > 0);

        let mut batch = WriteBatch::new();
        batch.watch("h", v1).delete("h");
        store.commit(batch).unwrap();
        let (value, v2) = store.read_hash("h").unwrap();
        assert!(value.is_none());
        assert!(v2 > v1);
    }

    #[test]
    fn test_stale_watch_conflicts_and_writes_nothing() {
        let store = MemoryStore::new();
        let (_, seen) = store.read_hash("gw").unwrap();

        let mut first = WriteBatch::new();
        first.watch("gw", seen).replace_hash("gw", hash(&[("desc", "first")]));
        let mut second = WriteBatch::new();
        second
            .watch("gw", seen)
            .replace_hash("gw", hash(&[("desc", "second")]))
            .replace_set("other", ["x".to_string()].into_iter().collect());

        store.commit(first).unwrap();
        let err = store.commit(second).unwrap_err();
        assert_eq!(err, StoreError::Conflict { key: "gw".into() });

        let (value, _) = store.read_hash("gw").unwrap();
        assert_eq!(value.unwrap()["desc"], "first");
        assert!(!store.contains_key("other"));
    }

    #[test]
    fn test_empty_set_is_removed() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.replace_set("s", ["a".to_string()].into_iter().collect());
        store.commit(batch).unwrap();
        assert!(store.contains_key("s"));

        let mut batch = WriteBatch::new();
        batch.replace_set("s", BTreeSet::new());
        store.commit(batch).unwrap();
        assert!(!store.contains_key("s"));
    }

    #[test]
    fn test_wrong_kind_is_corrupt() {
        let store = MemoryStore::new();
        store.push("q", "v".into()).unwrap();
        assert!(matches!(
            store.read_hash("q"),
            Err(StoreError::Corrupt { .. })
        ));

        let mut batch = WriteBatch::new();
        batch.replace_hash("fresh", Hash::new()).replace_set("q", BTreeSet::new());
        assert!(store.commit(batch).is_err());
        assert!(!store.contains_key("fresh"));
    }

    #[tokio::test]
    async fn test_pop_respects_queue_order() {
        let store = MemoryStore::new();
        store.push("b", "b1".into()).unwrap();
        store.push("a", "a1".into()).unwrap();
        let queues = vec!["a".to_string(), "b".to_string()];

        let first = store
            .blocking_pop(&queues, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(first, Some(("a".into(), "a1".into())));
        let second = store
            .blocking_pop(&queues, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(second, Some(("b".into(), "b1".into())));
        assert_eq!(store.queue_len("b").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pop_times_out_empty() {
        let store = MemoryStore::new();
        let queues = vec!["q".to_string()];
        let popped = store
            .blocking_pop(&queues, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let queues = vec!["q".to_string()];
                store.blocking_pop(&queues, Duration::from_secs(5)).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.push("q", "hello".into()).unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped, Some(("q".into(), "hello".into())));
    }
}
