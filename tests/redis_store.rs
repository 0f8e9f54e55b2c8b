//! Shared Store Tests
//!
//! Runs the registry and queues against a live Redis server. The server's
//! current database is flushed before each test.
//!
//! These tests are marked `#[ignore]`. Run them with:
//! ```bash
//! SBCPLANE_REDIS_URL=redis://127.0.0.1:6379/15 \
//!     cargo test --test redis_store -- --ignored --test-threads=1
//! ```

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use sbcplane::observability::MetricsRegistry;
use sbcplane::registry::{EntityClass, Registry, RegistryError};
use sbcplane::store::{keys, RedisStore, Store, StoreError, WriteBatch};

// =============================================================================
// Test Utilities
// =============================================================================

fn redis_url() -> String {
    std::env::var("SBCPLANE_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".into())
}

fn fresh_store() -> Arc<RedisStore> {
    let url = redis_url();
    let client = redis::Client::open(url.as_str()).unwrap();
    let mut conn = client.get_connection().unwrap();
    redis::cmd("FLUSHDB").query::<()>(&mut conn).unwrap();
    Arc::new(RedisStore::open(&url).unwrap())
}

fn open_registry(store: &Arc<RedisStore>) -> Registry {
    let shared: Arc<dyn Store> = store.clone();
    Registry::open(shared, cluster(), Arc::new(MetricsRegistry::new())).unwrap()
}

// =============================================================================
// Store Contract
// =============================================================================

#[test]
#[ignore]
fn test_stale_watch_conflicts_and_writes_nothing() {
    let store = fresh_store();
    let mut first = WriteBatch::new();
    first.watch("k", 0).replace_set("k", BTreeSet::from(["a".to_string()]));
    store.commit(first).unwrap();
    let (_, version) = store.read_set("k").unwrap();
    assert!(version > 0);

    let mut stale = WriteBatch::new();
    stale
        .watch("k", 0)
        .replace_set("k", BTreeSet::from(["b".to_string()]))
        .push("q", "never");
    let err = store.commit(stale).unwrap_err();
    assert_eq!(err, StoreError::Conflict { key: "k".into() });
    assert_eq!(store.read_set("k").unwrap().0, BTreeSet::from(["a".to_string()]));
    assert_eq!(store.queue_len("q").unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_blocking_pop_follows_queue_order() {
    let store = fresh_store();
    store.push("q2", "second".into()).unwrap();
    store.push("q1", "first".into()).unwrap();
    let queues = vec!["q1".to_string(), "q2".to_string()];

    let popped = store.blocking_pop(&queues, Duration::from_secs(1)).await.unwrap();
    assert_eq!(popped, Some(("q1".to_string(), "first".to_string())));
    let popped = store.blocking_pop(&queues, Duration::from_secs(1)).await.unwrap();
    assert_eq!(popped, Some(("q2".to_string(), "second".to_string())));
    let popped = store.blocking_pop(&queues, Duration::from_secs(1)).await.unwrap();
    assert_eq!(popped, None);
}

// =============================================================================
// Registry Across Processes
// =============================================================================

#[test]
#[ignore]
fn test_second_registry_sees_committed_state() {
    let store = fresh_store();
    let writer = open_registry(&store);
    writer.create(netalias("public")).unwrap();
    writer.create(sipprofile("external", "public")).unwrap();

    let reader = open_registry(&Arc::new(RedisStore::open(&redis_url()).unwrap()));
    assert_eq!(
        reader.engaged_by(EntityClass::NetAlias, "public").unwrap(),
        vec!["sipprofile:external"]
    );
    assert!(matches!(
        reader.delete(EntityClass::NetAlias, "public"),
        Err(RegistryError::Engaged { .. })
    ));
    for node in MEMBERS {
        let queue = keys::event_queue(keys::CALL_ENGINE, "sipprofile", node);
        assert_eq!(store.queue_len(&queue).unwrap(), 1);
    }
}
