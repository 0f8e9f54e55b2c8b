//! Redis-backed store
//!
//! Shared by every node of the cluster. Records are Redis hashes, indices
//! are Redis sets and queues are Redis lists. Versions live in one hash
//! (`store:versions`) fed by a counter (`store:clock`); a commit runs as a
//! single Lua script that checks the watched versions and applies the ops,
//! so the check and the writes cannot interleave with another commit.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use redis::{Client, Connection, RedisError, RedisResult, Script};
use serde_json::{json, Value};

use super::keys;
use super::{Hash, PopFuture, Store, StoreError, StoreResult, Version, WriteBatch, WriteOp};

const COMMIT_SCRIPT: &str = r#"
local versions, clock = KEYS[1], KEYS[2]
local watched = cjson.decode(ARGV[1])
local ops = cjson.decode(ARGV[2])
for _, w in ipairs(watched) do
  local current = tonumber(redis.call('HGET', versions, w[1]) or '0')
  if current ~= tonumber(w[2]) then
    return w[1]
  end
end
for _, op in ipairs(ops) do
  local kind, key = op[1], op[2]
  if kind == 'hash' then
    redis.call('DEL', key)
    if #op[3] > 0 then redis.call('HSET', key, unpack(op[3])) end
  elseif kind == 'set' then
    redis.call('DEL', key)
    if #op[3] > 0 then redis.call('SADD', key, unpack(op[3])) end
  elseif kind == 'del' then
    redis.call('DEL', key)
  elseif kind == 'push' then
    redis.call('RPUSH', key, op[3])
  end
  redis.call('HSET', versions, key, redis.call('INCR', clock))
end
return false
"#;

fn unavailable(err: RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Script arguments for a batch: watched versions and ops, both JSON
fn script_args(batch: &WriteBatch) -> (String, String) {
    let watched: Vec<Value> = batch
        .watched()
        .iter()
        .map(|(key, version)| json!([key, version]))
        .collect();
    let ops: Vec<Value> = batch
        .ops()
        .iter()
        .map(|op| match op {
            WriteOp::ReplaceHash { key, fields } => {
                let flat: Vec<&str> = fields
                    .iter()
                    .flat_map(|(f, v)| [f.as_str(), v.as_str()])
                    .collect();
                json!(["hash", key, flat])
            }
            WriteOp::ReplaceSet { key, members } => json!(["set", key, members]),
            WriteOp::Delete { key } => json!(["del", key]),
            WriteOp::Push { queue, value } => json!(["push", queue, value]),
        })
        .collect();
    (Value::Array(watched).to_string(), Value::Array(ops).to_string())
}

/// BLPOP timeout in whole seconds; 0 would block forever
fn pop_timeout_secs(timeout: Duration) -> u64 {
    timeout.as_secs_f64().ceil().max(1.0) as u64
}

/// [`Store`] over a Redis server shared by the cluster
pub struct RedisStore {
    client: Client,
    conn: Mutex<Option<Connection>>,
    commit: Script,
}

impl RedisStore {
    /// Create a store for `url`. No connection is made until first use.
    pub fn open(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(unavailable)?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            commit: Script::new(COMMIT_SCRIPT),
        })
    }

    /// Run `f` on the shared connection, reconnecting after a failure
    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> RedisResult<T>) -> StoreResult<T> {
        let mut slot = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("Lock poisoned".into()))?;
        if slot.is_none() {
            *slot = Some(self.client.get_connection().map_err(unavailable)?);
        }
        let result = match slot.as_mut() {
            Some(conn) => f(conn),
            None => return Err(StoreError::Unavailable("no connection".into())),
        };
        if result.is_err() {
            *slot = None;
        }
        result.map_err(unavailable)
    }
}

impl Store for RedisStore {
    fn read_hash(&self, key: &str) -> StoreResult<(Option<Hash>, Version)> {
        let (fields, version): (HashMap<String, String>, Option<Version>) =
            self.with_conn(|conn| {
                redis::pipe()
                    .atomic()
                    .cmd("HGETALL")
                    .arg(key)
                    .cmd("HGET")
                    .arg(keys::STORE_VERSIONS)
                    .arg(key)
                    .query(conn)
            })?;
        let hash = if fields.is_empty() {
            None
        } else {
            Some(fields.into_iter().collect())
        };
        Ok((hash, version.unwrap_or(0)))
    }

    fn read_set(&self, key: &str) -> StoreResult<(BTreeSet<String>, Version)> {
        let (members, version): (HashSet<String>, Option<Version>) = self.with_conn(|conn| {
            redis::pipe()
                .atomic()
                .cmd("SMEMBERS")
                .arg(key)
                .cmd("HGET")
                .arg(keys::STORE_VERSIONS)
                .arg(key)
                .query(conn)
        })?;
        Ok((members.into_iter().collect(), version.unwrap_or(0)))
    }

    fn version(&self, key: &str) -> StoreResult<Version> {
        let version: Option<Version> = self.with_conn(|conn| {
            redis::cmd("HGET")
                .arg(keys::STORE_VERSIONS)
                .arg(key)
                .query(conn)
        })?;
        Ok(version.unwrap_or(0))
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let (watched, ops) = script_args(&batch);
        let conflict: Option<String> = self.with_conn(|conn| {
            self.commit
                .key(keys::STORE_VERSIONS)
                .key(keys::STORE_CLOCK)
                .arg(&watched)
                .arg(&ops)
                .invoke(conn)
        })?;
        match conflict {
            Some(key) => Err(StoreError::Conflict { key }),
            None => Ok(()),
        }
    }

    fn push(&self, queue: &str, value: String) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.push(queue, value);
        self.commit(batch)
    }

    fn queue_len(&self, queue: &str) -> StoreResult<usize> {
        self.with_conn(|conn| redis::cmd("LLEN").arg(queue).query(conn))
    }

    fn blocking_pop<'a>(&'a self, queues: &'a [String], timeout: Duration) -> PopFuture<'a> {
        let client = self.client.clone();
        let queues = queues.to_vec();
        Box::pin(async move {
            let popped = tokio::task::spawn_blocking(
                move || -> RedisResult<Option<(String, String)>> {
                    let mut conn = client.get_connection()?;
                    redis::cmd("BLPOP")
                        .arg(&queues)
                        .arg(pop_timeout_secs(timeout))
                        .query(&mut conn)
                },
            )
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            popped.map_err(unavailable)
        })
    }
}
