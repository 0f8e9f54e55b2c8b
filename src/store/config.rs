//! Store backend selection

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{MemoryStore, RedisStore, Store, StoreResult};

/// Which store the process opens
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process keyspace; state lives and dies with the process
    #[default]
    Memory,
    /// Redis server shared by every cluster member
    Redis {
        #[serde(default = "default_redis_url")]
        url: String,
    },
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl StoreConfig {
    /// Whether other processes see the same keyspace
    pub fn is_shared(&self) -> bool {
        matches!(self, StoreConfig::Redis { .. })
    }

    pub fn open(&self) -> StoreResult<Arc<dyn Store>> {
        match self {
            StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreConfig::Redis { url } => Ok(Arc::new(RedisStore::open(url)?)),
        }
    }
}
