//! Service configuration file

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::cluster::ClusterConfig;
use super::errors::{ConfigError, ConfigResult};
use crate::engine::EngineEndpoint;
use crate::firewall::FirewallConfig;
use crate::http_server::HttpServerConfig;
use crate::store::StoreConfig;

/// Process configuration, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// This node's identifier; must be a cluster member
    pub node_id: String,

    /// Initial cluster attributes. Ignored once the store holds its own copy.
    #[serde(default)]
    pub cluster: Option<ClusterConfig>,

    #[serde(default)]
    pub http: HttpServerConfig,

    /// Keyspace backend; `memory` unless a shared store is configured
    #[serde(default)]
    pub store: StoreConfig,

    /// Call-engine command sockets, one per reconciled node
    #[serde(default)]
    pub engines: Vec<EngineEndpoint>,

    #[serde(default)]
    pub firewall: FirewallConfig,

    /// Nodes whose queues this process drains (default: `node_id` only)
    #[serde(default)]
    pub reconcile_nodes: Vec<String>,

    /// Upper bound on one blocking queue pop
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,

    /// Pause after a reconciler fault before consuming again
    #[serde(default = "default_fault_backoff_secs")]
    pub fault_backoff_secs: u64,
}

fn default_queue_timeout_secs() -> u64 {
    5
}

fn default_fault_backoff_secs() -> u64 {
    5
}

impl ServiceConfig {
    /// Single-node configuration with defaults everywhere else
    pub fn standalone(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            cluster: None,
            http: HttpServerConfig::default(),
            store: StoreConfig::default(),
            engines: Vec::new(),
            firewall: FirewallConfig::default(),
            reconcile_nodes: Vec::new(),
            queue_timeout_secs: default_queue_timeout_secs(),
            fault_backoff_secs: default_fault_backoff_secs(),
        }
    }

    /// Read, parse and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Cluster attributes to seed the registry with
    pub fn cluster(&self) -> ClusterConfig {
        self.cluster
            .clone()
            .unwrap_or_else(|| ClusterConfig::standalone(self.node_id.clone()))
    }

    /// Nodes reconciled by this process
    pub fn reconciled_nodes(&self) -> Vec<String> {
        if self.reconcile_nodes.is_empty() {
            vec![self.node_id.clone()]
        } else {
            self.reconcile_nodes.clone()
        }
    }

    pub fn engine_for(&self, nodeid: &str) -> Option<&EngineEndpoint> {
        self.engines.iter().find(|e| e.nodeid == nodeid)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    pub fn fault_backoff(&self) -> Duration {
        Duration::from_secs(self.fault_backoff_secs)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.node_id.is_empty() || self.node_id.contains(':') {
            return Err(ConfigError::invalid("node_id must be non-empty and free of ':'"));
        }
        let cluster = self.cluster();
        cluster.validate()?;
        if !cluster.is_member(&self.node_id) {
            return Err(ConfigError::invalid(format!(
                "node_id '{}' is not a cluster member",
                self.node_id
            )));
        }
        for node in &self.reconcile_nodes {
            if !cluster.is_member(node) {
                return Err(ConfigError::invalid(format!(
                    "reconcile node '{}' is not a cluster member",
                    node
                )));
            }
        }
        if !self.store.is_shared() {
            // other members only see a shared store, so their queues would never drain
            let reconciled = self.reconciled_nodes();
            if let Some(member) = cluster.members.iter().find(|m| !reconciled.contains(m)) {
                return Err(ConfigError::invalid(format!(
                    "member '{}' is not reconciled by this process and the memory store is not shared",
                    member
                )));
            }
        }
        if let StoreConfig::Redis { url } = &self.store {
            if url.trim().is_empty() {
                return Err(ConfigError::invalid("store.url must not be empty"));
            }
        }
        let mut seen = BTreeSet::new();
        for engine in &self.engines {
            if !seen.insert(engine.nodeid.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate engine for node '{}'",
                    engine.nodeid
                )));
            }
        }
        if self.queue_timeout_secs == 0 {
            return Err(ConfigError::invalid("queue_timeout_secs must be positive"));
        }
        if self.firewall.enabled && self.firewall.apply_command.is_empty() {
            return Err(ConfigError::invalid("firewall.apply_command is empty"));
        }
        Ok(())
    }
}
