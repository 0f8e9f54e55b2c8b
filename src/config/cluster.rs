//! Cluster configuration
//!
//! Membership and capacity are held in an explicitly owned, versioned
//! object. Readers take an immutable snapshot; writers go through
//! [`ClusterHandle::replace`], which checks the version they read.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::errors::{ConfigError, ConfigResult};

/// Largest accepted per-member stagger, in seconds
pub const MAX_PREWAIT_COEFFICIENT: u64 = 300;

/// Cluster-wide attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name
    pub name: String,

    /// Member node ids; a node's position is its stagger index
    pub members: Vec<String>,

    #[serde(default = "default_rtp_start_port")]
    pub rtp_start_port: u16,

    #[serde(default = "default_rtp_end_port")]
    pub rtp_end_port: u16,

    /// 0 means unlimited
    #[serde(default)]
    pub max_calls_per_second: u32,

    /// 0 means unlimited
    #[serde(default)]
    pub max_concurrent_calls: u32,

    /// Seconds of delay per member index before a node acts on an event
    #[serde(default)]
    pub prewait_coefficient: u64,
}

fn default_rtp_start_port() -> u16 {
    10000
}

fn default_rtp_end_port() -> u16 {
    20000
}

impl ClusterConfig {
    /// Single-member cluster with default attributes
    pub fn standalone(nodeid: impl Into<String>) -> Self {
        Self {
            name: "default".to_string(),
            members: vec![nodeid.into()],
            rtp_start_port: default_rtp_start_port(),
            rtp_end_port: default_rtp_end_port(),
            max_calls_per_second: 0,
            max_concurrent_calls: 0,
            prewait_coefficient: 0,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("cluster name must not be empty"));
        }
        if self.members.is_empty() {
            return Err(ConfigError::invalid("cluster must have at least one member"));
        }
        let mut seen = HashSet::new();
        for member in &self.members {
            if member.is_empty() || member.contains(':') {
                return Err(ConfigError::invalid(format!(
                    "invalid member id '{}'",
                    member
                )));
            }
            if !seen.insert(member.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate member id '{}'",
                    member
                )));
            }
        }
        if self.rtp_start_port == 0 || self.rtp_start_port >= self.rtp_end_port {
            return Err(ConfigError::invalid(format!(
                "rtp port range {}-{} is empty",
                self.rtp_start_port, self.rtp_end_port
            )));
        }
        if self.prewait_coefficient > MAX_PREWAIT_COEFFICIENT {
            return Err(ConfigError::invalid(format!(
                "prewait_coefficient {} exceeds {}",
                self.prewait_coefficient, MAX_PREWAIT_COEFFICIENT
            )));
        }
        Ok(())
    }

    /// Position of `nodeid` in the member list
    pub fn member_index(&self, nodeid: &str) -> Option<usize> {
        self.members.iter().position(|m| m == nodeid)
    }

    pub fn is_member(&self, nodeid: &str) -> bool {
        self.member_index(nodeid).is_some()
    }

    /// Stagger delay in seconds for `nodeid`
    pub fn prewait_for(&self, nodeid: &str) -> u64 {
        self.member_index(nodeid)
            .map(|i| self.prewait_coefficient.saturating_mul(i as u64))
            .unwrap_or(0)
    }

    /// Call-engine global variables derived from the cluster attributes
    pub fn engine_variables(&self) -> Vec<String> {
        vec![
            format!("cluster_name={}", self.name),
            format!("rtp_start_port={}", self.rtp_start_port),
            format!("rtp_end_port={}", self.rtp_end_port),
            format!("max_calls_per_second={}", self.max_calls_per_second),
            format!("max_concurrent_calls={}", self.max_concurrent_calls),
        ]
    }
}

/// Immutable view of the cluster configuration at one version
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub config: Arc<ClusterConfig>,
    pub version: u64,
}

/// Owner of the live cluster configuration
#[derive(Debug)]
pub struct ClusterHandle {
    current: RwLock<ClusterSnapshot>,
}

impl ClusterHandle {
    pub fn new(config: ClusterConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(ClusterSnapshot {
                config: Arc::new(config),
                version: 1,
            }),
        })
    }

    /// Current configuration and its version
    pub fn snapshot(&self) -> ClusterSnapshot {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the configuration if it is still at `expected_version`.
    ///
    /// Returns the new version.
    pub fn replace(&self, expected_version: u64, config: ClusterConfig) -> ConfigResult<u64> {
        config.validate()?;
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.version != expected_version {
            return Err(ConfigError::StaleVersion {
                expected: expected_version,
                actual: guard.version,
            });
        }
        guard.version += 1;
        guard.config = Arc::new(config);
        Ok(guard.version)
    }
}
