//! Configuration
//!
//! `ServiceConfig` is the process configuration read from disk at startup.
//! `ClusterConfig` is the cluster-wide configuration; it is owned by the
//! registry through a versioned `ClusterHandle` and only changes through
//! `Registry::update_cluster`.

mod cluster;
mod errors;
mod service;

pub use cluster::{ClusterConfig, ClusterHandle, ClusterSnapshot, MAX_PREWAIT_COEFFICIENT};
pub use errors::{ConfigError, ConfigResult};
pub use service::ServiceConfig;
