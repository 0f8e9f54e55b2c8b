//! sbcplane - control plane for a clustered session border controller
//!
//! - `registry`: named configuration entities with referential integrity
//! - `events` / `engine` / `firewall`: change propagation to every node and
//!   per-node reconciliation against the call engine
//! - `routing`: table resolution and gateway distribution
//! - `http_server` / `cli`: operator surfaces

pub mod cli;
pub mod config;
pub mod engine;
pub mod events;
pub mod firewall;
pub mod http_server;
pub mod observability;
pub mod registry;
pub mod routing;
pub mod store;
