//! # HTTP Server Module
//!
//! Management API for the control plane. Handlers are thin: every request
//! maps onto one registry or resolver call and its error onto a status.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/libreapi/{class}` and `/libreapi/{class}/{id}` - Entity CRUD
//! - `/libreapi/routing/resolve` - Routing lookup
//! - `/libreapi/cluster` and `/libreapi/cluster/resync` - Cluster attributes
//! - `/observability/metrics` - Counters

pub mod cluster_routes;
pub mod config;
pub mod errors;
pub mod observability_routes;
pub mod registry_routes;
pub mod routing_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use errors::{ApiError, ApiResult, ErrorResponse};
pub use server::{AppState, HttpServer};
