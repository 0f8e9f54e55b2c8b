//! Cluster HTTP Routes
//!
//! Endpoints for cluster attributes and operator re-sync.

use axum::{extract::State, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::errors::ApiResult;
use super::server::AppState;
use crate::config::{ClusterConfig, ClusterSnapshot};

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    pub version: u64,
    pub config: ClusterConfig,
}

impl From<ClusterSnapshot> for ClusterResponse {
    fn from(snapshot: ClusterSnapshot) -> Self {
        Self {
            version: snapshot.version,
            config: snapshot.config.as_ref().clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResyncRequest {
    /// Nodes to re-sync; every member when absent
    #[serde(default)]
    pub nodes: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ResyncResponse {
    pub events: usize,
}

// ==================
// Router
// ==================

/// Create cluster routes
pub fn cluster_routes() -> Router<AppState> {
    Router::new()
        .route("/cluster", get(get_cluster_handler).put(update_cluster_handler))
        .route("/cluster/resync", post(resync_handler))
}

async fn get_cluster_handler(State(state): State<AppState>) -> Json<ClusterResponse> {
    Json(state.registry.cluster().into())
}

async fn update_cluster_handler(
    State(state): State<AppState>,
    Json(config): Json<ClusterConfig>,
) -> ApiResult<Json<ClusterResponse>> {
    let snapshot = state.registry.update_cluster(config)?;
    Ok(Json(snapshot.into()))
}

async fn resync_handler(
    State(state): State<AppState>,
    request: Option<Json<ResyncRequest>>,
) -> ApiResult<Json<ResyncResponse>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let events = state.registry.resync(request.nodes.as_deref())?;
    Ok(Json(ResyncResponse { events }))
}
