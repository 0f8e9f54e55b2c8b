//! Routing HTTP Routes
//!
//! `POST /libreapi/routing/resolve` walks the routing tables for a call. With
//! `value` the lookup uses that single value and stops at the decision;
//! with `variables` each visited table reads its own variable and a gateway
//! is picked for the chosen interconnection.

use std::collections::HashMap;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::errors::ApiResult;
use super::server::AppState;
use crate::routing::{plan_route, CallAttributes, Resolution, RoutePlan};

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub table: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub call: CallAttributes,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResolveResponse {
    Plan(RoutePlan),
    Resolution(Resolution),
}

/// Create routing routes
pub fn routing_routes() -> Router<AppState> {
    Router::new().route("/routing/resolve", post(resolve_handler))
}

async fn resolve_handler(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    if let Some(value) = &request.value {
        let resolution = state.resolver.resolve(&request.table, value)?;
        return Ok(Json(ResolveResponse::Resolution(resolution)));
    }
    let plan = plan_route(
        &state.resolver,
        &state.selector,
        &request.table,
        &request.variables,
        &request.call,
    )?;
    Ok(Json(ResolveResponse::Plan(plan)))
}
