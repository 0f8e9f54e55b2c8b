//! Registry HTTP Routes
//!
//! Create, read, update, delete and list for every entity class under
//! `/libreapi/{class}`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;

use super::errors::{ApiError, ApiResult};
use super::server::AppState;
use crate::registry::{Applied, Entity, EntityClass, Summary};

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub items: Vec<Summary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct EntityResponse {
    pub class: EntityClass,
    pub id: String,
    pub data: Value,
    pub engaged_by: Vec<String>,
}

/// Create registry routes
pub fn registry_routes() -> Router<AppState> {
    Router::new()
        .route("/:class", get(list_handler).post(create_handler))
        .route(
            "/:class/:id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
}

fn parse_class(class: &str) -> ApiResult<EntityClass> {
    class
        .parse()
        .map_err(|reason: String| ApiError::new(404, "SBC_UNKNOWN_CLASS", reason))
}

async fn list_handler(
    State(state): State<AppState>,
    Path(class): Path<String>,
) -> ApiResult<Json<ListResponse>> {
    let class = parse_class(&class)?;
    let items = state.registry.list(class)?;
    Ok(Json(ListResponse {
        total: items.len(),
        items,
    }))
}

async fn create_handler(
    State(state): State<AppState>,
    Path(class): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Applied>)> {
    let class = parse_class(&class)?;
    let entity = Entity::from_json(class, body)?;
    let applied = state.registry.create(entity)?;
    Ok((StatusCode::CREATED, Json(applied)))
}

async fn get_handler(
    State(state): State<AppState>,
    Path((class, id)): Path<(String, String)>,
) -> ApiResult<Json<EntityResponse>> {
    let class = parse_class(&class)?;
    let entity = state.registry.get(class, &id)?;
    let engaged_by = state.registry.engaged_by(class, &id)?;
    Ok(Json(EntityResponse {
        class,
        id,
        data: entity.to_json(),
        engaged_by,
    }))
}

async fn update_handler(
    State(state): State<AppState>,
    Path((class, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Applied>> {
    let class = parse_class(&class)?;
    let entity = Entity::from_json(class, body)?;
    Ok(Json(state.registry.update(class, &id, entity)?))
}

async fn delete_handler(
    State(state): State<AppState>,
    Path((class, id)): Path<(String, String)>,
) -> ApiResult<Json<Applied>> {
    let class = parse_class(&class)?;
    Ok(Json(state.registry.delete(class, &id)?))
}
