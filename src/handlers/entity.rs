//! Entity CRUD handlers: read one, read all, create, update, delete one, delete all.
//!
//! Authorization happens in the route layer (`security::enforce`) before these run.

use crate::error::AppError;
use crate::service::ListParams;
use crate::state::CrudState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
pub struct ReadOneParams {
    pub relationships: Option<String>,
}

pub async fn read_one(
    State(state): State<CrudState>,
    Path(item_id): Path<String>,
    Query(params): Query<ReadOneParams>,
) -> Result<Json<Value>, AppError> {
    let out = state
        .engine
        .read_one(&item_id, params.relationships.as_deref())
        .await?;
    Ok(Json(out))
}

pub async fn read_all(
    State(state): State<CrudState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.engine.read_all(&params).await?))
}

pub async fn create_one(
    State(state): State<CrudState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.engine.create_one(body).await?))
}

pub async fn update_one(
    State(state): State<CrudState>,
    Path(item_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.engine.update_one(&item_id, body).await?))
}

pub async fn delete_one(
    State(state): State<CrudState>,
    Path(item_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.engine.delete_one(&item_id).await?))
}

pub async fn delete_all(
    State(state): State<CrudState>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.engine.delete_all().await?))
}
