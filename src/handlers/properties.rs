use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::parse_status;
use crate::domain::{PropertyStatus, Role};
use crate::error::AppError;
use crate::middleware::auth::Caller;
use crate::services::properties::NewProperty;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PropertyQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<PropertyQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status = parse_status::<PropertyStatus>(query.status.as_deref())?;
    let properties = state
        .services
        .properties
        .list(status, query.limit, query.offset)
        .await?;
    Ok(Json(properties))
}

pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.properties.get(id).await?))
}

pub async fn create_property(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<NewProperty>,
) -> Result<impl IntoResponse, AppError> {
    caller.require(&[Role::Developer])?;
    let property = state.services.properties.create(caller.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(property)))
}
