use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::Role;
use crate::error::AppError;
use crate::middleware::auth::Caller;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub email: String,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<TransactionQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = state
        .services
        .transactions
        .list_transactions(caller.user_id, query.cursor.as_deref(), query.limit)
        .await?;
    Ok(Json(page))
}

pub async fn verify_transaction(
    State(state): State<AppState>,
    caller: Caller,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .services
        .transactions
        .verify_as(caller.user_id, caller.role, &reference)
        .await?;
    Ok(Json(tx))
}

pub async fn purchase_property(
    State(state): State<AppState>,
    caller: Caller,
    Path(property_id): Path<Uuid>,
    Json(payload): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    caller.require(&[Role::Buyer])?;
    let session = state
        .services
        .transactions
        .initiate_purchase(caller.user_id, property_id, &payload.email)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}
