use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{parse_status, ReasonBody};
use crate::domain::TransactionStatus;
use crate::error::AppError;
use crate::middleware::auth::Caller;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct PayoutQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_payouts(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<PayoutQuery>,
) -> Result<impl IntoResponse, AppError> {
    caller.require_admin()?;
    let status = parse_status::<TransactionStatus>(query.status.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let payouts = state.services.payouts.list_payouts(status, limit, offset).await?;
    Ok(Json(payouts))
}

pub async fn approve_payout(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    caller.require_admin()?;
    Ok(Json(state.services.payouts.approve(id, caller.user_id).await?))
}

pub async fn reject_payout(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonBody>>,
) -> Result<impl IntoResponse, AppError> {
    caller.require_admin()?;
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(state.services.payouts.reject(id, caller.user_id, reason).await?))
}

/// Runs the promotion expiry sweep now instead of waiting for the schedule.
pub async fn expire_promotions(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    caller.require_admin()?;
    let expired = state.services.promotions.expire_due().await?;
    Ok(Json(json!({ "expired": expired })))
}
