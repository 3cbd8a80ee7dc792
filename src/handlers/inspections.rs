use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::ReasonBody;
use crate::domain::Role;
use crate::error::AppError;
use crate::middleware::auth::Caller;
use crate::services::inspections::{BookInspection, InspectionAction};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub slot_time: DateTime<Utc>,
}

pub async fn book_inspection(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<BookInspection>,
) -> Result<impl IntoResponse, AppError> {
    caller.require(&[Role::Buyer])?;
    let inspection = state.services.inspections.book(caller.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(inspection)))
}

pub async fn list_buyer_inspections(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    caller.require(&[Role::Buyer])?;
    Ok(Json(state.services.inspections.list_for_buyer(caller.user_id).await?))
}

pub async fn list_developer_inspections(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    caller.require(&[Role::Developer])?;
    Ok(Json(state.services.inspections.list_for_developer(caller.user_id).await?))
}

async fn act(
    state: &AppState,
    caller: Caller,
    id: Uuid,
    action: InspectionAction,
) -> Result<impl IntoResponse, AppError> {
    let inspection = state
        .services
        .inspections
        .act(id, caller.user_id, caller.role, action)
        .await?;
    Ok(Json(inspection))
}

pub async fn confirm_inspection(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    act(&state, caller, id, InspectionAction::Confirm).await
}

pub async fn complete_inspection(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    act(&state, caller, id, InspectionAction::Complete).await
}

pub async fn cancel_inspection(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonBody>>,
) -> Result<impl IntoResponse, AppError> {
    let reason = body.and_then(|Json(b)| b.reason);
    act(&state, caller, id, InspectionAction::Cancel { reason }).await
}

pub async fn withdraw_inspection(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonBody>>,
) -> Result<impl IntoResponse, AppError> {
    let reason = body.and_then(|Json(b)| b.reason);
    act(&state, caller, id, InspectionAction::Withdraw { reason }).await
}

pub async fn reschedule_inspection(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<RescheduleRequest>,
) -> Result<impl IntoResponse, AppError> {
    act(
        &state,
        caller,
        id,
        InspectionAction::Reschedule {
            slot_time: payload.slot_time,
        },
    )
    .await
}
