use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::Caller;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DocumentsRequest {
    pub documents: Vec<String>,
}

pub async fn get_handover(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.handovers.get(id, caller.user_id, caller.role).await?))
}

pub async fn upload_documents(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let handover = state
        .services
        .handovers
        .upload_documents(id, caller.user_id, caller.role, payload.documents)
        .await?;
    Ok(Json(handover))
}

pub async fn sign_handover(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.handovers.sign(id, caller.user_id, caller.role).await?))
}

pub async fn complete_handover(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.handovers.complete(id, caller.user_id, caller.role).await?))
}

pub async fn cancel_handover(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.handovers.cancel(id, caller.user_id, caller.role).await?))
}
