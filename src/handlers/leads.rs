use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{LeadStatus, Role};
use crate::error::AppError;
use crate::middleware::auth::Caller;
use crate::services::leads::CreateLead;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateLeadRequest {
    pub status: String,
}

/// Public enquiry form. Signed-in buyers are linked to the lead.
pub async fn create_lead(
    State(state): State<AppState>,
    caller: Option<Caller>,
    Json(payload): Json<CreateLead>,
) -> Result<impl IntoResponse, AppError> {
    let buyer_id = caller.filter(|c| c.role == Role::Buyer).map(|c| c.user_id);
    let lead = state.services.leads.create_lead(buyer_id, payload).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn list_developer_leads(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    caller.require(&[Role::Developer])?;
    Ok(Json(state.services.leads.list_developer_leads(caller.user_id).await?))
}

pub async fn update_lead(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLeadRequest>,
) -> Result<impl IntoResponse, AppError> {
    caller.require(&[Role::Developer])?;
    let status = payload
        .status
        .parse::<LeadStatus>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let lead = state
        .services
        .leads
        .update_lead_status(id, caller.user_id, status)
        .await?;
    Ok(Json(lead))
}
