use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use uuid::Uuid;

use crate::domain::Role;
use crate::error::AppError;
use crate::middleware::auth::Caller;
use crate::services::promotions::CreatePromotion;
use crate::AppState;

pub async fn create_promotion(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreatePromotion>,
) -> Result<impl IntoResponse, AppError> {
    caller.require(&[Role::Creator])?;
    let promotion = state.services.promotions.create(caller.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(promotion)))
}

pub async fn list_promotions(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    caller.require(&[Role::Creator])?;
    Ok(Json(state.services.promotions.list(caller.user_id).await?))
}

pub async fn get_promotion(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let promotion = state
        .services
        .promotions
        .get(id, caller.user_id, caller.role)
        .await?;
    Ok(Json(promotion))
}

pub async fn pause_promotion(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.promotions.pause(id, caller.user_id, caller.role).await?))
}

pub async fn resume_promotion(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.promotions.resume(id, caller.user_id, caller.role).await?))
}

pub async fn stop_promotion(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.promotions.stop(id, caller.user_id, caller.role).await?))
}

/// Tracking link: counts the click and sends the visitor to the listing.
pub async fn track_click(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Redirect, AppError> {
    let property_id = state.services.promotions.record_click(&code).await?;
    Ok(Redirect::temporary(&format!(
        "{}/properties/{}",
        state.site_url, property_id
    )))
}
