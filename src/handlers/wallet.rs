use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::Caller;
use crate::services::payouts::WithdrawalRequest;
use crate::services::wallet::NewBankAccount;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: BigDecimal,
    pub email: String,
}

pub async fn get_wallet(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.wallet.get_wallet(caller.user_id).await?))
}

pub async fn setup_wallet(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<SetupRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.wallet.setup_wallet(caller.user_id, &payload.pin).await?))
}

pub async fn deposit(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<DepositRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .services
        .wallet
        .initialize_deposit(caller.user_id, &payload.email, payload.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn withdraw(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<WithdrawalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payout = state
        .services
        .payouts
        .request_withdrawal(caller.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(payout)))
}

pub async fn list_bank_accounts(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.services.wallet.list_bank_accounts(caller.user_id).await?))
}

pub async fn add_bank_account(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<NewBankAccount>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .services
        .wallet
        .add_bank_account(caller.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn delete_bank_account(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let promoted = state
        .services
        .wallet
        .delete_bank_account(caller.user_id, id)
        .await?;
    Ok(Json(json!({ "deleted": id, "promoted": promoted })))
}

pub async fn set_primary_bank_account(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .services
        .wallet
        .set_primary_bank_account(caller.user_id, id)
        .await?;
    Ok(Json(account))
}
