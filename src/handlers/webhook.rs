//! Paystack event webhook. The body is authenticated with the account secret
//! before anything in it is trusted; money moves only through the same
//! guarded transitions the API uses, so redelivered events are harmless.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::paystack::verify_signature;
use crate::services::payouts::TransferOutcome;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Deserialize)]
pub struct PaystackEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl PaystackEvent {
    fn reference(&self) -> Option<&str> {
        self.data.get("reference").and_then(Value::as_str)
    }

    fn transfer_code(&self) -> Option<String> {
        self.data
            .get("transfer_code")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing webhook signature".to_string()))?;
    if !verify_signature(&state.webhook_secret, &body, signature) {
        tracing::warn!("Rejected Paystack webhook with a bad signature");
        return Err(AppError::Unauthorized("Invalid webhook signature".to_string()));
    }

    let event: PaystackEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;
    let Some(reference) = event.reference() else {
        tracing::warn!(event = %event.event, "Webhook without a reference");
        return Ok(Json(json!({ "status": "ignored" })));
    };
    tracing::info!(event = %event.event, reference, "Paystack webhook received");

    let outcome = match event.event.as_str() {
        "charge.success" => {
            return match state.services.transactions.verify(reference).await {
                Ok(tx) => Ok(Json(json!({ "status": "processed", "transaction_status": tx.status }))),
                Err(AppError::NotFound(_)) => {
                    tracing::warn!(reference, "Charge webhook for an unknown reference");
                    Ok(Json(json!({ "status": "ignored" })))
                }
                Err(e) => Err(e),
            };
        }
        "transfer.success" => TransferOutcome::Succeeded,
        "transfer.failed" => TransferOutcome::Failed,
        "transfer.reversed" => TransferOutcome::Reversed,
        other => {
            tracing::debug!(event = other, "Ignoring Paystack event");
            return Ok(Json(json!({ "status": "ignored" })));
        }
    };

    let settled = state
        .services
        .payouts
        .record_transfer_outcome(reference, outcome, event.transfer_code())
        .await?;
    let status = if settled.is_some() { "processed" } else { "ignored" };
    Ok(Json(json!({ "status": status })))
}
