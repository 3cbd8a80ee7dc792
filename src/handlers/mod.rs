pub mod admin;
pub mod handovers;
pub mod inspections;
pub mod leads;
pub mod notifications;
pub mod promotions;
pub mod properties;
pub mod transactions;
pub mod wallet;
pub mod webhook;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use std::str::FromStr;

use crate::error::AppError;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health_response = state.health.check_all().await;

    let status_code = match health_response.status.as_str() {
        "healthy" | "degraded" => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health_response))
}

/// `?limit=&offset=` for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Optional free-text reason carried by cancel, withdraw and reject requests.
#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Parses an optional `?status=` filter, rejecting unknown values.
pub(crate) fn parse_status<T>(raw: Option<&str>) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|e| AppError::BadRequest(e.to_string())))
        .transpose()
}
