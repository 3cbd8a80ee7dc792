use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::domain::handover::HandoverRuleError;
use crate::domain::inspection::InspectionRuleError;
use crate::paystack::GatewayError;
use crate::ports::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Too many requests")]
    RateLimited,
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::DatabaseError(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(msg) => AppError::DatabaseError(msg),
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Conflict(msg) => AppError::Conflict(msg),
            RepositoryError::InsufficientFunds => {
                AppError::ValidationError("Insufficient wallet balance".to_string())
            }
        }
    }
}

impl From<InspectionRuleError> for AppError {
    fn from(err: InspectionRuleError) -> Self {
        match err {
            InspectionRuleError::NotPermitted(_) => AppError::Forbidden(err.to_string()),
            InspectionRuleError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            InspectionRuleError::NotYetDue | InspectionRuleError::SlotInPast => {
                AppError::ValidationError(err.to_string())
            }
        }
    }
}

impl From<HandoverRuleError> for AppError {
    fn from(err: HandoverRuleError) -> Self {
        match err {
            HandoverRuleError::NoDocuments => AppError::ValidationError(err.to_string()),
            HandoverRuleError::WrongStage(..) | HandoverRuleError::Closed(_) => {
                AppError::Conflict(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match self {
            AppError::DatabaseError(msg) | AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "request failed");
                "Internal server error".to_string()
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "request failed");
                "Internal server error".to_string()
            }
            AppError::Gateway(err) => {
                tracing::error!(error = %err, "payment gateway call failed");
                err.to_string()
            }
            AppError::BadRequest(msg)
            | AppError::ValidationError(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg,
            AppError::RateLimited => "Too many requests".to_string(),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_errors_map_to_http_kinds() {
        let not_found: AppError = RepositoryError::NotFound("wallet".into()).into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let funds: AppError = RepositoryError::InsufficientFunds.into();
        assert_eq!(funds.status_code(), StatusCode::BAD_REQUEST);

        let db: AppError = RepositoryError::Database("boom".into()).into();
        assert_eq!(db.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rule_errors_map_to_http_kinds() {
        let early: AppError = InspectionRuleError::NotYetDue.into();
        assert_eq!(early.status_code(), StatusCode::BAD_REQUEST);

        let role: AppError = InspectionRuleError::NotPermitted(crate::domain::Role::Creator).into();
        assert_eq!(role.status_code(), StatusCode::FORBIDDEN);

        let closed: AppError =
            HandoverRuleError::Closed(crate::domain::HandoverStatus::Completed).into();
        assert_eq!(closed.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let response = AppError::DatabaseError("password=hunter2".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
