use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonschema::JSONSchema;
use serde_json::{json, Value};

use crate::validation::schemas::{SchemaRegistry, SCHEMAS};

#[derive(Debug, serde::Serialize)]
struct ValidationErrorResponse {
    error: String,
    details: Vec<ValidationDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ValidationDetail {
    field: String,
    message: String,
}

fn rejection(error: &str, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": error,
            "details": [{"field": "body", "message": message}]
        })),
    )
        .into_response()
}

/// Validate the request body against a JSON schema before it reaches the handler.
pub async fn validate_with_schema(
    select: fn(&SchemaRegistry) -> &JSONSchema,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let registry = match SCHEMAS.as_ref() {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error = %e, "Request schemas failed to compile");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error"})),
            )
                .into_response();
        }
    };

    let (parts, body) = request.into_parts();
    let bytes = match hyper::body::to_bytes(body).await {
        Ok(b) => b,
        Err(e) => return rejection("Failed to read request body", e.to_string()),
    };
    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => return rejection("Invalid JSON", e.to_string()),
    };

    if let Err(errors) = select(registry).validate(&payload) {
        let details: Vec<ValidationDetail> = errors
            .map(|e| ValidationDetail {
                field: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorResponse {
                error: "Payload validation failed".to_string(),
                details,
            }),
        )
            .into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn withdrawal(registry: &SchemaRegistry) -> &JSONSchema {
    &registry.withdrawal_v1
}

fn lead(registry: &SchemaRegistry) -> &JSONSchema {
    &registry.lead_v1
}

pub async fn validate_withdrawal(request: Request<Body>, next: Next<Body>) -> Response {
    validate_with_schema(withdrawal, request, next).await
}

pub async fn validate_lead(request: Request<Body>, next: Next<Body>) -> Response {
    validate_with_schema(lead, request, next).await
}
