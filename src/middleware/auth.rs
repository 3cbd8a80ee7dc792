//! Caller identity. Authentication happens upstream; the proxy forwards the
//! authenticated user in `x-user-id` and their role in `x-user-role`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::domain::Role;
use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    /// Admins pass every role check.
    pub fn require(&self, roles: &[Role]) -> Result<(), AppError> {
        if self.role == Role::Admin || roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "This action is not available to {} accounts",
                self.role
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require(&[Role::Admin])
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(&parts.headers, USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing caller identity".to_string()))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| AppError::Unauthorized("Invalid caller identity".to_string()))?;
        let role = header(&parts.headers, USER_ROLE_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing caller role".to_string()))?
            .parse::<Role>()
            .map_err(|e| AppError::Unauthorized(e.to_string()))?;
        Ok(Caller { user_id, role })
    }
}
