//! Authentication extractor.
//!
//! With no `AUTH_SECRET` configured every request is accepted. Otherwise the
//! request must carry `Authorization: Bearer <secret>`.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Authenticated caller extracted from request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthUser {
    /// No secret is configured
    Anonymous,
    /// Presented the configured secret
    Bearer,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.auth_secret.as_deref() else {
            return Ok(AuthUser::Anonymous);
        };

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match auth_header {
            Some(header) => match header.strip_prefix("Bearer ") {
                Some(token) if token == secret => Ok(AuthUser::Bearer),
                Some("") => Err(AppError::Unauthorized("Empty bearer token")),
                Some(_) => {
                    tracing::debug!("Rejected request with unknown bearer token");
                    Err(AppError::Unauthorized("Invalid bearer token"))
                }
                None => Err(AppError::Unauthorized("Invalid authorization header format")),
            },
            None => Err(AppError::Unauthorized("Missing authorization header")),
        }
    }
}
