//! Bearer token extraction
//!
//! Handlers take an [`AuthUser`] argument to require authentication. The
//! extractor reads the `Authorization: Bearer` header and verifies the token
//! against the configured identity provider keys; requests without a valid
//! token are rejected with 401.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::domain::AuthenticatedUser;
use crate::error::AppError;
use crate::server::AppState;

/// Authenticated actor extracted from the bearer token
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?;

        let value = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("invalid authorization header".to_string()))?;

        let token = value.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("authorization header must use the Bearer scheme".to_string())
        })?;

        let user = state.jwt.verify(token)?;
        Ok(AuthUser(user))
    }
}
