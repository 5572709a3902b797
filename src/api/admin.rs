//! Admin API handlers

use crate::middleware::AuthUser;
use crate::server::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

/// Echo the authenticated identity as this service sees it
pub async fn me(State(state): State<AppState>, AuthUser(user): AuthUser) -> impl IntoResponse {
    let is_admin = state.guard.is_admin(&user);
    Json(json!({
        "id": user.id,
        "name": user.name,
        "username": user.username,
        "email": user.email,
        "scopes": user.scopes,
        "institutions": user.institutions,
        "is_admin": is_admin,
    }))
}
