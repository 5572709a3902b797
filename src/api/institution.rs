//! Institution API handlers

use crate::api::{default_count, normalize_pagination, parse_leis};
use crate::domain::{
    DomainCreate, InstitutionFilter, InstitutionUpsert, SblTypeAssociationPatch,
};
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Comma-separated LEI filter
    pub leis: Option<String>,
    /// Exact registered-domain filter
    pub domain: Option<String>,
    /// Zero-based page
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_count")]
    pub count: i64,
}

/// Search institutions
pub async fn search(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse> {
    let leis = parse_leis(query.leis.as_deref());
    state
        .guard
        .require_search_association(&user, leis.as_deref(), query.domain.as_deref())?;

    let (page, count) = normalize_pagination(query.page, query.count);
    let institutions = state
        .institution_service
        .search(InstitutionFilter {
            leis,
            domain: query.domain,
            page,
            count,
        })
        .await?;
    Ok(Json(institutions))
}

/// Create or update an institution (admin only)
pub async fn upsert(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<InstitutionUpsert>,
) -> Result<impl IntoResponse> {
    state.guard.require_admin(&user)?;
    let institution = state.institution_service.upsert(payload, &user).await?;
    Ok(Json(institution))
}

/// Fetch a single institution with its relations
pub async fn get(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(lei): Path<String>,
) -> Result<impl IntoResponse> {
    let institution = state.institution_service.get(&lei).await?;
    Ok(Json(institution))
}

/// Institutions associated with the acting user
pub async fn associated(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let institutions = state.institution_service.associated(&user).await?;
    Ok(Json(institutions))
}

/// Replace the SBL type associations of an institution.
///
/// Only the `sbl` group is writable here; any other discriminator is a 422.
pub async fn update_types(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((lei, group)): Path<(String, String)>,
    Json(patch): Json<SblTypeAssociationPatch>,
) -> Result<impl IntoResponse> {
    if group != "sbl" {
        return Err(AppError::Validation(format!(
            "institution type group '{group}' does not support updates"
        )));
    }
    state.guard.require_lei_association(&user, &lei)?;

    let institution = state
        .institution_service
        .replace_sbl_types(&lei, &patch.sbl_institution_types, &user)
        .await?;
    Ok(Json(institution))
}

/// Register email domains under an institution
pub async fn add_domains(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(lei): Path<String>,
    Json(domains): Json<Vec<DomainCreate>>,
) -> Result<impl IntoResponse> {
    state.guard.require_lei_association(&user, &lei)?;

    let registered = state
        .institution_service
        .add_domains(&lei, domains, &user)
        .await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

/// Institution type lookup, by `sbl` or `hmda` group
pub async fn types(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(group): Path<String>,
) -> Result<impl IntoResponse> {
    let types = state.lookup_service.institution_types(&group).await?;
    Ok(Json(types))
}

/// Federal regulator lookup
pub async fn regulators(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> Result<impl IntoResponse> {
    let regulators = state.lookup_service.federal_regulators().await?;
    Ok(Json(regulators))
}

/// Address state lookup
pub async fn address_states(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> Result<impl IntoResponse> {
    let states = state.lookup_service.address_states().await?;
    Ok(Json(states))
}

#[derive(Debug, Deserialize)]
pub struct DomainAllowedQuery {
    pub domain: String,
}

/// Probe whether an email domain is allowed for registration
pub async fn domain_allowed(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Query(query): Query<DomainAllowedQuery>,
) -> Result<impl IntoResponse> {
    let allowed = state
        .institution_service
        .is_domain_allowed(&query.domain)
        .await?;
    Ok(Json(allowed))
}
