//! Account and quota administration endpoints
//!
//! The narrow identity hook (`/auth/*`) and the quota/usage admin API.
//! The wider identity stack (OAuth/SAML/MFA, password flows) lives
//! outside the gateway; password-reset is acknowledged but not served
//! here.

use crate::s3::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portico_auth::constant_time_eq;
use portico_common::{Error, Plan, TenantId};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn error_status(err: &Error) -> StatusCode {
    StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub plan: Option<String>,
}

/// Register a tenant and mint its first API key (POST /auth/register)
///
/// The secret in the response is the only copy that will ever exist.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    let tenant_id = match TenantId::new(&request.tenant_id) {
        Ok(id) => id,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let plan = match request.plan.as_deref() {
        None => Plan::Free,
        Some(p) => match p.parse::<Plan>() {
            Ok(plan) => plan,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
        },
    };

    let tenant = match state.tenants.create(tenant_id.clone(), plan) {
        Ok(tenant) => tenant,
        Err(e) => return json_error(error_status(&e), &e.to_string()),
    };
    if let Err(e) = state
        .quotas
        .create_tenant(tenant_id.clone(), plan, tenant.storage_quota)
    {
        // Roll the registration back rather than leave a tenant with no
        // quota record.
        state.tenants.delete(&tenant_id).ok();
        return json_error(error_status(&e), &e.to_string());
    }
    let key = state.keys.create_key(tenant_id.clone());

    info!("registered tenant {} on plan {}", tenant_id, plan.as_str());
    (
        StatusCode::CREATED,
        Json(json!({
            "tenant_id": tenant_id.to_string(),
            "plan": plan.as_str(),
            "storage_quota": tenant.storage_quota,
            "requests_per_second": tenant.requests_per_second,
            "access_key_id": key.key_id,
            "secret_access_key": key.secret_key,
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Validate a key pair (POST /auth/login)
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let key = match state.keys.lookup_for_auth(&request.access_key_id) {
        Ok(key) => key,
        Err(_) => return json_error(StatusCode::FORBIDDEN, "invalid credentials"),
    };
    if !constant_time_eq(
        key.secret_key.as_bytes(),
        request.secret_access_key.as_bytes(),
    ) {
        return json_error(StatusCode::FORBIDDEN, "invalid credentials");
    }

    Json(json!({
        "tenant_id": key.tenant_id.to_string(),
        "access_key_id": key.key_id,
        "permissions": key.permissions,
    }))
    .into_response()
}

/// Password reset entry point (POST /auth/password-reset)
pub async fn password_reset() -> Response {
    json_error(
        StatusCode::NOT_IMPLEMENTED,
        "password flows are handled by the identity service",
    )
}

/// Password reset completion (POST /auth/password-reset/complete)
pub async fn password_reset_complete() -> Response {
    json_error(
        StatusCode::NOT_IMPLEMENTED,
        "password flows are handled by the identity service",
    )
}

/// All quota records (GET /api/v1/quota)
pub async fn list_quotas(State(state): State<Arc<AppState>>) -> Response {
    Json(state.quotas.list_quotas()).into_response()
}

/// One tenant's usage (GET /api/v1/quota/{tenant_id})
pub async fn get_quota(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Response {
    let tenant_id = TenantId::new_unchecked(tenant_id);
    match state.quotas.get_usage(&tenant_id) {
        Ok(usage) => Json(usage).into_response(),
        Err(e) => json_error(error_status(&e), &e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuotaRequest {
    pub limit_bytes: Option<u64>,
    pub tier: Option<String>,
}

/// Update limit or tier (PUT /api/v1/quota/{tenant_id})
pub async fn update_quota(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Json(request): Json<UpdateQuotaRequest>,
) -> Response {
    let tenant_id = TenantId::new_unchecked(tenant_id);

    if let Some(tier) = &request.tier {
        let plan = match tier.parse::<Plan>() {
            Ok(plan) => plan,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
        };
        if let Err(e) = state.quotas.update_tier(&tenant_id, plan) {
            return json_error(error_status(&e), &e.to_string());
        }
        state.tenants.update_plan(&tenant_id, plan).ok();
    }

    if let Some(limit) = request.limit_bytes {
        if let Err(e) = state.quotas.update_quota(&tenant_id, limit) {
            return json_error(error_status(&e), &e.to_string());
        }
    }

    match state.quotas.get_usage(&tenant_id) {
        Ok(usage) => Json(usage).into_response(),
        Err(e) => json_error(error_status(&e), &e.to_string()),
    }
}

/// Usage history (GET /api/v1/usage/{tenant_id})
pub async fn usage_history(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Response {
    let tenant_id = TenantId::new_unchecked(tenant_id);
    match state.quotas.get_usage_history(&tenant_id) {
        Ok(history) => Json(history).into_response(),
        Err(e) => json_error(error_status(&e), &e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct HotKeysParams {
    #[serde(default = "default_hot_limit")]
    pub limit: usize,
}

fn default_hot_limit() -> usize {
    20
}

/// Hottest artifacts by access count (GET /api/v1/usage/{tenant_id}/hot)
pub async fn hot_keys(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(params): Query<HotKeysParams>,
) -> Response {
    Json(state.patterns.hot_keys(&tenant_id, params.limit)).into_response()
}
