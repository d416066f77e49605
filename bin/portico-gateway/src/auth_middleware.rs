//! Identity middleware
//!
//! Outermost layer of the S3 chain: verifies the SigV4 signature (or, in
//! test mode, admits anonymous requests as the synthetic tenant), checks
//! the key's capability for the classified operation, and injects the
//! resolved tenant into request extensions for everything downstream.

use crate::s3::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use portico_s3::{S3Request, s3_error_response};
use portico_tenant::Tenant;
use std::sync::Arc;
use tracing::debug;

/// Resolved identity for one request
#[derive(Clone)]
pub struct Identity {
    /// The tenant all downstream work is scoped to
    pub tenant: Tenant,
}

/// Paths that never require identity
fn skip_auth(path: &str) -> bool {
    path == "/metrics" || path == "/health" || path.starts_with("/health/") || path.starts_with("/auth/")
}

/// Identity injection middleware
pub async fn identity_layer(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if skip_auth(path) {
        return next.run(request).await;
    }

    let identity = if request.headers().contains_key(header::AUTHORIZATION) {
        let verified = match state.verifier.verify(&request) {
            Ok(verified) => verified,
            Err(e) => {
                debug!("authentication failed: {}", e);
                let status = StatusCode::from_u16(e.http_status_code())
                    .unwrap_or(StatusCode::FORBIDDEN);
                return s3_error_response(e.s3_error_code(), &e.to_string(), status);
            }
        };

        // Capability check against the classified operation.
        let parsed = S3Request::parse(request.method(), request.uri());
        match state.keys.get(&verified.key_id) {
            Ok(key) if key.allows(parsed.operation.action()) => {}
            Ok(_) => {
                return s3_error_response(
                    "AccessDenied",
                    "The access key does not permit this operation",
                    StatusCode::FORBIDDEN,
                );
            }
            Err(e) => {
                return s3_error_response(e.s3_error_code(), &e.to_string(), StatusCode::FORBIDDEN);
            }
        }

        match state.tenants.resolve(Some(&verified.tenant_id)) {
            Ok(tenant) => Identity { tenant },
            Err(_) => {
                return s3_error_response(
                    "AccessDenied",
                    "No tenant is associated with this access key",
                    StatusCode::FORBIDDEN,
                );
            }
        }
    } else {
        // Anonymous requests resolve only in test mode.
        match state.tenants.resolve(None) {
            Ok(tenant) => Identity { tenant },
            Err(_) => {
                return s3_error_response(
                    "AccessDenied",
                    "Anonymous access is not permitted",
                    StatusCode::FORBIDDEN,
                );
            }
        }
    };

    debug!(
        "request authenticated as tenant {}",
        identity.tenant.tenant_id
    );
    request.extensions_mut().insert(identity);
    next.run(request).await
}
