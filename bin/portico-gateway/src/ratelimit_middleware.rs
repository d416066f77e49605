//! Rate-limit middleware
//!
//! Applies only to S3 routes, after identity resolution: one token per
//! request from the tenant's bucket. Denials return 429 without reaching
//! the handler; every response carries the X-RateLimit-* headers.

use crate::auth_middleware::Identity;
use crate::s3::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use portico_s3::gateway_metrics;
use portico_tenant::RateDecision;
use std::sync::Arc;

/// Whether the path is part of the S3 surface
fn is_s3_path(path: &str) -> bool {
    !(path == "/metrics"
        || path == "/health"
        || path.starts_with("/health/")
        || path.starts_with("/auth/")
        || path.starts_with("/api/"))
}

fn apply_headers(response: &mut Response, decision: &RateDecision) {
    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from_str(&decision.limit.to_string()).unwrap(),
    );
    headers.insert(
        "X-RateLimit-Remaining",
        HeaderValue::from_str(&decision.remaining.to_string()).unwrap(),
    );
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from_str(&decision.reset_secs.to_string()).unwrap(),
    );
}

/// Rate-limit middleware
pub async fn ratelimit_layer(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_s3_path(request.uri().path()) {
        return next.run(request).await;
    }

    // Identity is injected by the outer auth layer; a request without one
    // has already been rejected there.
    let Some(identity) = request.extensions().get::<Identity>().cloned() else {
        return next.run(request).await;
    };

    let decision = state.limiter.allow(
        &identity.tenant.tenant_id,
        identity.tenant.requests_per_second,
    );

    if !decision.allowed {
        gateway_metrics().record_rate_limited();
        let mut response = Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header("Content-Type", "text/plain")
            .body(Body::from("rate limit exceeded\n"))
            .unwrap();
        apply_headers(&mut response, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, &decision);
    response
}
