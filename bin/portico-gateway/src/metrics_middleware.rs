//! Request logging, counters, and event emission
//!
//! Sits between identity injection and rate limiting. Classifies the
//! request, times the handler, records the counters, and emits exactly
//! one access event once the terminal status is known. Event emission is
//! non-blocking; a full pipeline drops the event and bumps a counter.

use crate::auth_middleware::Identity;
use crate::s3::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use portico_common::BucketName;
use portico_events::{Event, EventData};
use portico_s3::{S3Operation, S3Request, gateway_metrics};
use portico_tenant::TenantDirectory;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

fn is_s3_path(path: &str) -> bool {
    !(path == "/metrics"
        || path == "/health"
        || path.starts_with("/health/")
        || path.starts_with("/auth/")
        || path.starts_with("/api/"))
}

fn header_length(request: &Request<Body>) -> u64 {
    request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Request accounting middleware
pub async fn metrics_layer(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path().to_string();

    if path == "/metrics" || path == "/health" || path.starts_with("/health/") {
        return next.run(request).await;
    }

    let parsed = if is_s3_path(&path) {
        Some(S3Request::parse(&method, &uri))
    } else {
        None
    };
    let operation = parsed.as_ref().map(|p| p.operation);
    let identity = request.extensions().get::<Identity>().cloned();
    let request_bytes = header_length(&request);
    let header_count = request.headers().len();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_us = start.elapsed().as_micros() as u64;
    gateway_metrics().record_request(operation, status, latency_us);

    info!(
        method = %method,
        path = %path,
        status,
        latency_us,
        operation = operation.map_or("-", S3Operation::as_str),
        "request"
    );

    // One event per completed S3 operation, success or client-visible
    // failure.
    if let (Some(parsed), Some(identity)) = (parsed, identity) {
        let response_bytes = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let size = if method == http::Method::GET {
            response_bytes
        } else {
            request_bytes
        };

        let container = parsed.bucket.as_ref().map_or_else(String::new, |bucket| {
            TenantDirectory::namespace_container(
                &identity.tenant,
                &BucketName::new_unchecked(bucket),
            )
        });

        let event = Event::access(
            identity.tenant.tenant_id.to_string(),
            parsed.operation.as_str(),
            container,
            parsed.object.clone(),
            EventData {
                method: method.to_string(),
                path,
                size,
                header_count,
                query_count: parsed.query.len(),
                status,
            },
        );
        if !state.events.emit(event) {
            gateway_metrics().record_event_dropped();
        }
    }

    response
}
