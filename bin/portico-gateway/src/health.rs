//! Health and metrics endpoints

use crate::s3::AppState;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use portico_health::AggregateStatus;
use portico_s3::gateway_metrics;
use serde_json::json;
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Aggregate health (GET /health)
///
/// 503 only when no backend is healthy; degraded still serves traffic.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let aggregate = state.health.aggregate();
    let (healthy, total) = state.health.counts();

    let body = json!({
        "status": aggregate.as_str(),
        "version": VERSION,
        "uptime": state.started_at.elapsed().as_secs(),
        "backends_healthy": healthy,
        "backends_total": total,
        "backends": state.health.all(),
    });

    let status = if aggregate == AggregateStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(body)).into_response()
}

/// Liveness (GET /health/live); 200 while the process runs
pub async fn health_live() -> impl IntoResponse {
    Json(json!({
        "status": "alive",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Readiness (GET /health/ready)
pub async fn health_ready(State(state): State<Arc<AppState>>) -> Response {
    let ready = state.health.is_ready();
    let body = json!({
        "ready": ready,
        "timestamp": Utc::now().to_rfc3339(),
        "memory_mb": resident_memory_mb(),
    });
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// Per-backend detail (GET /health/backends)
pub async fn health_backends(State(state): State<Arc<AppState>>) -> Response {
    let backends = state.health.all();
    let body: serde_json::Map<String, serde_json::Value> = backends
        .into_iter()
        .map(|(id, view)| {
            (
                id,
                json!({
                    "status": if view.healthy { "healthy" } else { "unhealthy" },
                    "score": view.score,
                    "latency_ms": view.latency_ms,
                    "last_check": view.last_check.to_rfc3339(),
                    "last_error": view.last_error,
                }),
            )
        })
        .collect();
    Json(serde_json::Value::Object(body)).into_response()
}

/// Plain-text counters (GET /metrics)
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    let mut output = gateway_metrics().export_text();
    output.push_str(&format!(
        "portico_rate_limiter_tracked {}\n",
        state.limiter.tracked()
    ));
    output.push_str(&format!(
        "portico_rate_limiter_resets_total {}\n",
        state.limiter.resets()
    ));
    output.push_str(&format!(
        "portico_multipart_uploads_in_flight {}\n",
        state.uploads.in_flight()
    ));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(output))
        .unwrap()
}

/// Resident set size in megabytes, best effort
fn resident_memory_mb() -> u64 {
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|s| {
            s.split_whitespace()
                .nth(1)
                .and_then(|pages| pages.parse::<u64>().ok())
        })
        .map_or(0, |pages| pages * 4096 / (1024 * 1024))
}
