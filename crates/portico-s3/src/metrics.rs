//! Gateway request metrics
//!
//! Per-operation counters with a hand-written plain-text exporter served
//! at `/metrics`.

use crate::request::S3Operation;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Per-operation counters
#[derive(Debug, Default)]
struct OperationMetrics {
    /// Total requests
    requests_total: AtomicU64,
    /// Successful requests (2xx)
    requests_success: AtomicU64,
    /// Client errors (4xx)
    requests_client_error: AtomicU64,
    /// Server errors (5xx)
    requests_server_error: AtomicU64,
    /// Latency sum in microseconds
    latency_sum_us: AtomicU64,
}

impl OperationMetrics {
    fn record(&self, status_code: u16, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if (200..300).contains(&status_code) {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else if (400..500).contains(&status_code) {
            self.requests_client_error.fetch_add(1, Ordering::Relaxed);
        } else if status_code >= 500 {
            self.requests_server_error.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
    }
}

/// Gateway metrics collector
#[derive(Debug)]
pub struct GatewayMetrics {
    /// Per-operation counters
    operations: RwLock<HashMap<S3Operation, OperationMetrics>>,
    /// All requests, including non-S3 routes
    requests_total: AtomicU64,
    /// All error responses (4xx/5xx)
    errors_total: AtomicU64,
    /// Requests rejected by the rate limiter
    rate_limited_total: AtomicU64,
    /// Events dropped by the pipeline (mirrored here for export)
    events_dropped_total: AtomicU64,
    /// Start time for uptime
    start_time: Instant,
}

impl GatewayMetrics {
    /// Create a new collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            events_dropped_total: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed request
    pub fn record_request(&self, operation: Option<S3Operation>, status_code: u16, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if status_code >= 400 {
            self.errors_total.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(op) = operation {
            let mut ops = self.operations.write();
            ops.entry(op)
                .or_insert_with(OperationMetrics::default)
                .record(status_code, latency_us);
        }
    }

    /// Count a rate-limited rejection
    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a dropped event
    pub fn record_event_dropped(&self) {
        self.events_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since startup
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export counters in plain text
    #[must_use]
    pub fn export_text(&self) -> String {
        let mut output = String::with_capacity(4 * 1024);

        writeln!(output, "portico_uptime_seconds {}", self.uptime_secs()).unwrap();
        writeln!(
            output,
            "portico_requests_total {}",
            self.requests_total.load(Ordering::Relaxed)
        )
        .unwrap();
        writeln!(
            output,
            "portico_errors_total {}",
            self.errors_total.load(Ordering::Relaxed)
        )
        .unwrap();
        writeln!(
            output,
            "portico_rate_limited_total {}",
            self.rate_limited_total.load(Ordering::Relaxed)
        )
        .unwrap();
        writeln!(
            output,
            "portico_events_dropped_total {}",
            self.events_dropped_total.load(Ordering::Relaxed)
        )
        .unwrap();

        let ops = self.operations.read();
        let mut sorted: Vec<_> = ops.iter().collect();
        sorted.sort_by_key(|(op, _)| op.as_str());
        for (op, metrics) in sorted {
            let name = op.as_str();
            writeln!(
                output,
                "portico_s3_requests_total{{operation=\"{}\",status=\"success\"}} {}",
                name,
                metrics.requests_success.load(Ordering::Relaxed)
            )
            .unwrap();
            writeln!(
                output,
                "portico_s3_requests_total{{operation=\"{}\",status=\"client_error\"}} {}",
                name,
                metrics.requests_client_error.load(Ordering::Relaxed)
            )
            .unwrap();
            writeln!(
                output,
                "portico_s3_requests_total{{operation=\"{}\",status=\"server_error\"}} {}",
                name,
                metrics.requests_server_error.load(Ordering::Relaxed)
            )
            .unwrap();
            writeln!(
                output,
                "portico_s3_request_duration_us_sum{{operation=\"{}\"}} {}",
                name,
                metrics.latency_sum_us.load(Ordering::Relaxed)
            )
            .unwrap();
        }

        output
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
static GATEWAY_METRICS: OnceLock<GatewayMetrics> = OnceLock::new();

/// Get the global metrics instance
pub fn gateway_metrics() -> &'static GatewayMetrics {
    GATEWAY_METRICS.get_or_init(GatewayMetrics::new)
}

/// RAII timer for one request
pub struct OperationTimer {
    operation: Option<S3Operation>,
    start: Instant,
}

impl OperationTimer {
    /// Start timing
    #[must_use]
    pub fn new(operation: Option<S3Operation>) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Record the final status
    pub fn complete(self, status_code: u16) {
        let latency_us = self.start.elapsed().as_micros() as u64;
        gateway_metrics().record_request(self.operation, status_code, latency_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_export() {
        let metrics = GatewayMetrics::new();
        metrics.record_request(Some(S3Operation::GetObject), 200, 1500);
        metrics.record_request(Some(S3Operation::GetObject), 404, 900);
        metrics.record_request(Some(S3Operation::PutObject), 500, 12_000);
        metrics.record_rate_limited();

        let output = metrics.export_text();
        assert!(output.contains("portico_requests_total 3"));
        assert!(output.contains("portico_errors_total 2"));
        assert!(output.contains("portico_rate_limited_total 1"));
        assert!(output.contains(
            "portico_s3_requests_total{operation=\"GetObject\",status=\"success\"} 1"
        ));
        assert!(output.contains(
            "portico_s3_requests_total{operation=\"PutObject\",status=\"server_error\"} 1"
        ));
    }

    #[test]
    fn test_non_s3_requests_count_globally_only() {
        let metrics = GatewayMetrics::new();
        metrics.record_request(None, 200, 100);
        let output = metrics.export_text();
        assert!(output.contains("portico_requests_total 1"));
        assert!(!output.contains("portico_s3_requests_total"));
    }
}
