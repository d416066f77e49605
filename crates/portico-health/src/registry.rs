//! Backend health registry
//!
//! Per-backend state behind a reader/writer lock. Probe loops and the
//! adapter push updates; the health endpoints read aggregate status and
//! readiness. State is process-scoped and resets on restart.

use crate::score::{HealthMetrics, HealthScorer};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Aggregate service status across backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateStatus {
    /// Every backend healthy
    Healthy,
    /// Some backends unhealthy
    Degraded,
    /// No backend healthy
    Unhealthy,
    /// No backends registered
    Unknown,
}

impl AggregateStatus {
    /// Status string used in health bodies
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

/// Published health state for one backend
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    /// Whether the last probe succeeded
    pub healthy: bool,
    /// Weighted score in `[0, 100]`
    pub score: f64,
    /// Last observed probe latency in milliseconds
    pub latency_ms: u64,
    /// Time of the last probe
    pub last_check: DateTime<Utc>,
    /// Message from the last failed probe or operation
    pub last_error: Option<String>,
}

/// Internal per-backend bookkeeping
struct BackendState {
    healthy: bool,
    latency: Duration,
    last_check: DateTime<Utc>,
    last_error: Option<String>,
    checks_total: u64,
    checks_healthy: u64,
    ops_total: u64,
    ops_failed: u64,
    bytes_moved: u64,
    registered_at: DateTime<Utc>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            healthy: false,
            latency: Duration::ZERO,
            last_check: Utc::now(),
            last_error: None,
            checks_total: 0,
            checks_healthy: 0,
            ops_total: 0,
            ops_failed: 0,
            bytes_moved: 0,
            registered_at: Utc::now(),
        }
    }

    fn metrics(&self) -> HealthMetrics {
        let error_rate = if self.ops_total == 0 {
            0.0
        } else {
            self.ops_failed as f64 / self.ops_total as f64
        };
        let uptime = if self.checks_total == 0 {
            0.0
        } else {
            self.checks_healthy as f64 / self.checks_total as f64
        };
        let elapsed = (Utc::now() - self.registered_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
            .max(1.0);
        HealthMetrics {
            latency: self.latency,
            error_rate,
            uptime,
            throughput_bps: self.bytes_moved as f64 / elapsed,
        }
    }

    fn view(&self, scorer: HealthScorer) -> BackendHealth {
        BackendHealth {
            healthy: self.healthy,
            score: scorer.score(&self.metrics()),
            latency_ms: self.latency.as_millis() as u64,
            last_check: self.last_check,
            last_error: self.last_error.clone(),
        }
    }
}

/// Registry of backend health state
pub struct HealthRegistry {
    backends: RwLock<HashMap<String, BackendState>>,
    scorer: HealthScorer,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
            scorer: HealthScorer,
        }
    }

    /// Register a backend; probes start reporting against it
    pub fn register(&self, backend_id: &str) {
        self.backends
            .write()
            .entry(backend_id.to_string())
            .or_insert_with(BackendState::new);
    }

    /// Record a probe outcome
    pub fn record_probe(&self, backend_id: &str, outcome: Result<Duration, String>) {
        let mut backends = self.backends.write();
        let state = backends
            .entry(backend_id.to_string())
            .or_insert_with(BackendState::new);

        state.checks_total += 1;
        state.last_check = Utc::now();
        match outcome {
            Ok(latency) => {
                state.healthy = true;
                state.checks_healthy += 1;
                state.latency = latency;
                state.last_error = None;
                debug!("backend {} probe ok ({:?})", backend_id, latency);
            }
            Err(message) => {
                state.healthy = false;
                warn!("backend {} probe failed: {}", backend_id, message);
                state.last_error = Some(message);
            }
        }
    }

    /// Record an operation outcome against a backend
    pub fn record_operation(&self, backend_id: &str, ok: bool, bytes: u64, error: Option<String>) {
        let mut backends = self.backends.write();
        let state = backends
            .entry(backend_id.to_string())
            .or_insert_with(BackendState::new);

        state.ops_total += 1;
        state.bytes_moved += bytes;
        if !ok {
            state.ops_failed += 1;
            if let Some(message) = error {
                state.last_error = Some(message);
            }
        }
    }

    /// Published view of one backend
    #[must_use]
    pub fn get(&self, backend_id: &str) -> Option<BackendHealth> {
        self.backends
            .read()
            .get(backend_id)
            .map(|s| s.view(self.scorer))
    }

    /// Published view of all backends
    #[must_use]
    pub fn all(&self) -> HashMap<String, BackendHealth> {
        self.backends
            .read()
            .iter()
            .map(|(id, s)| (id.clone(), s.view(self.scorer)))
            .collect()
    }

    /// Count of (healthy, total) backends
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        let backends = self.backends.read();
        let healthy = backends.values().filter(|s| s.healthy).count();
        (healthy, backends.len())
    }

    /// Aggregate status across all backends
    #[must_use]
    pub fn aggregate(&self) -> AggregateStatus {
        let (healthy, total) = self.counts();
        match (healthy, total) {
            (_, 0) => AggregateStatus::Unknown,
            (0, _) => AggregateStatus::Unhealthy,
            (h, t) if h == t => AggregateStatus::Healthy,
            _ => AggregateStatus::Degraded,
        }
    }

    /// Readiness: at least one healthy backend, or none registered yet
    /// (startup grace)
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let (healthy, total) = self.counts();
        total == 0 || healthy > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_is_unknown_but_ready() {
        let registry = HealthRegistry::new();
        assert_eq!(registry.aggregate(), AggregateStatus::Unknown);
        assert!(registry.is_ready());
    }

    #[test]
    fn test_aggregate_transitions() {
        let registry = HealthRegistry::new();
        registry.record_probe("lyve", Ok(Duration::from_millis(12)));
        registry.record_probe("quotaless", Err("connection refused".into()));
        assert_eq!(registry.aggregate(), AggregateStatus::Degraded);
        assert!(registry.is_ready());

        registry.record_probe("lyve", Err("connection refused".into()));
        assert_eq!(registry.aggregate(), AggregateStatus::Unhealthy);
        assert!(!registry.is_ready());

        registry.record_probe("lyve", Ok(Duration::from_millis(9)));
        registry.record_probe("quotaless", Ok(Duration::from_millis(30)));
        assert_eq!(registry.aggregate(), AggregateStatus::Healthy);
    }

    #[test]
    fn test_probe_failure_captures_error() {
        let registry = HealthRegistry::new();
        registry.record_probe("lyve", Err("dns failure".into()));
        let view = registry.get("lyve").unwrap();
        assert!(!view.healthy);
        assert_eq!(view.last_error.as_deref(), Some("dns failure"));

        registry.record_probe("lyve", Ok(Duration::from_millis(5)));
        let view = registry.get("lyve").unwrap();
        assert!(view.healthy);
        assert!(view.last_error.is_none());
    }

    #[test]
    fn test_operation_failures_lower_the_score() {
        let registry = HealthRegistry::new();
        registry.record_probe("lyve", Ok(Duration::from_millis(5)));
        let clean = registry.get("lyve").unwrap().score;

        for _ in 0..10 {
            registry.record_operation("lyve", false, 0, Some("io error".into()));
        }
        let degraded = registry.get("lyve").unwrap().score;
        assert!(degraded < clean);
    }

    #[test]
    fn test_registered_backend_starts_unhealthy() {
        let registry = HealthRegistry::new();
        registry.register("cold");
        assert_eq!(registry.aggregate(), AggregateStatus::Unhealthy);
        let view = registry.get("cold").unwrap();
        assert!(!view.healthy);
    }
}
