//! Backend health scoring
//!
//! Deterministic weighted score in `[0, 100]` combining latency, error
//! rate, uptime, and throughput. Weights:
//!
//! | factor      | weight | normalization                          |
//! |-------------|--------|----------------------------------------|
//! | latency     | 0.35   | `1 - min(latency_ms / 1000, 1)`        |
//! | error rate  | 0.30   | `1 - error_rate`                       |
//! | uptime      | 0.20   | healthy-check fraction                 |
//! | throughput  | 0.15   | `min(bytes_per_sec / 100 MiB, 1)`      |
//!
//! Callers treat the result as opaque; it feeds the health endpoints and
//! nothing else.

use std::time::Duration;

/// Throughput at or above which the factor saturates
const THROUGHPUT_TARGET_BPS: f64 = 100.0 * 1024.0 * 1024.0;

/// Latency at or above which the factor bottoms out
const LATENCY_CEILING_MS: f64 = 1000.0;

const WEIGHT_LATENCY: f64 = 0.35;
const WEIGHT_ERROR_RATE: f64 = 0.30;
const WEIGHT_UPTIME: f64 = 0.20;
const WEIGHT_THROUGHPUT: f64 = 0.15;

/// Inputs to the scorer
#[derive(Debug, Clone, Copy)]
pub struct HealthMetrics {
    /// Last observed probe latency
    pub latency: Duration,
    /// Fraction of failed operations, in `[0, 1]`
    pub error_rate: f64,
    /// Fraction of successful health checks, in `[0, 1]`
    pub uptime: f64,
    /// Observed throughput in bytes per second
    pub throughput_bps: f64,
}

/// Weighted health scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthScorer;

impl HealthScorer {
    /// Compute the score for the given metrics
    #[must_use]
    pub fn score(&self, metrics: &HealthMetrics) -> f64 {
        let latency_ms = metrics.latency.as_secs_f64() * 1000.0;
        let latency_factor = 1.0 - (latency_ms / LATENCY_CEILING_MS).min(1.0);
        let error_factor = 1.0 - metrics.error_rate.clamp(0.0, 1.0);
        let uptime_factor = metrics.uptime.clamp(0.0, 1.0);
        let throughput_factor = (metrics.throughput_bps / THROUGHPUT_TARGET_BPS).clamp(0.0, 1.0);

        let weighted = WEIGHT_LATENCY * latency_factor
            + WEIGHT_ERROR_RATE * error_factor
            + WEIGHT_UPTIME * uptime_factor
            + WEIGHT_THROUGHPUT * throughput_factor;

        (weighted * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(latency_ms: u64, error_rate: f64, uptime: f64, throughput_bps: f64) -> HealthMetrics {
        HealthMetrics {
            latency: Duration::from_millis(latency_ms),
            error_rate,
            uptime,
            throughput_bps,
        }
    }

    #[test]
    fn test_perfect_backend_scores_100() {
        let score = HealthScorer.score(&metrics(0, 0.0, 1.0, THROUGHPUT_TARGET_BPS));
        assert!((score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dead_backend_scores_0() {
        let score = HealthScorer.score(&metrics(5000, 1.0, 0.0, 0.0));
        assert!(score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_is_monotone_in_latency() {
        let fast = HealthScorer.score(&metrics(10, 0.1, 0.9, 0.0));
        let slow = HealthScorer.score(&metrics(800, 0.1, 0.9, 0.0));
        assert!(fast > slow);
    }

    #[test]
    fn test_score_is_monotone_in_error_rate() {
        let clean = HealthScorer.score(&metrics(50, 0.0, 1.0, 0.0));
        let flaky = HealthScorer.score(&metrics(50, 0.5, 1.0, 0.0));
        assert!(clean > flaky);
    }

    #[test]
    fn test_score_is_deterministic() {
        let m = metrics(120, 0.25, 0.8, 12.0 * 1024.0 * 1024.0);
        assert!((HealthScorer.score(&m) - HealthScorer.score(&m)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_out_of_range_inputs_are_clamped() {
        let score = HealthScorer.score(&metrics(0, -3.0, 7.0, f64::MAX));
        assert!((0.0..=100.0).contains(&score));
    }
}
