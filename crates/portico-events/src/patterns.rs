//! Access-pattern aggregation
//!
//! Hit counts per `(tenant, container, artifact)` fed by the event
//! consumer. Backs the hot-data listing in the admin API; downstream
//! recommendation tooling reads the same counters.

use crate::event::Event;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

/// Aggregated hits for one artifact
#[derive(Debug, Clone, Serialize)]
pub struct HotKey {
    /// Physical container name
    pub container: String,
    /// Artifact key
    pub artifact: String,
    /// Access count
    pub hits: u64,
    /// Most recent access
    pub last_access: DateTime<Utc>,
}

#[derive(Debug)]
struct Counter {
    hits: u64,
    last_access: DateTime<Utc>,
}

/// In-memory access-pattern log
pub struct AccessPatternLog {
    counts: RwLock<HashMap<(String, String, String), Counter>>,
}

impl Default for AccessPatternLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessPatternLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Fold one event into the counters
    pub fn record(&self, event: &Event) {
        let Some(artifact) = &event.artifact else {
            return;
        };
        let key = (
            event.tenant_id.clone(),
            event.container.clone(),
            artifact.clone(),
        );
        let mut counts = self.counts.write();
        let counter = counts.entry(key).or_insert(Counter {
            hits: 0,
            last_access: event.at,
        });
        counter.hits += 1;
        counter.last_access = event.at;
    }

    /// Most-accessed artifacts for a tenant, hottest first
    #[must_use]
    pub fn hot_keys(&self, tenant_id: &str, limit: usize) -> Vec<HotKey> {
        let counts = self.counts.read();
        let mut out: Vec<HotKey> = counts
            .iter()
            .filter(|((tenant, _, _), _)| tenant == tenant_id)
            .map(|((_, container, artifact), counter)| HotKey {
                container: container.clone(),
                artifact: artifact.clone(),
                hits: counter.hits,
                last_access: counter.last_access,
            })
            .collect();
        out.sort_by(|a, b| b.hits.cmp(&a.hits).then(a.artifact.cmp(&b.artifact)));
        out.truncate(limit);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventData;

    fn event(tenant: &str, artifact: &str) -> Event {
        Event::access(
            tenant,
            "GetObject",
            format!("{tenant}_docs"),
            Some(artifact.to_string()),
            EventData {
                method: "GET".to_string(),
                path: format!("/docs/{artifact}"),
                size: 1,
                header_count: 2,
                query_count: 0,
                status: 200,
            },
        )
    }

    #[test]
    fn test_hot_keys_rank_by_hits() {
        let log = AccessPatternLog::new();
        for _ in 0..5 {
            log.record(&event("acme", "hot.bin"));
        }
        log.record(&event("acme", "cold.bin"));

        let hot = log.hot_keys("acme", 10);
        assert_eq!(hot.len(), 2);
        assert_eq!(hot[0].artifact, "hot.bin");
        assert_eq!(hot[0].hits, 5);
    }

    #[test]
    fn test_tenants_are_isolated() {
        let log = AccessPatternLog::new();
        log.record(&event("acme", "a.bin"));
        log.record(&event("rival", "b.bin"));

        let acme = log.hot_keys("acme", 10);
        assert_eq!(acme.len(), 1);
        assert_eq!(acme[0].artifact, "a.bin");
    }

    #[test]
    fn test_limit_truncates() {
        let log = AccessPatternLog::new();
        for n in 0..20 {
            log.record(&event("acme", &format!("k{n}.bin")));
        }
        assert_eq!(log.hot_keys("acme", 5).len(), 5);
    }

    #[test]
    fn test_service_events_are_skipped() {
        let log = AccessPatternLog::new();
        let mut e = event("acme", "unused");
        e.artifact = None;
        log.record(&e);
        assert!(log.hot_keys("acme", 10).is_empty());
    }
}
