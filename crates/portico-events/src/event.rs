//! Access event record
//!
//! Deliberately flat: plain strings and numbers only, so events can
//! outlive the request and cross the channel without dragging tenant or
//! storage state along.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One recorded operation
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Event kind; currently always `"access"`
    pub event_type: &'static str,
    /// Physical container name, empty for service-level operations
    pub container: String,
    /// Artifact key, if the operation addressed one
    pub artifact: Option<String>,
    /// Operation name (e.g. `PutObject`)
    pub operation: String,
    /// Tenant that issued the request
    pub tenant_id: String,
    /// When the event was recorded
    pub at: DateTime<Utc>,
    /// Request details
    pub data: EventData,
}

/// Flat per-request details
#[derive(Debug, Clone, Serialize)]
pub struct EventData {
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Body size in bytes, when known
    pub size: u64,
    /// Number of request headers
    pub header_count: usize,
    /// Number of query parameters
    pub query_count: usize,
    /// Terminal response status
    pub status: u16,
}

impl Event {
    /// Build an access event
    #[must_use]
    pub fn access(
        tenant_id: impl Into<String>,
        operation: impl Into<String>,
        container: impl Into<String>,
        artifact: Option<String>,
        data: EventData,
    ) -> Self {
        Self {
            event_type: "access",
            container: container.into(),
            artifact,
            operation: operation.into(),
            tenant_id: tenant_id.into(),
            at: Utc::now(),
            data,
        }
    }
}
