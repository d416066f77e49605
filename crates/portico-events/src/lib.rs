//! Portico Events - per-request access events
//!
//! One flat event per completed operation, pushed through a bounded
//! non-blocking channel into an access-log sink. Overflow drops the
//! event rather than stalling the request path; the access-pattern log
//! aggregates hits for hot-data reporting.

pub mod event;
pub mod patterns;
pub mod pipeline;
pub mod sink;

// Re-exports
pub use event::{Event, EventData};
pub use patterns::{AccessPatternLog, HotKey};
pub use pipeline::{EventPipeline, run_consumer};
pub use sink::{AccessLogSink, CsvSink, TracingSink};
