//! Portico S3 - S3-compatible protocol front-end
//!
//! Request parsing and operation classification, the S3 XML request and
//! response shapes, error envelope rendering, and the gateway's request
//! counters.

pub mod error;
pub mod metrics;
pub mod request;
pub mod xml;

// Re-exports
pub use error::{error_response, s3_error_response};
pub use metrics::{GatewayMetrics, OperationTimer, gateway_metrics};
pub use request::{S3Operation, S3Request};
