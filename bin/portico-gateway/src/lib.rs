//! Portico Gateway - S3 API gateway library surface
//!
//! The binary lives in `main.rs`; the router and handlers are exposed
//! here so integration tests can drive the full stack in-process.

pub mod admin;
pub mod auth_middleware;
pub mod health;
pub mod metrics_middleware;
pub mod multipart;
pub mod ratelimit_middleware;
pub mod router;
pub mod s3;
