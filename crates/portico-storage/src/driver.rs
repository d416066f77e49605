//! Storage driver contract
//!
//! A driver exposes a uniform artifact API over one storage system. Bodies
//! are streamed in both directions; a driver must never make a partially
//! written artifact visible.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Lazy byte producer used for both request and response bodies
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Build a [`ByteStream`] from an in-memory buffer
#[must_use]
pub fn stream_from_bytes(bytes: Bytes) -> ByteStream {
    futures::stream::once(async move { Ok(bytes) }).boxed()
}

/// Collect a [`ByteStream`] into memory
///
/// Convenience for tests and small internal reads; request paths stream.
pub async fn collect_stream(mut stream: ByteStream) -> std::io::Result<Bytes> {
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buf))
}

/// Metadata for a stored artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    /// Key within the container
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
}

/// Metadata for a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Full (namespaced) container name
    pub name: String,
    /// Creation time
    pub created: DateTime<Utc>,
}

/// Errors surfaced by storage drivers
///
/// The kind set is deliberately small; the S3 adapter maps these onto the
/// wire error codes and everything it cannot classify becomes an internal
/// error.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("container not empty: {0}")]
    NotEmpty(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("driver error: {0}")]
    Other(String),
}

impl DriverError {
    /// Transient errors worth a single retry
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Classify a local filesystem error for the given target
    pub fn from_io(err: &std::io::Error, target: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(target.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::Permission(target.to_string()),
            _ => Self::Other(format!("{target}: {err}")),
        }
    }
}

/// Uniform storage operations over one backend
///
/// Container names arrive already tenant-namespaced; the driver treats them
/// as opaque. `put` must consume the stream to completion before the
/// artifact becomes visible (write-then-rename for the local driver, a
/// single atomic upload for remote ones).
#[async_trait]
pub trait Driver: Send + Sync {
    /// Backend identifier used in health reporting
    fn id(&self) -> &str;

    /// Fetch an artifact as a lazy byte stream
    async fn get(&self, container: &str, key: &str) -> Result<ByteStream, DriverError>;

    /// Store an artifact, consuming the stream; returns bytes written
    async fn put(&self, container: &str, key: &str, body: ByteStream) -> Result<u64, DriverError>;

    /// Remove an artifact
    async fn delete(&self, container: &str, key: &str) -> Result<(), DriverError>;

    /// Artifact metadata without the body
    async fn stat(&self, container: &str, key: &str) -> Result<ArtifactInfo, DriverError>;

    /// List artifacts under a prefix, in ascending key order
    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<ArtifactInfo>, DriverError>;

    /// Create a container
    async fn create_container(&self, container: &str) -> Result<(), DriverError>;

    /// Remove an empty container
    async fn delete_container(&self, container: &str) -> Result<(), DriverError>;

    /// Whether a container exists
    async fn container_exists(&self, container: &str) -> Result<bool, DriverError>;

    /// List containers whose names start with `prefix`
    async fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerInfo>, DriverError>;

    /// Cheap round-trip against the backend, returning observed latency
    async fn health_probe(&self) -> Result<Duration, DriverError>;
}
