//! Portico Storage Engine - Pluggable storage backends
//!
//! This crate defines the backend-agnostic storage surface of the gateway:
//! the [`Driver`] trait exposing `get`/`put`/`delete`/`list` over
//! container/artifact pairs with streaming bodies, the concrete drivers
//! (local filesystem, remote S3-family, cloud drive), and the [`Engine`]
//! registry that routes all I/O to the configured primary backend.
//!
//! Drivers never see tenant identity; container names arrive already
//! namespaced.

pub mod clouddrive;
pub mod driver;
pub mod engine;
pub mod local;
pub mod s3family;

// Re-exports
pub use clouddrive::CloudDriveDriver;
pub use driver::{ArtifactInfo, ByteStream, ContainerInfo, Driver, DriverError};
pub use engine::Engine;
pub use local::LocalFsDriver;
pub use s3family::S3FamilyDriver;
