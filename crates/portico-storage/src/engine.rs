//! Storage engine
//!
//! The engine owns the driver registry and a two-slot primary/backup
//! topology. All operations route to the primary; the backup slot is
//! reserved for read failover, which is not wired up yet. Driver errors
//! propagate unchanged.

use crate::driver::{ArtifactInfo, ByteStream, ContainerInfo, Driver, DriverError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Backend-agnostic storage facade
pub struct Engine {
    /// Registered drivers by id; written only during startup
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
    primary: RwLock<Option<String>>,
    backup: RwLock<Option<String>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an empty engine
    #[must_use]
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
            primary: RwLock::new(None),
            backup: RwLock::new(None),
        }
    }

    /// Register a driver; must happen before any I/O
    pub fn add_driver(&self, driver: Arc<dyn Driver>) {
        let id = driver.id().to_string();
        info!("registered storage driver: {}", id);
        self.drivers.write().insert(id, driver);
    }

    /// Select the primary driver
    pub fn set_primary(&self, id: &str) -> Result<(), DriverError> {
        if !self.drivers.read().contains_key(id) {
            return Err(DriverError::Other(format!("unknown driver: {id}")));
        }
        *self.primary.write() = Some(id.to_string());
        info!("primary storage driver: {}", id);
        Ok(())
    }

    /// Select the backup driver
    pub fn set_backup(&self, id: &str) -> Result<(), DriverError> {
        if !self.drivers.read().contains_key(id) {
            return Err(DriverError::Other(format!("unknown driver: {id}")));
        }
        *self.backup.write() = Some(id.to_string());
        info!("backup storage driver: {}", id);
        Ok(())
    }

    /// Id of the configured primary driver, if any
    #[must_use]
    pub fn primary_id(&self) -> Option<String> {
        self.primary.read().clone()
    }

    /// Id of the configured backup driver, if any
    #[must_use]
    pub fn backup_id(&self) -> Option<String> {
        self.backup.read().clone()
    }

    /// All registered drivers (health probing)
    #[must_use]
    pub fn drivers(&self) -> Vec<Arc<dyn Driver>> {
        self.drivers.read().values().cloned().collect()
    }

    fn primary_driver(&self) -> Result<Arc<dyn Driver>, DriverError> {
        let id = self
            .primary
            .read()
            .clone()
            .ok_or_else(|| DriverError::Unavailable("no primary backend configured".into()))?;
        self.drivers
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| DriverError::Unavailable(format!("primary backend missing: {id}")))
    }

    /// Fetch an artifact
    pub async fn get(&self, container: &str, key: &str) -> Result<ByteStream, DriverError> {
        self.primary_driver()?.get(container, key).await
    }

    /// Store an artifact; returns bytes written
    pub async fn put(
        &self,
        container: &str,
        key: &str,
        body: ByteStream,
    ) -> Result<u64, DriverError> {
        self.primary_driver()?.put(container, key, body).await
    }

    /// Remove an artifact
    pub async fn delete(&self, container: &str, key: &str) -> Result<(), DriverError> {
        self.primary_driver()?.delete(container, key).await
    }

    /// Artifact metadata
    pub async fn stat(&self, container: &str, key: &str) -> Result<ArtifactInfo, DriverError> {
        self.primary_driver()?.stat(container, key).await
    }

    /// List artifacts under a prefix
    pub async fn list(
        &self,
        container: &str,
        prefix: &str,
    ) -> Result<Vec<ArtifactInfo>, DriverError> {
        self.primary_driver()?.list(container, prefix).await
    }

    /// Create a container
    pub async fn create_container(&self, container: &str) -> Result<(), DriverError> {
        self.primary_driver()?.create_container(container).await
    }

    /// Remove an empty container
    pub async fn delete_container(&self, container: &str) -> Result<(), DriverError> {
        self.primary_driver()?.delete_container(container).await
    }

    /// Whether a container exists
    pub async fn container_exists(&self, container: &str) -> Result<bool, DriverError> {
        self.primary_driver()?.container_exists(container).await
    }

    /// List containers by prefix
    pub async fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerInfo>, DriverError> {
        self.primary_driver()?.list_containers(prefix).await
    }

    /// Probe the primary backend
    pub async fn health_probe(&self) -> Result<Duration, DriverError> {
        self.primary_driver()?.health_probe().await
    }
}
