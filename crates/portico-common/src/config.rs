//! Configuration types for Portico
//!
//! Typed configuration for the gateway, loadable from TOML and overridable
//! from the command line.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Root configuration for the gateway
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Network configuration
    pub network: NetworkConfig,
    /// S3 API configuration
    pub s3: S3Config,
    /// Storage backend configuration
    pub storage: StorageConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Event pipeline configuration
    pub events: EventConfig,
    /// Backend health probing configuration
    pub health: HealthConfig,
    /// Test mode: anonymous requests resolve to a synthetic tenant.
    /// Never enable in production.
    pub test_mode: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            s3: S3Config::default(),
            storage: StorageConfig::default(),
            rate_limit: RateLimitConfig::default(),
            events: EventConfig::default(),
            health: HealthConfig::default(),
            test_mode: false,
        }
    }
}

/// Network configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Listen address for the S3 API
    pub listen: SocketAddr,
    /// Read timeout in seconds
    pub read_timeout_secs: u64,
    /// Write timeout in seconds
    pub write_timeout_secs: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9000".parse().unwrap(),
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            idle_timeout_secs: 120,
        }
    }
}

/// S3 API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Region name used in SigV4 credential scopes and responses
    pub region: String,
    /// Maximum single-part object size in bytes
    pub max_object_size: u64,
    /// Maximum allowed clock skew for signed requests, in minutes
    pub max_clock_skew_minutes: i64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            max_object_size: 5 * 1024 * 1024 * 1024, // 5 GB
            max_clock_skew_minutes: 15,
        }
    }
}

/// Storage backend configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend serving all reads and writes
    pub primary: String,
    /// Backend reserved for future read failover
    pub backup: Option<String>,
    /// Configured backends
    pub backends: Vec<BackendConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            primary: "local".to_string(),
            backup: None,
            backends: vec![BackendConfig::default()],
        }
    }
}

/// Configuration for a single storage backend
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend identifier (referenced by `primary`/`backup`)
    pub id: String,
    /// Backend kind
    pub kind: BackendKind,
    /// Root directory (local backend)
    pub root: Option<PathBuf>,
    /// Endpoint URL (s3-family and cloud-drive backends)
    pub endpoint: Option<String>,
    /// Access key id (s3-family backend)
    pub access_key: Option<String>,
    /// Secret key (s3-family backend)
    pub secret_key: Option<String>,
    /// Region (s3-family backend)
    pub region: Option<String>,
    /// Bearer token (cloud-drive backend)
    pub token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            id: "local".to_string(),
            kind: BackendKind::Local,
            root: Some(PathBuf::from("/var/lib/portico/data")),
            endpoint: None,
            access_key: None,
            secret_key: None,
            region: None,
            token: None,
        }
    }
}

/// Storage backend kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Local filesystem
    Local,
    /// Remote S3-compatible service
    S3Family,
    /// Cloud drive HTTP API
    CloudDrive,
}

/// Rate limiting configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Default sustained requests per second for tenants without a plan rate
    pub default_rate: u64,
    /// Maximum tracked tenant buckets before the directory is bulk-cleared
    pub max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_rate: 100,
            max_entries: 10_000,
        }
    }
}

/// Event pipeline configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Bounded channel capacity; events beyond it are dropped
    pub capacity: usize,
    /// Optional CSV access log path; unset logs through tracing
    pub access_log: Option<PathBuf>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            access_log: None,
        }
    }
}

/// Backend health probing configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between backend probes, in seconds
    pub probe_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.network.listen.port(), 9000);
        assert_eq!(config.s3.region, "us-east-1");
        assert_eq!(config.rate_limit.max_entries, 10_000);
        assert_eq!(config.events.capacity, 1000);
        assert!(!config.test_mode);
        assert_eq!(config.storage.primary, "local");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: GatewayConfig = toml::from_str("test_mode = true").unwrap();
        assert!(cfg.test_mode);
        assert_eq!(cfg.network.idle_timeout_secs, 120);
    }
}
