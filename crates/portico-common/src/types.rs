//! Core type definitions for Portico
//!
//! Identifier newtypes with the validation rules the gateway depends on.
//! Tenant ids, bucket names, and object keys are validated at the edge so
//! the storage layer can treat them as opaque.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a tenant
///
/// Tenant ids are embedded into container names as `<tenant_id>_<bucket>`,
/// so the character set excludes `_` to keep the separator unambiguous.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct TenantId(String);

impl TenantId {
    /// Create a new tenant id, validating the character set
    pub fn new(id: impl Into<String>) -> Result<Self, TenantIdError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the tenant id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), TenantIdError> {
        if id.is_empty() {
            return Err(TenantIdError::Empty);
        }
        if id.len() > 64 {
            return Err(TenantIdError::TooLong);
        }
        for c in id.chars() {
            if c == '_' {
                return Err(TenantIdError::ContainsSeparator);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(TenantIdError::InvalidChar(c));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

/// Tenant id validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TenantIdError {
    #[error("tenant id is empty")]
    Empty,
    #[error("tenant id exceeds 64 characters")]
    TooLong,
    #[error("tenant id contains the namespace separator '_'")]
    ContainsSeparator,
    #[error("tenant id contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// Client-facing bucket name
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct BucketName(String);

impl BucketName {
    /// Create a new bucket name (validates S3 naming rules)
    pub fn new(name: impl Into<String>) -> Result<Self, BucketNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the bucket name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate bucket name according to S3 rules
    fn validate(name: &str) -> Result<(), BucketNameError> {
        if name.len() < 3 {
            return Err(BucketNameError::TooShort);
        }
        if name.len() > 63 {
            return Err(BucketNameError::TooLong);
        }

        let first = name.chars().next().unwrap();
        if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
            return Err(BucketNameError::InvalidStartChar);
        }

        let last = name.chars().last().unwrap();
        if !last.is_ascii_lowercase() && !last.is_ascii_digit() {
            return Err(BucketNameError::InvalidEndChar);
        }

        for c in name.chars() {
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '.' {
                return Err(BucketNameError::InvalidChar(c));
            }
        }

        if name.contains("..") {
            return Err(BucketNameError::ConsecutivePeriods);
        }

        if name.parse::<std::net::Ipv4Addr>().is_ok() {
            return Err(BucketNameError::LooksLikeIpAddress);
        }

        Ok(())
    }
}

impl fmt::Debug for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketName({})", self.0)
    }
}

/// Bucket name validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BucketNameError {
    #[error("bucket name must be at least 3 characters")]
    TooShort,
    #[error("bucket name must be at most 63 characters")]
    TooLong,
    #[error("bucket name must start with a lowercase letter or digit")]
    InvalidStartChar,
    #[error("bucket name must end with a lowercase letter or digit")]
    InvalidEndChar,
    #[error("bucket name contains invalid character: {0:?}")]
    InvalidChar(char),
    #[error("bucket name contains consecutive periods")]
    ConsecutivePeriods,
    #[error("bucket name must not be formatted as an IP address")]
    LooksLikeIpAddress,
}

/// Client-facing object key
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new object key
    ///
    /// Keys may contain slashes (pseudo-directories) but must not escape
    /// the container via `..` segments; the local driver maps keys onto
    /// filesystem paths.
    pub fn new(key: impl Into<String>) -> Result<Self, ObjectKeyError> {
        let key = key.into();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the object key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File extension of the key, if any
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.0.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() { None } else { Some(ext) }
    }

    fn validate(key: &str) -> Result<(), ObjectKeyError> {
        if key.is_empty() {
            return Err(ObjectKeyError::Empty);
        }
        if key.len() > 1024 {
            return Err(ObjectKeyError::TooLong);
        }
        if key.starts_with('/') {
            return Err(ObjectKeyError::LeadingSlash);
        }
        if key.split('/').any(|seg| seg == "..") {
            return Err(ObjectKeyError::PathTraversal);
        }
        if key.contains('\0') {
            return Err(ObjectKeyError::InvalidChar('\0'))
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.0)
    }
}

/// Object key validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ObjectKeyError {
    #[error("object key is empty")]
    Empty,
    #[error("object key exceeds 1024 characters")]
    TooLong,
    #[error("object key must not start with '/'")]
    LeadingSlash,
    #[error("object key contains a '..' path segment")]
    PathTraversal,
    #[error("object key contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// Subscription plan for a tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Starter,
    Professional,
    Enterprise,
}

impl Plan {
    /// Default storage quota for the plan, in bytes
    #[must_use]
    pub const fn storage_quota(self) -> u64 {
        match self {
            Self::Free => 5 * GIB,
            Self::Starter => 100 * GIB,
            Self::Professional => 1024 * GIB,
            Self::Enterprise => 10 * 1024 * GIB,
        }
    }

    /// Default request rate for the plan, in requests per second
    #[must_use]
    pub const fn requests_per_second(self) -> u64 {
        match self {
            Self::Free => 10,
            Self::Starter => 50,
            Self::Professional => 100,
            Self::Enterprise => 500,
        }
    }

    /// Plan name as used in the admin API
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(UnknownPlan(other.to_string())),
        }
    }
}

/// Error for unrecognized plan names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plan: {0}")]
pub struct UnknownPlan(pub String);

const GIB: u64 = 1024 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_valid() {
        assert!(TenantId::new("acme-corp").is_ok());
        assert!(TenantId::new("t1").is_ok());
    }

    #[test]
    fn test_tenant_id_rejects_separator() {
        assert_eq!(
            TenantId::new("acme_corp"),
            Err(TenantIdError::ContainsSeparator)
        );
    }

    #[test]
    fn test_tenant_id_rejects_uppercase() {
        assert!(matches!(
            TenantId::new("Acme"),
            Err(TenantIdError::InvalidChar('A'))
        ));
    }

    #[test]
    fn test_bucket_name_rules() {
        assert!(BucketName::new("my-bucket").is_ok());
        assert!(BucketName::new("ab").is_err());
        assert!(BucketName::new("My-Bucket").is_err());
        assert!(BucketName::new("a..b").is_err());
        assert!(BucketName::new("192.168.1.1").is_err());
        assert!(BucketName::new("-bucket").is_err());
    }

    #[test]
    fn test_object_key_rules() {
        assert!(ObjectKey::new("dir/file.txt").is_ok());
        assert!(ObjectKey::new("/abs").is_err());
        assert!(ObjectKey::new("a/../b").is_err());
        assert!(ObjectKey::new("").is_err());
    }

    #[test]
    fn test_object_key_extension() {
        assert_eq!(ObjectKey::new_unchecked("a/b.txt").extension(), Some("txt"));
        assert_eq!(ObjectKey::new_unchecked("a/b").extension(), None);
        assert_eq!(ObjectKey::new_unchecked(".hidden").extension(), None);
    }

    #[test]
    fn test_plan_defaults() {
        assert_eq!(Plan::Free.requests_per_second(), 10);
        assert!(Plan::Enterprise.storage_quota() > Plan::Free.storage_quota());
        assert_eq!("professional".parse::<Plan>(), Ok(Plan::Professional));
        assert!("platinum".parse::<Plan>().is_err());
    }
}
