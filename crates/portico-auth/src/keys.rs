//! API key storage
//!
//! Keys bind an access key id to a tenant. Revocation and expiry gate
//! every authentication lookup; rotation atomically creates a successor
//! and revokes the predecessor.
//!
//! The 40-char secret is kept verbatim because SigV4 derives the signing
//! key from it; it is returned exactly once at creation and only the key
//! id prefix ever appears in logs.

use crate::error::AuthError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use portico_common::TenantId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An API key for S3 request authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Access key id (20 chars, e.g. "AKIA...")
    pub key_id: String,
    /// Secret key (40 chars); shown to the caller once at creation
    pub secret_key: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Capability strings; `s3:*` grants everything
    pub permissions: HashSet<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Optional expiry; a key at or past this instant fails authentication
    pub expires_at: Option<DateTime<Utc>>,
    /// Revocation time; set keys fail authentication
    pub revoked_at: Option<DateTime<Utc>>,
    /// Number of successful authentications
    pub usage_count: u64,
    /// Time of the last successful authentication
    pub last_used: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Generate a fresh key for a tenant with the default `s3:*` grant
    #[must_use]
    pub fn generate(tenant_id: TenantId) -> Self {
        Self {
            key_id: generate_key_id(),
            secret_key: generate_secret(),
            tenant_id,
            permissions: HashSet::from(["s3:*".to_string()]),
            created_at: Utc::now(),
            expires_at: None,
            revoked_at: None,
            usage_count: 0,
            last_used: None,
        }
    }

    /// Whether the key is usable at `now`
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|exp| now < exp)
    }

    /// Whether the key grants the given capability
    #[must_use]
    pub fn allows(&self, action: &str) -> bool {
        self.permissions.contains("s3:*") || self.permissions.contains(action)
    }
}

/// Generate an access key id (20 chars: AKIA + 16 uppercase alphanumerics)
fn generate_key_id() -> String {
    use rand::distributions::{Alphanumeric, DistString};
    let tail = Alphanumeric
        .sample_string(&mut rand::thread_rng(), 16)
        .to_ascii_uppercase();
    format!("AKIA{tail}")
}

/// Generate a 40-char alphanumeric secret key
fn generate_secret() -> String {
    use rand::distributions::{Alphanumeric, DistString};
    Alphanumeric.sample_string(&mut rand::thread_rng(), 40)
}

/// In-memory API key store
///
/// In production this fronts the relational store; the lookup contract
/// (single fetch of secret + tenant + active flag) is what the signature
/// validator depends on.
pub struct KeyStore {
    /// Keys indexed by key_id
    keys: RwLock<HashMap<String, ApiKey>>,
    /// key_ids per tenant
    tenant_keys: RwLock<HashMap<TenantId, Vec<String>>>,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            tenant_keys: RwLock::new(HashMap::new()),
        }
    }

    /// Create and register a new key for a tenant
    ///
    /// The returned value carries the only copy of the secret the store
    /// will ever hand out.
    pub fn create_key(&self, tenant_id: TenantId) -> ApiKey {
        let key = ApiKey::generate(tenant_id.clone());
        self.keys.write().insert(key.key_id.clone(), key.clone());
        self.tenant_keys
            .write()
            .entry(tenant_id)
            .or_default()
            .push(key.key_id.clone());
        key
    }

    /// Insert a pre-built key (fixture and test-mode use)
    pub fn insert(&self, key: ApiKey) {
        self.tenant_keys
            .write()
            .entry(key.tenant_id.clone())
            .or_default()
            .push(key.key_id.clone());
        self.keys.write().insert(key.key_id.clone(), key);
    }

    /// Fetch a key by id
    pub fn get(&self, key_id: &str) -> Result<ApiKey, AuthError> {
        self.keys
            .read()
            .get(key_id)
            .cloned()
            .ok_or_else(|| AuthError::AccessKeyNotFound(key_id.to_string()))
    }

    /// List keys for a tenant
    #[must_use]
    pub fn list_for_tenant(&self, tenant_id: &TenantId) -> Vec<ApiKey> {
        let ids = self
            .tenant_keys
            .read()
            .get(tenant_id)
            .cloned()
            .unwrap_or_default();
        let keys = self.keys.read();
        ids.iter().filter_map(|id| keys.get(id).cloned()).collect()
    }

    /// Revoke a key
    pub fn revoke(&self, key_id: &str) -> Result<(), AuthError> {
        let mut keys = self.keys.write();
        let key = keys
            .get_mut(key_id)
            .ok_or_else(|| AuthError::AccessKeyNotFound(key_id.to_string()))?;
        if key.revoked_at.is_none() {
            key.revoked_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Rotate a key: create a successor and revoke the predecessor
    ///
    /// Both steps happen under one write lock, so no interleaved lookup
    /// can observe two live keys or zero live keys for the rotation.
    pub fn rotate(&self, key_id: &str) -> Result<ApiKey, AuthError> {
        let mut keys = self.keys.write();
        let old = keys
            .get_mut(key_id)
            .ok_or_else(|| AuthError::AccessKeyNotFound(key_id.to_string()))?;
        if old.revoked_at.is_some() {
            return Err(AuthError::AccessKeyRevoked);
        }

        let mut successor = ApiKey::generate(old.tenant_id.clone());
        successor.permissions = old.permissions.clone();
        successor.expires_at = old.expires_at;
        old.revoked_at = Some(Utc::now());

        keys.insert(successor.key_id.clone(), successor.clone());
        self.tenant_keys
            .write()
            .entry(successor.tenant_id.clone())
            .or_default()
            .push(successor.key_id.clone());
        Ok(successor)
    }

    /// Remove all keys for a tenant (tenant deletion cascade)
    pub fn delete_for_tenant(&self, tenant_id: &TenantId) {
        if let Some(ids) = self.tenant_keys.write().remove(tenant_id) {
            let mut keys = self.keys.write();
            for id in ids {
                keys.remove(&id);
            }
        }
    }

    /// Resolve a key for authentication
    ///
    /// Fails for unknown, revoked, or expired keys; on success bumps the
    /// usage counters.
    pub fn lookup_for_auth(&self, key_id: &str) -> Result<ApiKey, AuthError> {
        let now = Utc::now();
        let mut keys = self.keys.write();
        let key = keys
            .get_mut(key_id)
            .ok_or_else(|| AuthError::AccessKeyNotFound(key_id.to_string()))?;

        if key.revoked_at.is_some() {
            return Err(AuthError::AccessKeyRevoked);
        }
        if key.expires_at.is_some_and(|exp| now >= exp) {
            return Err(AuthError::AccessKeyExpired);
        }

        key.usage_count += 1;
        key.last_used = Some(now);
        Ok(key.clone())
    }
}
