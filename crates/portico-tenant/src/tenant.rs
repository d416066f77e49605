//! Tenant registry and resolver
//!
//! A tenant is the unit of isolation: its id is prepended to every bucket
//! name to form the physical container name. `namespace_container` and
//! `strip_namespace` are the only functions that know the scheme; every
//! other component goes through them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use portico_common::{BucketName, Error, Plan, Result, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Id of the synthetic tenant used when the gateway runs in test mode
pub const TEST_TENANT_ID: &str = "test-tenant";

/// Tenant lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    #[default]
    Active,
    Suspended,
    Deleted,
}

/// A registered tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique tenant id; never re-keyed
    pub tenant_id: TenantId,
    /// Subscription plan
    pub plan: Plan,
    /// Lifecycle status
    pub status: TenantStatus,
    /// Storage quota in bytes
    pub storage_quota: u64,
    /// Sustained request rate
    pub requests_per_second: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a tenant with the plan's default quota and rate
    #[must_use]
    pub fn new(tenant_id: TenantId, plan: Plan) -> Self {
        Self {
            tenant_id,
            plan,
            status: TenantStatus::Active,
            storage_quota: plan.storage_quota(),
            requests_per_second: plan.requests_per_second(),
            created_at: Utc::now(),
        }
    }

    /// Whether the tenant may issue requests
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    /// The prefix prepended to this tenant's container names
    #[must_use]
    pub fn namespace_prefix(&self) -> String {
        format!("{}_", self.tenant_id)
    }
}

/// In-memory tenant registry and resolver
///
/// In production the registry fronts the relational store; the resolver
/// contract (authenticated id -> tenant record + namespace) is what the
/// rest of the gateway depends on.
pub struct TenantDirectory {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
    /// Test mode: unauthenticated requests resolve to [`TEST_TENANT_ID`]
    test_mode: bool,
}

impl TenantDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new(test_mode: bool) -> Self {
        let dir = Self {
            tenants: RwLock::new(HashMap::new()),
            test_mode,
        };
        if test_mode {
            // Deterministic fixture so anonymous requests always land in
            // the same namespace.
            let tenant = Tenant::new(TenantId::new_unchecked(TEST_TENANT_ID), Plan::Professional);
            dir.tenants
                .write()
                .insert(tenant.tenant_id.clone(), tenant);
        }
        dir
    }

    /// Whether the directory runs in test mode
    #[must_use]
    pub const fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// Register a tenant
    pub fn create(&self, tenant_id: TenantId, plan: Plan) -> Result<Tenant> {
        let mut tenants = self.tenants.write();
        if tenants.contains_key(&tenant_id) {
            return Err(Error::TenantAlreadyExists(tenant_id.to_string()));
        }
        let tenant = Tenant::new(tenant_id.clone(), plan);
        tenants.insert(tenant_id, tenant.clone());
        info!("registered tenant {} ({})", tenant.tenant_id, plan.as_str());
        Ok(tenant)
    }

    /// Fetch a tenant by id
    pub fn get(&self, tenant_id: &TenantId) -> Result<Tenant> {
        self.tenants
            .read()
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))
    }

    /// Resolve the tenant for a request
    ///
    /// `authenticated` is the id established by signature validation, if
    /// any. Anonymous requests only resolve in test mode; a stale id from
    /// a deleted tenant fails closed.
    pub fn resolve(&self, authenticated: Option<&TenantId>) -> Result<Tenant> {
        match authenticated {
            Some(id) => {
                let tenant = self.get(id).map_err(|_| Error::AccessDenied)?;
                if !tenant.is_active() {
                    return Err(Error::AccessDenied);
                }
                Ok(tenant)
            }
            None if self.test_mode => self.get(&TenantId::new_unchecked(TEST_TENANT_ID)),
            None => Err(Error::AccessDenied),
        }
    }

    /// Build the physical container name for a tenant's bucket
    ///
    /// The ONLY place that concatenates tenant id into a container name.
    #[must_use]
    pub fn namespace_container(tenant: &Tenant, bucket: &BucketName) -> String {
        format!("{}_{}", tenant.tenant_id, bucket)
    }

    /// Recover the bucket name from a physical container name
    ///
    /// Inverse of [`Self::namespace_container`]; returns `None` for
    /// containers outside the tenant's namespace.
    #[must_use]
    pub fn strip_namespace<'a>(tenant: &Tenant, container: &'a str) -> Option<&'a str> {
        container.strip_prefix(&tenant.namespace_prefix())
    }

    /// Update the tenant's lifecycle status
    pub fn update_status(&self, tenant_id: &TenantId, status: TenantStatus) -> Result<()> {
        let mut tenants = self.tenants.write();
        let tenant = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;
        tenant.status = status;
        Ok(())
    }

    /// Update the tenant's plan, refreshing quota and rate defaults
    pub fn update_plan(&self, tenant_id: &TenantId, plan: Plan) -> Result<Tenant> {
        let mut tenants = self.tenants.write();
        let tenant = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;
        tenant.plan = plan;
        tenant.storage_quota = plan.storage_quota();
        tenant.requests_per_second = plan.requests_per_second();
        Ok(tenant.clone())
    }

    /// Remove a tenant; quota and key cascades happen at the call site
    pub fn delete(&self, tenant_id: &TenantId) -> Result<()> {
        self.tenants
            .write()
            .remove(tenant_id)
            .map(|_| ())
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))
    }

    /// All registered tenants
    #[must_use]
    pub fn list(&self) -> Vec<Tenant> {
        self.tenants.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TenantId {
        TenantId::new(s).unwrap()
    }

    #[test]
    fn test_create_and_resolve() {
        let dir = TenantDirectory::new(false);
        dir.create(id("acme"), Plan::Starter).unwrap();

        let tenant = dir.resolve(Some(&id("acme"))).unwrap();
        assert_eq!(tenant.tenant_id.as_str(), "acme");
        assert_eq!(tenant.requests_per_second, 50);
    }

    #[test]
    fn test_double_create_fails() {
        let dir = TenantDirectory::new(false);
        dir.create(id("acme"), Plan::Free).unwrap();
        assert!(matches!(
            dir.create(id("acme"), Plan::Free),
            Err(Error::TenantAlreadyExists(_))
        ));
    }

    #[test]
    fn test_unknown_tenant_is_access_denied() {
        let dir = TenantDirectory::new(false);
        assert!(matches!(
            dir.resolve(Some(&id("ghost"))),
            Err(Error::AccessDenied)
        ));
    }

    #[test]
    fn test_anonymous_rejected_outside_test_mode() {
        let dir = TenantDirectory::new(false);
        assert!(matches!(dir.resolve(None), Err(Error::AccessDenied)));
    }

    #[test]
    fn test_anonymous_resolves_in_test_mode() {
        let dir = TenantDirectory::new(true);
        let tenant = dir.resolve(None).unwrap();
        assert_eq!(tenant.tenant_id.as_str(), TEST_TENANT_ID);
        // Deterministic across calls.
        let again = dir.resolve(None).unwrap();
        assert_eq!(again.tenant_id, tenant.tenant_id);
    }

    #[test]
    fn test_suspended_tenant_fails_closed() {
        let dir = TenantDirectory::new(false);
        dir.create(id("acme"), Plan::Free).unwrap();
        dir.update_status(&id("acme"), TenantStatus::Suspended)
            .unwrap();
        assert!(matches!(
            dir.resolve(Some(&id("acme"))),
            Err(Error::AccessDenied)
        ));
    }

    #[test]
    fn test_namespacing_round_trip() {
        let tenant = Tenant::new(id("acme"), Plan::Free);
        let bucket = BucketName::new("photos").unwrap();
        let container = TenantDirectory::namespace_container(&tenant, &bucket);
        assert_eq!(container, "acme_photos");
        assert_eq!(
            TenantDirectory::strip_namespace(&tenant, &container),
            Some("photos")
        );

        let other = Tenant::new(id("rival"), Plan::Free);
        assert_eq!(TenantDirectory::strip_namespace(&other, &container), None);
    }

    #[test]
    fn test_distinct_tenants_never_share_a_container() {
        let bucket = BucketName::new("shared-name").unwrap();
        let a = Tenant::new(id("alpha"), Plan::Free);
        let b = Tenant::new(id("beta"), Plan::Free);
        assert_ne!(
            TenantDirectory::namespace_container(&a, &bucket),
            TenantDirectory::namespace_container(&b, &bucket)
        );
    }

    #[test]
    fn test_plan_update_refreshes_limits() {
        let dir = TenantDirectory::new(false);
        dir.create(id("acme"), Plan::Free).unwrap();
        let upgraded = dir.update_plan(&id("acme"), Plan::Enterprise).unwrap();
        assert_eq!(upgraded.storage_quota, Plan::Enterprise.storage_quota());
        assert_eq!(
            upgraded.requests_per_second,
            Plan::Enterprise.requests_per_second()
        );
    }
}
