//! Reservation-based quota accounting
//!
//! Bytes for an in-flight `Put` are reserved up front and later either
//! committed (become used) or released (return to free). All transitions
//! for one tenant serialize on that tenant's mutex; different tenants
//! proceed in parallel. Arithmetic is exact and unsigned; no interleaving
//! can drive `used` negative or past `limit`.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use portico_common::{Error, Plan, Result, TenantId};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Retained usage-history entries per tenant
const HISTORY_LIMIT: usize = 256;

/// Quota state transition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaOp {
    Reserve,
    Commit,
    Release,
    Account,
}

/// One entry in a tenant's usage history
#[derive(Debug, Clone, Serialize)]
pub struct QuotaEvent {
    /// When the transition happened
    pub at: DateTime<Utc>,
    /// Transition kind
    pub op: QuotaOp,
    /// Signed byte delta of the transition
    pub bytes: i64,
    /// `used` after the transition
    pub used_after: u64,
    /// `reserved` after the transition
    pub reserved_after: u64,
}

/// Snapshot of a tenant's quota state
#[derive(Debug, Clone, Serialize)]
pub struct QuotaRecord {
    pub tenant_id: TenantId,
    pub used_bytes: u64,
    pub reserved_bytes: u64,
    pub limit_bytes: u64,
    pub tier: Plan,
}

struct TenantQuota {
    used: u64,
    reserved: u64,
    limit: u64,
    tier: Plan,
    history: VecDeque<QuotaEvent>,
}

impl TenantQuota {
    fn record(&mut self, op: QuotaOp, bytes: i64) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(QuotaEvent {
            at: Utc::now(),
            op,
            bytes,
            used_after: self.used,
            reserved_after: self.reserved,
        });
    }

    fn snapshot(&self, tenant_id: TenantId) -> QuotaRecord {
        QuotaRecord {
            tenant_id,
            used_bytes: self.used,
            reserved_bytes: self.reserved,
            limit_bytes: self.limit,
            tier: self.tier,
        }
    }
}

/// Per-tenant quota accounting
///
/// The record directory is read-mostly; each tenant's arithmetic happens
/// under its own mutex so tenants never contend with each other.
pub struct QuotaManager {
    records: RwLock<HashMap<TenantId, Arc<Mutex<TenantQuota>>>>,
}

impl Default for QuotaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Create the quota record for a tenant; double-create fails
    pub fn create_tenant(&self, tenant_id: TenantId, tier: Plan, limit_bytes: u64) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&tenant_id) {
            return Err(Error::TenantAlreadyExists(tenant_id.to_string()));
        }
        records.insert(
            tenant_id,
            Arc::new(Mutex::new(TenantQuota {
                used: 0,
                reserved: 0,
                limit: limit_bytes,
                tier,
                history: VecDeque::new(),
            })),
        );
        Ok(())
    }

    fn record(&self, tenant_id: &TenantId) -> Result<Arc<Mutex<TenantQuota>>> {
        self.records
            .read()
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))
    }

    /// Atomically check `used + reserved + n <= limit` and reserve `n`
    ///
    /// Returns `false` without mutating state when the reservation does
    /// not fit. Must be called before a `Put` begins streaming.
    pub fn check_and_reserve(&self, tenant_id: &TenantId, n_bytes: u64) -> Result<bool> {
        let record = self.record(tenant_id)?;
        let mut q = record.lock();

        let in_flight = q.used.checked_add(q.reserved).and_then(|v| v.checked_add(n_bytes));
        match in_flight {
            Some(total) if total <= q.limit => {
                q.reserved += n_bytes;
                q.record(QuotaOp::Reserve, n_bytes as i64);
                Ok(true)
            }
            _ => {
                debug!(
                    "reservation rejected for {}: {} requested, {} free",
                    tenant_id,
                    n_bytes,
                    q.limit.saturating_sub(q.used + q.reserved)
                );
                Ok(false)
            }
        }
    }

    /// Promote `n` reserved bytes to used after a successful `Put`
    pub fn commit(&self, tenant_id: &TenantId, n_bytes: u64) -> Result<()> {
        let record = self.record(tenant_id)?;
        let mut q = record.lock();

        // A commit can never exceed what is actually reserved; clamping
        // keeps the invariants intact even if a caller double-settles.
        let n = n_bytes.min(q.reserved);
        if n != n_bytes {
            warn!(
                "commit clamped for {}: asked {}, reserved {}",
                tenant_id, n_bytes, q.reserved
            );
        }
        q.reserved -= n;
        q.used += n;
        q.record(QuotaOp::Commit, n as i64);
        Ok(())
    }

    /// Return `n` reserved bytes to free after a failed `Put`
    ///
    /// Idempotent in effect: releasing more than is reserved releases
    /// what remains, so a crashed handler's reconciler can re-issue it.
    pub fn release(&self, tenant_id: &TenantId, n_bytes: u64) -> Result<()> {
        let record = self.record(tenant_id)?;
        let mut q = record.lock();

        let n = n_bytes.min(q.reserved);
        q.reserved -= n;
        q.record(QuotaOp::Release, -(n as i64));
        Ok(())
    }

    /// Signed adjustment of used bytes (deletes and corrections)
    pub fn account(&self, tenant_id: &TenantId, delta_bytes: i64) -> Result<()> {
        let record = self.record(tenant_id)?;
        let mut q = record.lock();

        if delta_bytes >= 0 {
            q.used = q.used.saturating_add(delta_bytes as u64).min(q.limit);
        } else {
            q.used = q.used.saturating_sub(delta_bytes.unsigned_abs());
        }
        q.record(QuotaOp::Account, delta_bytes);
        Ok(())
    }

    /// Current usage snapshot
    pub fn get_usage(&self, tenant_id: &TenantId) -> Result<QuotaRecord> {
        let record = self.record(tenant_id)?;
        let q = record.lock();
        Ok(q.snapshot(tenant_id.clone()))
    }

    /// Current tier
    pub fn get_tier(&self, tenant_id: &TenantId) -> Result<Plan> {
        let record = self.record(tenant_id)?;
        let q = record.lock();
        Ok(q.tier)
    }

    /// Move the tenant to a new tier, adopting its default limit
    pub fn update_tier(&self, tenant_id: &TenantId, tier: Plan) -> Result<()> {
        let record = self.record(tenant_id)?;
        let mut q = record.lock();
        if tier.storage_quota() < q.used + q.reserved {
            return Err(Error::invalid_request(format!(
                "tier {} limit is below current usage",
                tier.as_str()
            )));
        }
        q.tier = tier;
        q.limit = tier.storage_quota();
        Ok(())
    }

    /// Override the byte limit directly
    pub fn update_quota(&self, tenant_id: &TenantId, limit_bytes: u64) -> Result<()> {
        let record = self.record(tenant_id)?;
        let mut q = record.lock();
        if limit_bytes < q.used + q.reserved {
            return Err(Error::invalid_request(
                "limit below current usage".to_string(),
            ));
        }
        q.limit = limit_bytes;
        Ok(())
    }

    /// Snapshots for every tenant
    #[must_use]
    pub fn list_quotas(&self) -> Vec<QuotaRecord> {
        let records = self.records.read();
        let mut out: Vec<QuotaRecord> = records
            .iter()
            .map(|(id, rec)| rec.lock().snapshot(id.clone()))
            .collect();
        out.sort_by(|a, b| a.tenant_id.as_str().cmp(b.tenant_id.as_str()));
        out
    }

    /// Drop a tenant's quota record (tenant deletion cascade)
    pub fn delete_quota(&self, tenant_id: &TenantId) -> Result<()> {
        self.records
            .write()
            .remove(tenant_id)
            .map(|_| ())
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))
    }

    /// Recent usage history, oldest first
    pub fn get_usage_history(&self, tenant_id: &TenantId) -> Result<Vec<QuotaEvent>> {
        let record = self.record(tenant_id)?;
        let q = record.lock();
        Ok(q.history.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn id(s: &str) -> TenantId {
        TenantId::new(s).unwrap()
    }

    fn manager_with(tenant: &str, limit: u64) -> QuotaManager {
        let m = QuotaManager::new();
        m.create_tenant(id(tenant), Plan::Free, limit).unwrap();
        m
    }

    #[test]
    fn test_reserve_commit_release_cycle() {
        let m = manager_with("acme", 100);
        assert!(m.check_and_reserve(&id("acme"), 60).unwrap());
        m.commit(&id("acme"), 60).unwrap();

        let usage = m.get_usage(&id("acme")).unwrap();
        assert_eq!(usage.used_bytes, 60);
        assert_eq!(usage.reserved_bytes, 0);

        assert!(m.check_and_reserve(&id("acme"), 40).unwrap());
        m.release(&id("acme"), 40).unwrap();
        let usage = m.get_usage(&id("acme")).unwrap();
        assert_eq!(usage.used_bytes, 60);
        assert_eq!(usage.reserved_bytes, 0);
    }

    #[test]
    fn test_rejection_leaves_state_untouched() {
        // Tenant with limit 1 GB and 500 MB used.
        let m = manager_with("acme", GIB);
        assert!(m.check_and_reserve(&id("acme"), 500 * MIB).unwrap());
        m.commit(&id("acme"), 500 * MIB).unwrap();

        // 600 MB does not fit.
        assert!(!m.check_and_reserve(&id("acme"), 600 * MIB).unwrap());
        let usage = m.get_usage(&id("acme")).unwrap();
        assert_eq!(usage.used_bytes, 500 * MIB);
        assert_eq!(usage.reserved_bytes, 0);

        // 400 MB does.
        assert!(m.check_and_reserve(&id("acme"), 400 * MIB).unwrap());
        assert_eq!(m.get_usage(&id("acme")).unwrap().reserved_bytes, 400 * MIB);
    }

    #[test]
    fn test_double_create_fails() {
        let m = manager_with("acme", 100);
        assert!(matches!(
            m.create_tenant(id("acme"), Plan::Free, 100),
            Err(Error::TenantAlreadyExists(_))
        ));
    }

    #[test]
    fn test_release_is_idempotent_in_effect() {
        let m = manager_with("acme", 100);
        assert!(m.check_and_reserve(&id("acme"), 50).unwrap());
        m.release(&id("acme"), 50).unwrap();
        // A second release of the same reservation finds nothing left.
        m.release(&id("acme"), 50).unwrap();
        let usage = m.get_usage(&id("acme")).unwrap();
        assert_eq!(usage.reserved_bytes, 0);
        assert_eq!(usage.used_bytes, 0);
    }

    #[test]
    fn test_account_never_goes_negative() {
        let m = manager_with("acme", 100);
        m.account(&id("acme"), 30).unwrap();
        m.account(&id("acme"), -50).unwrap();
        assert_eq!(m.get_usage(&id("acme")).unwrap().used_bytes, 0);
    }

    #[test]
    fn test_tier_update_respects_usage() {
        let m = manager_with("acme", 100 * GIB);
        assert!(m.check_and_reserve(&id("acme"), 20 * GIB).unwrap());
        m.commit(&id("acme"), 20 * GIB).unwrap();

        // Free tier (5 GB) cannot hold 20 GB of usage.
        assert!(m.update_tier(&id("acme"), Plan::Free).is_err());
        m.update_tier(&id("acme"), Plan::Professional).unwrap();
        assert_eq!(m.get_tier(&id("acme")).unwrap(), Plan::Professional);
    }

    #[test]
    fn test_usage_history_records_transitions() {
        let m = manager_with("acme", 100);
        assert!(m.check_and_reserve(&id("acme"), 10).unwrap());
        m.commit(&id("acme"), 10).unwrap();
        m.account(&id("acme"), -10).unwrap();

        let history = m.get_usage_history(&id("acme")).unwrap();
        let ops: Vec<QuotaOp> = history.iter().map(|e| e.op).collect();
        assert_eq!(ops, vec![QuotaOp::Reserve, QuotaOp::Commit, QuotaOp::Account]);
    }

    #[test]
    fn test_invariants_under_concurrent_interleaving() {
        let m = Arc::new(manager_with("acme", 1000));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let m = Arc::clone(&m);
            handles.push(std::thread::spawn(move || {
                for i in 0..200u64 {
                    let n = (i % 7) + 1;
                    if m.check_and_reserve(&id("acme"), n).unwrap() {
                        if i % 2 == 0 {
                            m.commit(&id("acme"), n).unwrap();
                            m.account(&id("acme"), -(n as i64)).unwrap();
                        } else {
                            m.release(&id("acme"), n).unwrap();
                        }
                    }
                    let usage = m.get_usage(&id("acme")).unwrap();
                    assert!(usage.used_bytes + usage.reserved_bytes <= usage.limit_bytes);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let usage = m.get_usage(&id("acme")).unwrap();
        assert_eq!(usage.reserved_bytes, 0);
        assert_eq!(usage.used_bytes, 0);
    }

    #[test]
    fn test_delete_quota_cascade() {
        let m = manager_with("acme", 100);
        m.delete_quota(&id("acme")).unwrap();
        assert!(matches!(
            m.get_usage(&id("acme")),
            Err(Error::TenantNotFound(_))
        ));
    }
}
