//! Per-tenant request rate limiting
//!
//! Token bucket per tenant: tokens refill at the tenant's sustained rate
//! and accumulate up to `burst = 2 x rate`. The bucket directory is
//! bounded: once it would exceed `max_entries`, the whole map is dropped.
//! That grants every tenant a brief burst of grace after a reset in
//! exchange for an O(1) memory ceiling and no eviction queue.

use parking_lot::Mutex;
use portico_common::TenantId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::warn;

/// Token bucket rate limiter
///
/// Tokens are added at `rate` per second and accumulate up to `burst`.
/// Counts are scaled for sub-token precision so slow refill rates still
/// make progress between closely spaced requests.
#[derive(Debug)]
struct TokenBucket {
    /// Current token count, scaled
    tokens: AtomicU64,
    /// Maximum tokens (burst capacity), scaled
    max_tokens: u64,
    /// Tokens added per second, scaled
    refill_rate: u64,
    /// Last refill timestamp
    last_refill: Mutex<Instant>,
    /// Scale factor for sub-token precision
    scale: u64,
}

impl TokenBucket {
    fn new(rate: u64, burst: u64) -> Self {
        let scale = 1000;
        Self {
            tokens: AtomicU64::new(burst * scale),
            max_tokens: burst * scale,
            refill_rate: rate.max(1) * scale,
            last_refill: Mutex::new(Instant::now()),
            scale,
        }
    }

    fn refill(&self) {
        let mut last = self.last_refill.lock();
        let elapsed = last.elapsed();
        let added = (elapsed.as_secs_f64() * self.refill_rate as f64) as u64;
        if added == 0 {
            return;
        }
        *last = Instant::now();
        drop(last);

        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            let next = current.saturating_add(added).min(self.max_tokens);
            match self.tokens.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(_) => continue,
            }
        }
    }

    fn try_acquire(&self) -> bool {
        self.refill();

        let needed = self.scale;
        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            if current < needed {
                return false;
            }
            match self.tokens.compare_exchange_weak(
                current,
                current - needed,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    fn available(&self) -> u64 {
        self.tokens.load(Ordering::Relaxed) / self.scale
    }

    /// Whole seconds until one token is available
    fn seconds_until_available(&self) -> u64 {
        let current = self.tokens.load(Ordering::Relaxed);
        if current >= self.scale {
            return 0;
        }
        let missing = self.scale - current;
        missing.div_ceil(self.refill_rate).max(1)
    }
}

/// Outcome of a rate-limit check, carrying the response header values
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Sustained rate (X-RateLimit-Limit)
    pub limit: u64,
    /// Tokens left after this decision (X-RateLimit-Remaining)
    pub remaining: u64,
    /// Seconds until a token is available (X-RateLimit-Reset)
    pub reset_secs: u64,
}

/// Per-tenant rate limiter with a bounded bucket directory
pub struct RateLimiter {
    buckets: Mutex<HashMap<TenantId, Arc<TokenBucket>>>,
    max_entries: usize,
    /// Bulk clears since startup
    resets: AtomicU64,
    /// Requests rejected since startup
    rejected: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter that bulk-clears at `max_entries` tracked tenants
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_entries,
            resets: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Check and consume one token for the tenant
    ///
    /// `rate` is the tenant's sustained requests-per-second; burst is
    /// twice that. The first call for an unseen tenant may trigger the
    /// bulk clear that keeps the directory bounded.
    pub fn allow(&self, tenant_id: &TenantId, rate: u64) -> RateDecision {
        let bucket = {
            let mut buckets = self.buckets.lock();
            if !buckets.contains_key(tenant_id) && buckets.len() >= self.max_entries {
                warn!(
                    "rate limiter directory hit {} entries; clearing",
                    buckets.len()
                );
                buckets.clear();
                self.resets.fetch_add(1, Ordering::Relaxed);
            }
            buckets
                .entry(tenant_id.clone())
                .or_insert_with(|| Arc::new(TokenBucket::new(rate, rate * 2)))
                .clone()
        };

        let allowed = bucket.try_acquire();
        if !allowed {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        RateDecision {
            allowed,
            limit: rate,
            remaining: bucket.available(),
            reset_secs: bucket.seconds_until_available(),
        }
    }

    /// Number of tracked tenant buckets
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Bulk clears since startup
    #[must_use]
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    /// Rejections since startup
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}
