//! Advisory quota tracking and local rate pacing.
//!
//! Quota exhaustion excludes a provider from routing for the current request
//! but never opens its circuit: quota and health are independent signals.
//! The rate pacer is a local token bucket seeded from static
//! [`RateLimitInfo`]; the provider remains authoritative.

use broker_core::{ProviderAdapter, QuotaStatus, RateLimitInfo};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cached quota snapshot.
struct CachedQuota {
    status: QuotaStatus,
    fetched_at: Instant,
}

/// Caches per-provider quota snapshots with a freshness TTL.
pub struct QuotaTracker {
    entries: DashMap<String, CachedQuota>,
    ttl: Duration,
}

impl QuotaTracker {
    /// Create a tracker with the given snapshot TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Create with a 30-second TTL.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(30))
    }

    /// Last-known quota for a provider, if any snapshot exists.
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<QuotaStatus> {
        self.entries.get(provider).map(|entry| entry.status)
    }

    /// Whether routing should exclude this provider. Unknown providers are
    /// not excluded (best-effort signal).
    #[must_use]
    pub fn is_exhausted(&self, provider: &str) -> bool {
        self.get(provider).is_some_and(|status| status.is_exhausted())
    }

    /// Fetch a fresh snapshot from the adapter and cache it.
    pub async fn refresh(&self, adapter: &dyn ProviderAdapter) -> QuotaStatus {
        let status = adapter.check_quota().await;
        debug!(
            provider = adapter.provider_name(),
            remaining = status.remaining,
            "Quota refreshed"
        );
        self.entries.insert(
            adapter.provider_name().to_owned(),
            CachedQuota {
                status,
                fetched_at: Instant::now(),
            },
        );
        status
    }

    /// Whether the cached snapshot for a provider is still within the TTL.
    #[must_use]
    pub fn is_fresh(&self, provider: &str) -> bool {
        self.entries
            .get(provider)
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.ttl)
    }

    /// Record a locally observed quota snapshot (e.g. from response headers).
    pub fn record(&self, provider: &str, status: QuotaStatus) {
        self.entries.insert(
            provider.to_owned(),
            CachedQuota {
                status,
                fetched_at: Instant::now(),
            },
        );
    }
}

/// Token bucket state for one provider.
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Local token-bucket pacing from static per-provider rate limits.
pub struct RatePacer {
    buckets: DashMap<String, Mutex<Bucket>>,
}

impl RatePacer {
    /// Create an empty pacer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Register a provider's static limits. A zero requests-per-minute means
    /// unlimited and registers no bucket.
    pub fn register(&self, provider: &str, limits: RateLimitInfo) {
        if limits.requests_per_minute == 0 {
            return;
        }
        let capacity = f64::from(limits.requests_per_minute);
        self.buckets.insert(
            provider.to_owned(),
            Mutex::new(Bucket {
                capacity,
                tokens: capacity,
                refill_per_sec: capacity / 60.0,
                last_refill: Instant::now(),
            }),
        );
    }

    /// Try to take one request slot. Unregistered providers are unlimited.
    #[must_use]
    pub fn try_acquire(&self, provider: &str) -> bool {
        self.buckets
            .get(provider)
            .map_or(true, |bucket| bucket.lock().try_acquire())
    }
}

impl Default for RatePacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_not_exhausted() {
        let tracker = QuotaTracker::with_defaults();
        assert!(!tracker.is_exhausted("unseen"));
        assert!(tracker.get("unseen").is_none());
    }

    #[test]
    fn test_recorded_exhaustion() {
        let tracker = QuotaTracker::with_defaults();
        tracker.record("openai", QuotaStatus::metered(0.0, 1000.0, None));
        assert!(tracker.is_exhausted("openai"));

        tracker.record("openai", QuotaStatus::metered(5.0, 1000.0, None));
        assert!(!tracker.is_exhausted("openai"));
    }

    #[test]
    fn test_freshness_tracks_ttl() {
        let tracker = QuotaTracker::with_defaults();
        assert!(!tracker.is_fresh("openai"));
        tracker.record("openai", QuotaStatus::metered(10.0, 100.0, None));
        assert!(tracker.is_fresh("openai"));

        let stale = QuotaTracker::new(Duration::ZERO);
        stale.record("openai", QuotaStatus::metered(10.0, 100.0, None));
        assert!(!stale.is_fresh("openai"));
    }

    #[test]
    fn test_unmetered_never_exhausted() {
        let tracker = QuotaTracker::with_defaults();
        tracker.record("local", QuotaStatus::unmetered());
        assert!(!tracker.is_exhausted("local"));
    }

    #[test]
    fn test_pacer_unlimited_by_default() {
        let pacer = RatePacer::new();
        for _ in 0..1000 {
            assert!(pacer.try_acquire("anything"));
        }
    }

    #[test]
    fn test_pacer_zero_rpm_is_unlimited() {
        let pacer = RatePacer::new();
        pacer.register(
            "local",
            RateLimitInfo {
                requests_per_minute: 0,
                requests_per_day: 0,
            },
        );
        for _ in 0..100 {
            assert!(pacer.try_acquire("local"));
        }
    }

    #[test]
    fn test_pacer_exhausts_bucket() {
        let pacer = RatePacer::new();
        pacer.register(
            "openai",
            RateLimitInfo {
                requests_per_minute: 3,
                requests_per_day: 0,
            },
        );

        assert!(pacer.try_acquire("openai"));
        assert!(pacer.try_acquire("openai"));
        assert!(pacer.try_acquire("openai"));
        // Bucket drained; refill is ~0.05 tokens/sec, nowhere near 1 yet.
        assert!(!pacer.try_acquire("openai"));
    }
}
