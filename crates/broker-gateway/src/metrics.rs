//! Gateway-level counters.
//!
//! Lock-free counters updated on every request. Cost is accumulated in
//! micro-dollars so it can live in an atomic; the snapshot converts back to
//! dollars.

use broker_core::{GatewayError, GenerateResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// Aggregate request counters for one gateway instance.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    cost_micros: AtomicU64,
}

/// Point-in-time copy of the gateway counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Requests accepted by the facade (including cache hits)
    pub requests: u64,
    /// Requests that produced a result
    pub successes: u64,
    /// Requests that surfaced an error
    pub failures: u64,
    /// Requests served from the response cache
    pub cache_hits: u64,
    /// Prompt tokens across successful, non-cached results
    pub prompt_tokens: u64,
    /// Completion tokens across successful, non-cached results
    pub completion_tokens: u64,
    /// Accumulated estimated cost (USD)
    pub total_cost: f64,
}

impl GatewayMetrics {
    /// Create zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an accepted request.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a cache hit. Cache hits are also successes.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a successful generation and accumulate its usage and cost.
    pub fn record_success(&self, result: &GenerateResult) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.prompt_tokens
            .fetch_add(u64::from(result.usage.prompt_tokens), Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(u64::from(result.usage.completion_tokens), Ordering::Relaxed);

        let micros = (result.cost_estimate.amount * MICROS_PER_UNIT).round();
        if micros.is_finite() && micros > 0.0 {
            self.cost_micros.fetch_add(micros as u64, Ordering::Relaxed);
        }
    }

    /// Count a failed request.
    pub fn record_failure(&self, error: &GatewayError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        debug!(code = error.code(), "Recorded gateway failure");
    }

    /// Take a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_cost: self.cost_micros.load(Ordering::Relaxed) as f64 / MICROS_PER_UNIT,
        }
    }
}
