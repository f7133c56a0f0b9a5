//! The provider adapter contract.
//!
//! Every provider integration implements [`ProviderAdapter`]; no other
//! coupling to provider SDKs crosses into the core. Side effects are confined
//! to `generate`, `health`, and `check_quota`; `estimate_cost` and
//! `rate_limit` are pure.

use crate::cost::CostEstimate;
use crate::error::RawProviderError;
use crate::request::GenerateRequest;
use crate::response::GenerateResult;
use crate::types::{ModelId, ProviderId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capabilities declared by an adapter at registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdapterCapabilities {
    /// Maximum tokens the model accepts (prompt + completion)
    pub max_tokens: u32,
    /// Whether the provider can stream tokens
    pub supports_streaming: bool,
    /// Whether the provider accepts a system prompt
    pub supports_system_prompt: bool,
    /// Whether the provider supports function/tool calling
    pub supports_functions: bool,
}

impl Default for AdapterCapabilities {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            supports_streaming: false,
            supports_system_prompt: true,
            supports_functions: false,
        }
    }
}

/// Identity and capabilities of one queryable backend.
///
/// Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterDescriptor {
    /// Provider name (registry key)
    pub provider: ProviderId,
    /// Model served by this adapter
    pub model: ModelId,
    /// Declared capabilities
    pub capabilities: AdapterCapabilities,
}

/// Point-in-time health snapshot for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the provider responded to the last probe
    pub healthy: bool,
    /// Probe round-trip latency, when measured
    #[serde(default, with = "humantime_serde::option")]
    pub latency: Option<Duration>,
    /// Recent failure rate, when tracked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
    /// When this snapshot was taken
    pub last_checked: DateTime<Utc>,
    /// Probe failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthStatus {
    /// A healthy snapshot with a measured latency.
    #[must_use]
    pub fn healthy(latency: Duration) -> Self {
        Self {
            healthy: true,
            latency: Some(latency),
            error_rate: None,
            last_checked: Utc::now(),
            message: None,
        }
    }

    /// An unhealthy snapshot with a reason.
    #[must_use]
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency: None,
            error_rate: None,
            last_checked: Utc::now(),
            message: Some(message.into()),
        }
    }
}

/// Provider-reported remaining call allowance. Advisory to routing, not
/// authoritative enforcement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaStatus {
    /// Remaining calls; `f64::INFINITY` means unmetered
    pub remaining: f64,
    /// Quota ceiling; `f64::INFINITY` means unmetered
    pub limit: f64,
    /// When the quota resets, if known
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuotaStatus {
    /// The unmetered sentinel, for providers without a quota API.
    #[must_use]
    pub fn unmetered() -> Self {
        Self {
            remaining: f64::INFINITY,
            limit: f64::INFINITY,
            reset_at: None,
        }
    }

    /// A metered quota snapshot.
    #[must_use]
    pub fn metered(remaining: f64, limit: f64, reset_at: Option<DateTime<Utc>>) -> Self {
        Self {
            remaining,
            limit,
            reset_at,
        }
    }

    /// Whether routing should exclude this provider for the current request.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0.0
    }
}

/// Static request-rate limits used for local token-bucket pacing. The
/// provider remains authoritative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Requests allowed per minute (0 = unlimited)
    pub requests_per_minute: u32,
    /// Requests allowed per day (0 = unlimited)
    pub requests_per_day: u32,
}

impl RateLimitInfo {
    /// No local pacing.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            requests_per_minute: 0,
            requests_per_day: 0,
        }
    }
}

/// Uniform interface every provider integration must implement.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Identity and capabilities of this adapter.
    fn descriptor(&self) -> &AdapterDescriptor;

    /// Perform one generation call.
    ///
    /// Must populate `usage` (estimated if the provider does not report it)
    /// and attach a cost estimate.
    ///
    /// # Errors
    /// Fails with a raw, provider-native error on any failure; the
    /// normalizer, not the adapter, maps it into the taxonomy.
    async fn generate(&self, request: &GenerateRequest)
        -> Result<GenerateResult, RawProviderError>;

    /// Cheap liveness probe. Never fails: probe errors are reported as an
    /// unhealthy status.
    async fn health(&self) -> HealthStatus;

    /// Pre-flight cost estimate. Pure function of the request and the
    /// pricing table; no network call, no hidden state.
    fn estimate_cost(&self, request: &GenerateRequest) -> CostEstimate;

    /// Best-effort quota check. Returns the unmetered sentinel when the
    /// provider has no quota API.
    async fn check_quota(&self) -> QuotaStatus;

    /// Static rate limits for local pacing.
    fn rate_limit(&self) -> RateLimitInfo;

    /// Convenience accessor for the provider name.
    fn provider_name(&self) -> &str {
        self.descriptor().provider.as_str()
    }

    /// Convenience accessor for the model ID.
    fn model_name(&self) -> &str {
        self.descriptor().model.as_str()
    }
}

impl std::fmt::Debug for dyn ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("descriptor", self.descriptor())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_unmetered_sentinel() {
        let quota = QuotaStatus::unmetered();
        assert!(quota.remaining.is_infinite());
        assert!(!quota.is_exhausted());
    }

    #[test]
    fn test_quota_exhaustion() {
        assert!(QuotaStatus::metered(0.0, 100.0, None).is_exhausted());
        assert!(QuotaStatus::metered(-3.0, 100.0, None).is_exhausted());
        assert!(!QuotaStatus::metered(1.0, 100.0, None).is_exhausted());
    }

    #[test]
    fn test_health_constructors() {
        let ok = HealthStatus::healthy(Duration::from_millis(12));
        assert!(ok.healthy);
        assert_eq!(ok.latency, Some(Duration::from_millis(12)));

        let bad = HealthStatus::unhealthy("connection refused");
        assert!(!bad.healthy);
        assert_eq!(bad.message.as_deref(), Some("connection refused"));
    }
}
