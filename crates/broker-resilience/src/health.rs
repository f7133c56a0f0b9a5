//! Per-provider health tracking.
//!
//! The monitor owns one circuit breaker and one [`HealthStatus`] snapshot per
//! provider. Request outcomes drive the breaker; scheduled probes only
//! refresh the snapshot (latency, `last_checked`) and never flip the circuit,
//! so a stale probe success can never un-open a circuit opened by more recent
//! failures.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use broker_core::{GatewayError, HealthStatus, ProviderAdapter};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Health monitor configuration.
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Breaker configuration applied to every provider
    pub breaker: CircuitBreakerConfig,
    /// Interval between scheduled health probes
    pub probe_interval: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::default(),
            probe_interval: Duration::from_secs(60),
        }
    }
}

/// Per-provider tracked state.
struct ProviderHealth {
    breaker: CircuitBreaker,
    status: RwLock<HealthStatus>,
}

/// Tracks circuit state and health snapshots for all providers.
///
/// State is keyed per provider; updates to one provider never serialize
/// requests touching another.
pub struct HealthMonitor {
    providers: DashMap<String, Arc<ProviderHealth>>,
    config: HealthMonitorConfig,
}

impl HealthMonitor {
    /// Create a new monitor.
    #[must_use]
    pub fn new(config: HealthMonitorConfig) -> Self {
        Self {
            providers: DashMap::new(),
            config,
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(HealthMonitorConfig::default())
    }

    /// Get or lazily create the entry for a provider.
    fn entry(&self, provider: &str) -> Arc<ProviderHealth> {
        if let Some(existing) = self.providers.get(provider) {
            return Arc::clone(&existing);
        }
        self.providers
            .entry(provider.to_owned())
            .or_insert_with(|| {
                Arc::new(ProviderHealth {
                    breaker: CircuitBreaker::new(provider, self.config.breaker.clone()),
                    status: RwLock::new(HealthStatus {
                        healthy: true,
                        latency: None,
                        error_rate: None,
                        last_checked: Utc::now(),
                        message: None,
                    }),
                })
            })
            .clone()
    }

    /// Check whether a request may be dispatched to this provider.
    ///
    /// # Errors
    /// Returns `GatewayError::ProviderUnavailable` while the provider's
    /// circuit is open.
    pub fn admit(&self, provider: &str) -> Result<(), GatewayError> {
        self.entry(provider).breaker.check()
    }

    /// Record a successful request outcome.
    pub fn record_success(&self, provider: &str, latency: Duration) {
        let entry = self.entry(provider);
        entry.breaker.record_success();

        let mut status = entry.status.write();
        status.healthy = true;
        status.latency = Some(latency);
        status.error_rate = Some(entry.breaker.stats().failure_rate);
        status.last_checked = Utc::now();
        status.message = None;
    }

    /// Record a failed request outcome.
    pub fn record_failure(&self, provider: &str, error: &GatewayError) {
        let entry = self.entry(provider);
        entry.breaker.record_failure();
        debug!(provider = provider, code = error.code(), "Recorded provider failure");

        let mut status = entry.status.write();
        status.healthy = false;
        status.error_rate = Some(entry.breaker.stats().failure_rate);
        status.last_checked = Utc::now();
        status.message = Some(error.to_string());
    }

    /// Non-consuming eligibility check used by the router. Providers never
    /// seen before are eligible.
    #[must_use]
    pub fn is_eligible(&self, provider: &str) -> bool {
        self.providers
            .get(provider)
            .map_or(true, |entry| entry.breaker.is_eligible())
    }

    /// Current circuit state for a provider.
    #[must_use]
    pub fn circuit_state(&self, provider: &str) -> CircuitState {
        self.providers
            .get(provider)
            .map_or(CircuitState::Closed, |entry| entry.breaker.state())
    }

    /// Last-known health snapshot for a provider.
    #[must_use]
    pub fn status(&self, provider: &str) -> Option<HealthStatus> {
        self.providers
            .get(provider)
            .map(|entry| entry.status.read().clone())
    }

    /// Last-known probe/request latency, used for performance ranking.
    #[must_use]
    pub fn latency(&self, provider: &str) -> Option<Duration> {
        self.providers
            .get(provider)
            .and_then(|entry| entry.status.read().latency)
    }

    /// Apply a probe result. Refreshes the snapshot only; probes never flip
    /// the circuit.
    pub fn apply_probe(&self, provider: &str, probe: HealthStatus) {
        let entry = self.entry(provider);
        let mut status = entry.status.write();
        status.healthy = probe.healthy;
        if probe.latency.is_some() {
            status.latency = probe.latency;
        }
        status.last_checked = probe.last_checked;
        status.message = probe.message;
    }

    /// Reset a provider's circuit to closed.
    pub fn reset(&self, provider: &str) {
        if let Some(entry) = self.providers.get(provider) {
            entry.breaker.reset();
        }
    }

    /// Run one probe cycle across the given adapters.
    pub async fn probe_all(&self, adapters: &[Arc<dyn ProviderAdapter>]) {
        for adapter in adapters {
            let name = adapter.provider_name().to_owned();
            let probe = adapter.health().await;
            if !probe.healthy {
                warn!(
                    provider = %name,
                    message = probe.message.as_deref().unwrap_or(""),
                    "Health probe failed"
                );
            }
            self.apply_probe(&name, probe);
        }
    }

    /// Spawn the periodic probe loop.
    ///
    /// The loop runs until the returned handle is aborted.
    #[must_use]
    pub fn spawn_probe_loop(
        self: &Arc<Self>,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
    ) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        let interval = monitor.config.probe_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.probe_all(&adapters).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use broker_core::{
        AdapterCapabilities, AdapterDescriptor, CostEstimate, GenerateRequest, GenerateResult,
        ModelId, ProviderId, QuotaStatus, RateLimitInfo, RawProviderError,
    };

    struct ProbeOnlyAdapter {
        descriptor: AdapterDescriptor,
        healthy: bool,
    }

    impl ProbeOnlyAdapter {
        fn new(name: &str, healthy: bool) -> Self {
            Self {
                descriptor: AdapterDescriptor {
                    provider: ProviderId::new(name).expect("valid id"),
                    model: ModelId::new("probe-model").expect("valid id"),
                    capabilities: AdapterCapabilities::default(),
                },
                healthy,
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for ProbeOnlyAdapter {
        fn descriptor(&self) -> &AdapterDescriptor {
            &self.descriptor
        }

        async fn generate(
            &self,
            _request: &GenerateRequest,
        ) -> Result<GenerateResult, RawProviderError> {
            Err(RawProviderError::transport("not implemented"))
        }

        async fn health(&self) -> HealthStatus {
            if self.healthy {
                HealthStatus::healthy(Duration::from_millis(7))
            } else {
                HealthStatus::unhealthy("probe refused")
            }
        }

        fn estimate_cost(&self, _request: &GenerateRequest) -> CostEstimate {
            CostEstimate::zero()
        }

        async fn check_quota(&self) -> QuotaStatus {
            QuotaStatus::unmetered()
        }

        fn rate_limit(&self) -> RateLimitInfo {
            RateLimitInfo::unlimited()
        }
    }

    fn failure() -> GatewayError {
        GatewayError::timeout("x", Duration::from_secs(1))
    }

    #[test]
    fn test_unknown_provider_admitted() {
        let monitor = HealthMonitor::with_defaults();
        assert!(monitor.admit("never-seen").is_ok());
        assert_eq!(monitor.circuit_state("never-seen"), CircuitState::Closed);
    }

    #[test]
    fn test_failures_open_circuit_and_exclude() {
        let monitor = HealthMonitor::new(HealthMonitorConfig {
            breaker: CircuitBreakerConfig {
                consecutive_failures: 3,
                min_requests: 100,
                ..Default::default()
            },
            ..Default::default()
        });

        for _ in 0..3 {
            monitor.record_failure("openai", &failure());
        }
        assert_eq!(monitor.circuit_state("openai"), CircuitState::Open);
        assert!(monitor.admit("openai").is_err());

        // Unrelated provider is unaffected.
        assert!(monitor.admit("anthropic").is_ok());
    }

    #[test]
    fn test_success_updates_latency() {
        let monitor = HealthMonitor::with_defaults();
        monitor.record_success("openai", Duration::from_millis(120));
        assert_eq!(monitor.latency("openai"), Some(Duration::from_millis(120)));
        let status = monitor.status("openai").expect("status exists");
        assert!(status.healthy);
    }

    #[tokio::test]
    async fn test_probe_does_not_flip_circuit() {
        let monitor = Arc::new(HealthMonitor::new(HealthMonitorConfig {
            breaker: CircuitBreakerConfig {
                consecutive_failures: 2,
                min_requests: 100,
                cooldown: Duration::from_secs(3600),
                ..Default::default()
            },
            ..Default::default()
        }));

        monitor.record_failure("openai", &failure());
        monitor.record_failure("openai", &failure());
        assert_eq!(monitor.circuit_state("openai"), CircuitState::Open);

        // A healthy probe refreshes the snapshot but the circuit stays open.
        let adapters: Vec<Arc<dyn ProviderAdapter>> =
            vec![Arc::new(ProbeOnlyAdapter::new("openai", true))];
        monitor.probe_all(&adapters).await;

        let status = monitor.status("openai").expect("status exists");
        assert!(status.healthy);
        assert_eq!(status.latency, Some(Duration::from_millis(7)));
        assert_eq!(monitor.circuit_state("openai"), CircuitState::Open);
        assert!(monitor.admit("openai").is_err());
    }

    #[tokio::test]
    async fn test_unhealthy_probe_recorded() {
        let monitor = Arc::new(HealthMonitor::with_defaults());
        let adapters: Vec<Arc<dyn ProviderAdapter>> =
            vec![Arc::new(ProbeOnlyAdapter::new("flaky", false))];
        monitor.probe_all(&adapters).await;

        let status = monitor.status("flaky").expect("status exists");
        assert!(!status.healthy);
        assert_eq!(status.message.as_deref(), Some("probe refused"));
        // Probe failures do not open the circuit either.
        assert_eq!(monitor.circuit_state("flaky"), CircuitState::Closed);
    }
}
