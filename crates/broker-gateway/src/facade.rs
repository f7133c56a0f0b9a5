//! The gateway facade.
//!
//! One entry point per process: validate, consult the cache, route, execute
//! with fallback, record metrics, store the result. Callers only ever see
//! [`GenerateResult`] or a [`GatewayError`]; cache and metrics are invisible
//! side effects.

use crate::cache::{request_fingerprint, ResponseCache};
use crate::metrics::{GatewayMetrics, MetricsSnapshot};
use crate::orchestrator::{FallbackOrchestrator, OrchestratorConfig};
use broker_core::{GatewayError, GatewayResult, GenerateRequest, GenerateResult};
use broker_resilience::{HealthMonitor, RatePacer};
use broker_routing::PolicyRouter;
use std::sync::Arc;
use tracing::{debug, info};

/// The broker's request pipeline.
pub struct Gateway {
    router: Arc<PolicyRouter>,
    orchestrator: FallbackOrchestrator,
    metrics: Arc<GatewayMetrics>,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl Gateway {
    /// Start building a gateway.
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    /// Handle one generation request end to end.
    ///
    /// # Errors
    /// Any [`GatewayError`]: invalid input, routing failure, or the
    /// (possibly aggregated) outcome of failed provider attempts.
    pub async fn handle(&self, request: &GenerateRequest) -> GatewayResult<GenerateResult> {
        self.metrics.record_request();
        if let Err(error) = request.validate() {
            self.metrics.record_failure(&error);
            return Err(error);
        }

        let cache_key = if request.use_cache && self.cache.is_some() {
            Some(request_fingerprint(request))
        } else {
            None
        };

        if let (Some(key), Some(cache)) = (&cache_key, &self.cache) {
            if let Some(mut hit) = cache.get(key).await {
                hit.cached = true;
                self.metrics.record_cache_hit();
                debug!(request_id = %request.id, "Serving cached result");
                return Ok(hit);
            }
        }

        let candidates = match self.router.candidates(request) {
            Ok(candidates) => candidates,
            Err(error) => {
                self.metrics.record_failure(&error);
                return Err(error);
            }
        };

        match self.orchestrator.execute(&candidates, request).await {
            Ok(result) => {
                self.metrics.record_success(&result);
                info!(
                    request_id = %request.id,
                    provider = %result.provider,
                    model = %result.model,
                    latency_ms = result.latency.as_millis() as u64,
                    "Request completed"
                );
                if let (Some(key), Some(cache)) = (&cache_key, &self.cache) {
                    cache.put(key, &result).await;
                }
                Ok(result)
            }
            Err(error) => {
                self.metrics.record_failure(&error);
                Err(error)
            }
        }
    }

    /// Current gateway counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Builder for [`Gateway`].
#[derive(Default)]
pub struct GatewayBuilder {
    router: Option<Arc<PolicyRouter>>,
    health: Option<Arc<HealthMonitor>>,
    pacer: Option<Arc<RatePacer>>,
    cache: Option<Arc<dyn ResponseCache>>,
    orchestrator_config: OrchestratorConfig,
}

impl GatewayBuilder {
    /// Set the policy router (required).
    #[must_use]
    pub fn router(mut self, router: Arc<PolicyRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Set the health monitor (required). Must be the same instance the
    /// router filters on, or circuit state and routing will disagree.
    #[must_use]
    pub fn health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    /// Attach a local rate pacer.
    #[must_use]
    pub fn pacer(mut self, pacer: Arc<RatePacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Attach a response cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Override the orchestrator configuration.
    #[must_use]
    pub fn orchestrator_config(mut self, config: OrchestratorConfig) -> Self {
        self.orchestrator_config = config;
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    /// Returns an error if the router or health monitor is missing.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let router = self
            .router
            .ok_or_else(|| GatewayError::internal("gateway requires a router"))?;
        let health = self
            .health
            .ok_or_else(|| GatewayError::internal("gateway requires a health monitor"))?;

        let mut orchestrator = FallbackOrchestrator::new(health, self.orchestrator_config);
        if let Some(pacer) = self.pacer {
            orchestrator = orchestrator.with_pacer(pacer);
        }

        Ok(Gateway {
            router,
            orchestrator,
            metrics: Arc::new(GatewayMetrics::new()),
            cache: self.cache,
        })
    }
}
