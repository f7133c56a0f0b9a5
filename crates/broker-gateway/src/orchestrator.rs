//! Sequential fallback execution.
//!
//! The orchestrator walks the router's candidate list strictly in order, one
//! attempt in flight at a time. Each attempt gets a deadline of
//! `min(remaining total budget, per-attempt cap)`; the first success wins and
//! later candidates are never contacted. Every attempt outcome is reported to
//! the health monitor before the next candidate is tried.

use broker_core::{
    normalize, AttemptError, GatewayError, GatewayResult, GenerateRequest, GenerateResult,
    ProviderAdapter,
};
use broker_resilience::{HealthMonitor, RatePacer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on any single attempt, regardless of remaining budget
    pub attempt_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

/// Executes one candidate list sequentially with per-attempt deadlines.
pub struct FallbackOrchestrator {
    health: Arc<HealthMonitor>,
    pacer: Option<Arc<RatePacer>>,
    config: OrchestratorConfig,
}

impl FallbackOrchestrator {
    /// Create an orchestrator reporting outcomes to the given monitor.
    #[must_use]
    pub fn new(health: Arc<HealthMonitor>, config: OrchestratorConfig) -> Self {
        Self {
            health,
            pacer: None,
            config,
        }
    }

    /// Attach a local rate pacer consulted before each dispatch.
    #[must_use]
    pub fn with_pacer(mut self, pacer: Arc<RatePacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Execute the request against the candidates, in order.
    ///
    /// Returns the first successful result. With `allow_fallback` disabled
    /// the first failure is surfaced as-is; otherwise exhaustion of the list
    /// yields `AllProvidersFailed` carrying one entry per attempt.
    ///
    /// # Errors
    /// Any [`GatewayError`]; raw provider failures never escape unnormalized.
    pub async fn execute(
        &self,
        candidates: &[Arc<dyn ProviderAdapter>],
        request: &GenerateRequest,
    ) -> GatewayResult<GenerateResult> {
        let deadline = Instant::now() + request.timeout;
        let mut attempt_errors: Vec<AttemptError> = Vec::new();

        for adapter in candidates {
            let provider = adapter.provider_name().to_owned();

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                // Total budget spent before this candidate could be tried.
                let error = GatewayError::timeout(&provider, request.timeout);
                if !request.allow_fallback {
                    return Err(error);
                }
                attempt_errors.push(AttemptError::new(&provider, error));
                break;
            }

            // Local pacing: denied slots are not provider failures, so the
            // monitor is not told about them.
            if let Some(pacer) = &self.pacer {
                if !pacer.try_acquire(&provider) {
                    let error = GatewayError::RateLimitExceeded {
                        provider: provider.clone(),
                        retry_after: None,
                    };
                    debug!(provider = %provider, request_id = %request.id, "Paced out");
                    if !request.allow_fallback {
                        return Err(error);
                    }
                    attempt_errors.push(AttemptError::new(&provider, error));
                    continue;
                }
            }

            // Consume the circuit's admission (and the single half-open trial
            // slot) only now, at the moment of dispatch.
            if let Err(error) = self.health.admit(&provider) {
                debug!(
                    provider = %provider,
                    request_id = %request.id,
                    "Skipping candidate, not admitted"
                );
                if !request.allow_fallback {
                    return Err(error);
                }
                attempt_errors.push(AttemptError::new(&provider, error));
                continue;
            }

            let budget = remaining.min(self.config.attempt_timeout);
            let started = Instant::now();
            debug!(
                provider = %provider,
                request_id = %request.id,
                budget_ms = budget.as_millis() as u64,
                attempt = attempt_errors.len() + 1,
                "Dispatching attempt"
            );

            let error = match tokio::time::timeout(budget, adapter.generate(request)).await {
                Ok(Ok(mut result)) => {
                    let latency = started.elapsed();
                    result.latency = latency;
                    self.health.record_success(&provider, latency);
                    debug!(
                        provider = %provider,
                        request_id = %request.id,
                        latency_ms = latency.as_millis() as u64,
                        "Attempt succeeded"
                    );
                    return Ok(result);
                }
                Ok(Err(raw)) => normalize(&provider, &raw),
                Err(_elapsed) => GatewayError::timeout(&provider, budget),
            };

            self.health.record_failure(&provider, &error);
            warn!(
                provider = %provider,
                request_id = %request.id,
                code = error.code(),
                "Attempt failed"
            );

            if !request.allow_fallback {
                return Err(error);
            }
            attempt_errors.push(AttemptError::new(&provider, error));
        }

        Err(GatewayError::all_failed(attempt_errors))
    }
}
