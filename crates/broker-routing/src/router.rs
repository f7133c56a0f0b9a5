//! The policy router.
//!
//! Produces an ordered candidate list for one request. Eligibility filtering
//! (open circuits, exhausted quota) happens before any ranking; an empty
//! result fails fast with `NoAdapterFound` rather than falling through to an
//! arbitrary choice.

use broker_core::{GatewayError, GenerateRequest, ProviderAdapter, RoutingPolicy};
use broker_resilience::{HealthMonitor, QuotaTracker};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Policy applied when the request does not choose one
    pub default_policy: RoutingPolicy,
    /// Fixed priority order for the fallback-chain policy
    pub fallback_chain: Vec<String>,
    /// Static quality tier per provider (higher is better)
    pub quality_tiers: HashMap<String, u8>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_policy: RoutingPolicy::FallbackChain,
            fallback_chain: Vec::new(),
            quality_tiers: HashMap::new(),
        }
    }
}

/// Chooses an ordered candidate list of adapters per request.
///
/// The rotating round-robin index is the only mutable shared state here; it
/// is advanced atomically, independent of any per-provider lock.
pub struct PolicyRouter {
    config: RouterConfig,
    adapters: RwLock<Vec<Arc<dyn ProviderAdapter>>>,
    health: Arc<HealthMonitor>,
    quota: Arc<QuotaTracker>,
    round_robin: AtomicUsize,
}

impl PolicyRouter {
    /// Create a router over the given health and quota trackers.
    #[must_use]
    pub fn new(config: RouterConfig, health: Arc<HealthMonitor>, quota: Arc<QuotaTracker>) -> Self {
        Self {
            config,
            adapters: RwLock::new(Vec::new()),
            health,
            quota,
            round_robin: AtomicUsize::new(0),
        }
    }

    /// Register an adapter as a routing candidate.
    pub fn register(&self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.write().push(adapter);
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.read().len()
    }

    /// Whether no adapters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.read().is_empty()
    }

    /// Produce the ordered candidate list for a request.
    ///
    /// # Errors
    /// - `ModelNotFound` / `NoAdapterFound` when a user preference cannot be
    ///   satisfied and fallback is not allowed
    /// - `ProviderUnavailable` when the preferred provider is excluded by its
    ///   circuit or quota and fallback is not allowed
    /// - `NoAdapterFound` when filtering leaves no eligible candidate
    pub fn candidates(
        &self,
        request: &GenerateRequest,
    ) -> Result<Vec<Arc<dyn ProviderAdapter>>, GatewayError> {
        let policy = self.effective_policy(request);
        debug!(policy = %policy, request_id = %request.id, "Routing request");

        if policy == RoutingPolicy::UserPreference {
            return self.user_preference(request);
        }

        let mut eligible = self.eligible();
        if eligible.is_empty() {
            return Err(GatewayError::no_adapter(
                "no eligible provider (all circuits open, quota exhausted, or none registered)",
            ));
        }

        self.rank(policy, request, &mut eligible);
        Ok(eligible)
    }

    /// The policy that applies to this request.
    #[must_use]
    pub fn effective_policy(&self, request: &GenerateRequest) -> RoutingPolicy {
        request.routing_policy.unwrap_or({
            if request.use_user_preference {
                RoutingPolicy::UserPreference
            } else {
                self.config.default_policy
            }
        })
    }

    /// Eligible adapters: circuit not open, quota not exhausted.
    fn eligible(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.adapters
            .read()
            .iter()
            .filter(|adapter| {
                let name = adapter.provider_name();
                self.health.is_eligible(name) && !self.quota.is_exhausted(name)
            })
            .cloned()
            .collect()
    }

    fn user_preference(
        &self,
        request: &GenerateRequest,
    ) -> Result<Vec<Arc<dyn ProviderAdapter>>, GatewayError> {
        let preferred = {
            let adapters = self.adapters.read();
            request
                .provider
                .as_deref()
                .and_then(|name| {
                    adapters
                        .iter()
                        .find(|a| a.provider_name() == name)
                        .cloned()
                })
                .or_else(|| {
                    request.model.as_deref().and_then(|model| {
                        adapters.iter().find(|a| a.model_name() == model).cloned()
                    })
                })
        };

        match preferred {
            Some(adapter) => {
                let name = adapter.provider_name().to_owned();
                if self.health.is_eligible(&name) && !self.quota.is_exhausted(&name) {
                    return Ok(vec![adapter]);
                }
                if request.allow_fallback {
                    // Safety net: fall through to the fallback chain without
                    // the excluded preference.
                    let mut eligible = self.eligible();
                    eligible.retain(|a| a.provider_name() != name);
                    if eligible.is_empty() {
                        return Err(GatewayError::no_adapter(
                            "preferred provider excluded and no fallback candidate is eligible",
                        ));
                    }
                    self.rank(RoutingPolicy::FallbackChain, request, &mut eligible);
                    return Ok(eligible);
                }
                Err(GatewayError::unavailable(
                    name,
                    "excluded by circuit breaker or quota",
                ))
            }
            None => {
                if request.allow_fallback {
                    let mut eligible = self.eligible();
                    if eligible.is_empty() {
                        return Err(GatewayError::no_adapter("no eligible provider"));
                    }
                    self.rank(RoutingPolicy::FallbackChain, request, &mut eligible);
                    return Ok(eligible);
                }
                match (&request.model, &request.provider) {
                    (Some(model), _) => {
                        Err(GatewayError::model_not_found(model.clone(), None))
                    }
                    (None, Some(provider)) => Err(GatewayError::no_adapter(format!(
                        "provider '{provider}' is not registered"
                    ))),
                    (None, None) => Err(GatewayError::no_adapter(
                        "user preference requested without a model or provider",
                    )),
                }
            }
        }
    }

    fn rank(
        &self,
        policy: RoutingPolicy,
        request: &GenerateRequest,
        eligible: &mut Vec<Arc<dyn ProviderAdapter>>,
    ) {
        match policy {
            RoutingPolicy::UserPreference => {
                // Handled before ranking; nothing to order here.
            }
            RoutingPolicy::CostOptimized => {
                eligible.sort_by(|a, b| Self::cost_order(a.as_ref(), b.as_ref(), request));
            }
            RoutingPolicy::Performance => {
                eligible.sort_by(|a, b| {
                    let la = self.health.latency(a.provider_name());
                    let lb = self.health.latency(b.provider_name());
                    Self::latency_order(la, lb)
                        .then_with(|| a.provider_name().cmp(b.provider_name()))
                });
            }
            RoutingPolicy::Quality => {
                eligible.sort_by(|a, b| {
                    let ta = self.quality_tier(a.provider_name());
                    let tb = self.quality_tier(b.provider_name());
                    tb.cmp(&ta)
                        .then_with(|| Self::cost_order(a.as_ref(), b.as_ref(), request))
                });
            }
            RoutingPolicy::RoundRobin => {
                eligible.sort_by(|a, b| a.provider_name().cmp(b.provider_name()));
                let offset = self.round_robin.fetch_add(1, AtomicOrdering::Relaxed);
                let len = eligible.len();
                eligible.rotate_left(offset % len);
            }
            RoutingPolicy::FallbackChain => {
                eligible.sort_by(|a, b| {
                    self.chain_position(a.provider_name())
                        .cmp(&self.chain_position(b.provider_name()))
                        .then_with(|| a.provider_name().cmp(b.provider_name()))
                });
            }
        }
    }

    /// Ascending cost; ties broken by declared max_tokens (smaller first)
    /// then provider name.
    fn cost_order(
        a: &dyn ProviderAdapter,
        b: &dyn ProviderAdapter,
        request: &GenerateRequest,
    ) -> Ordering {
        let ca = a.estimate_cost(request).amount;
        let cb = b.estimate_cost(request).amount;
        ca.partial_cmp(&cb)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.descriptor()
                    .capabilities
                    .max_tokens
                    .cmp(&b.descriptor().capabilities.max_tokens)
            })
            .then_with(|| a.provider_name().cmp(b.provider_name()))
    }

    /// Ascending latency; unknown latency sorts last.
    fn latency_order(a: Option<Duration>, b: Option<Duration>) -> Ordering {
        match (a, b) {
            (Some(la), Some(lb)) => la.cmp(&lb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn quality_tier(&self, provider: &str) -> u8 {
        self.config.quality_tiers.get(provider).copied().unwrap_or(0)
    }

    /// Position in the configured chain; unlisted providers sort after all
    /// listed ones.
    fn chain_position(&self, provider: &str) -> usize {
        self.config
            .fallback_chain
            .iter()
            .position(|name| name == provider)
            .unwrap_or(usize::MAX)
    }
}
