//! End-to-end tests over the full pipeline: router, circuit breakers,
//! orchestrator, and facade wired together with deterministic local adapters.

use broker_core::{
    GatewayError, GenerateRequest, ModelPricing, ProviderAdapter, RawProviderError, RoutingPolicy,
};
use broker_gateway::{Gateway, MemoryCache, OrchestratorConfig};
use broker_providers::LocalAdapter;
use broker_resilience::{
    CircuitBreakerConfig, CircuitState, HealthMonitor, HealthMonitorConfig, QuotaTracker,
};
use broker_routing::{PolicyRouter, RouterConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    gateway: Gateway,
    health: Arc<HealthMonitor>,
    quota: Arc<QuotaTracker>,
}

fn harness(router_config: RouterConfig, adapters: &[Arc<LocalAdapter>]) -> Harness {
    // Consecutive-failure path only, long cooldown so tests control timing.
    let health = Arc::new(HealthMonitor::new(HealthMonitorConfig {
        breaker: CircuitBreakerConfig {
            consecutive_failures: 3,
            min_requests: 1000,
            cooldown: Duration::from_secs(3600),
            ..Default::default()
        },
        ..Default::default()
    }));
    let quota = Arc::new(QuotaTracker::with_defaults());
    let router = Arc::new(PolicyRouter::new(
        router_config,
        Arc::clone(&health),
        Arc::clone(&quota),
    ));
    for adapter in adapters {
        router.register(Arc::clone(adapter) as Arc<dyn ProviderAdapter>);
    }

    let gateway = Gateway::builder()
        .router(router)
        .health(Arc::clone(&health))
        .cache(Arc::new(MemoryCache::default()))
        .orchestrator_config(OrchestratorConfig {
            attempt_timeout: Duration::from_secs(5),
        })
        .build()
        .expect("gateway builds");

    Harness {
        gateway,
        health,
        quota,
    }
}

fn adapter(name: &str, input_per_1k: f64) -> Arc<LocalAdapter> {
    Arc::new(
        LocalAdapter::builder(name, format!("{name}-model"))
            .pricing(ModelPricing::new(input_per_1k, input_per_1k * 2.0))
            .build()
            .expect("build adapter"),
    )
}

fn request(prompt: &str) -> GenerateRequest {
    GenerateRequest::builder()
        .prompt(prompt)
        .build()
        .expect("valid request")
}

#[tokio::test]
async fn cost_optimized_routes_to_cheapest() {
    let pricey = adapter("pricey", 0.06);
    let cheap = adapter("cheap", 0.001);
    let medium = adapter("medium", 0.01);
    let h = harness(
        RouterConfig {
            default_policy: RoutingPolicy::CostOptimized,
            ..Default::default()
        },
        &[pricey, cheap, medium],
    );

    let result = h.gateway.handle(&request("Hi")).await.expect("succeeds");
    assert_eq!(result.provider, "cheap");
}

#[tokio::test]
async fn three_failures_open_circuit_and_divert_traffic() {
    let flaky = adapter("flaky", 0.001);
    let backup = adapter("backup", 0.06);
    let raw = RawProviderError::http(500, serde_json::json!({ "error": { "message": "boom" } }));
    flaky.push_failures(3, &raw);

    let h = harness(
        RouterConfig {
            default_policy: RoutingPolicy::CostOptimized,
            ..Default::default()
        },
        &[Arc::clone(&flaky), backup],
    );

    // Three requests: flaky is cheapest so it is tried first, fails, and
    // the backup completes each one.
    for _ in 0..3 {
        let result = h.gateway.handle(&request("Hi")).await.expect("succeeds");
        assert_eq!(result.provider, "backup");
    }
    assert_eq!(h.health.circuit_state("flaky"), CircuitState::Open);

    // Fourth request: flaky's script is empty (it would now succeed), but
    // the open circuit keeps it out of the candidate list entirely.
    let result = h.gateway.handle(&request("Hi")).await.expect("succeeds");
    assert_eq!(result.provider, "backup");
}

#[tokio::test]
async fn round_robin_distributes_evenly() {
    let alpha = adapter("alpha", 0.01);
    let bravo = adapter("bravo", 0.01);
    let charlie = adapter("charlie", 0.01);
    let h = harness(
        RouterConfig {
            default_policy: RoutingPolicy::RoundRobin,
            ..Default::default()
        },
        &[alpha, bravo, charlie],
    );

    let mut wins: HashMap<String, usize> = HashMap::new();
    for _ in 0..9 {
        let result = h.gateway.handle(&request("Hi")).await.expect("succeeds");
        *wins.entry(result.provider).or_default() += 1;
    }

    assert_eq!(wins.len(), 3);
    for count in wins.values() {
        assert_eq!(*count, 3);
    }
}

#[tokio::test]
async fn exhaustion_reports_one_error_per_candidate() {
    let alpha = adapter("alpha", 0.001);
    let bravo = adapter("bravo", 0.01);
    let charlie = adapter("charlie", 0.06);
    let raw = RawProviderError::with_code("ECONNREFUSED", "connection refused");
    alpha.push_failure(raw.clone());
    bravo.push_failure(raw.clone());
    charlie.push_failure(raw);

    let h = harness(
        RouterConfig {
            default_policy: RoutingPolicy::CostOptimized,
            ..Default::default()
        },
        &[alpha, bravo, charlie],
    );

    let error = h
        .gateway
        .handle(&request("Hi"))
        .await
        .expect_err("everything fails");

    match error {
        GatewayError::AllProvidersFailed {
            attempts,
            provider_errors,
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(provider_errors.len(), 3);
            // Attempt order follows the cost ranking.
            let order: Vec<&str> = provider_errors
                .iter()
                .map(|e| e.provider.as_str())
                .collect();
            assert_eq!(order, vec!["alpha", "bravo", "charlie"]);
            for attempt in &provider_errors {
                assert_eq!(attempt.error.code(), "PROVIDER_UNAVAILABLE");
            }
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn open_circuit_with_no_fallback_fails_without_dispatch() {
    let preferred = adapter("preferred", 0.01);
    // Any dispatch would consume this scripted failure.
    preferred.push_failure(RawProviderError::transport("must not be reached"));
    let other = adapter("other", 0.01);

    let h = harness(RouterConfig::default(), &[Arc::clone(&preferred), other]);
    for _ in 0..3 {
        h.health.record_failure(
            "preferred",
            &GatewayError::timeout("preferred", Duration::from_secs(1)),
        );
    }
    assert_eq!(h.health.circuit_state("preferred"), CircuitState::Open);

    let req = GenerateRequest::builder()
        .prompt("Hi")
        .use_user_preference(true)
        .provider("preferred")
        .allow_fallback(false)
        .build()
        .expect("valid request");

    let error = h.gateway.handle(&req).await.expect_err("fails fast");
    assert_eq!(error.code(), "PROVIDER_UNAVAILABLE");

    // The adapter was never called: its script is still queued.
    let direct = preferred.generate(&request("probe")).await;
    assert!(direct.is_err());
}

#[tokio::test]
async fn two_timeouts_then_success_lands_on_third_provider() {
    let alpha = adapter("alpha", 0.001);
    let bravo = adapter("bravo", 0.01);
    let charlie = adapter("charlie", 0.06);
    alpha.push_failure(RawProviderError::timed_out());
    bravo.push_failure(RawProviderError::timed_out());

    let h = harness(
        RouterConfig {
            default_policy: RoutingPolicy::CostOptimized,
            ..Default::default()
        },
        &[alpha, bravo, charlie],
    );

    let result = h.gateway.handle(&request("Hi")).await.expect("succeeds");
    assert_eq!(result.provider, "charlie");

    // Each attempt outcome was recorded against the right provider.
    assert!(!h.health.status("alpha").expect("tracked").healthy);
    assert!(!h.health.status("bravo").expect("tracked").healthy);
    assert!(h.health.status("charlie").expect("tracked").healthy);
}

#[tokio::test]
async fn quota_exhaustion_excludes_without_opening_circuit() {
    let limited = adapter("limited", 0.001);
    let open_ended = adapter("open-ended", 0.06);
    let h = harness(
        RouterConfig {
            default_policy: RoutingPolicy::CostOptimized,
            ..Default::default()
        },
        &[limited, open_ended],
    );
    h.quota
        .record("limited", broker_core::QuotaStatus::metered(0.0, 100.0, None));

    let result = h.gateway.handle(&request("Hi")).await.expect("succeeds");
    assert_eq!(result.provider, "open-ended");
    // Quota is advisory: the circuit stays closed.
    assert_eq!(h.health.circuit_state("limited"), CircuitState::Closed);
}

#[tokio::test]
async fn fallback_chain_honors_configured_order() {
    let alpha = adapter("alpha", 0.001);
    let bravo = adapter("bravo", 0.06);
    let h = harness(
        RouterConfig {
            default_policy: RoutingPolicy::FallbackChain,
            fallback_chain: vec!["bravo".into(), "alpha".into()],
            ..Default::default()
        },
        &[alpha, bravo],
    );

    let result = h.gateway.handle(&request("Hi")).await.expect("succeeds");
    assert_eq!(result.provider, "bravo");
}

#[tokio::test]
async fn quality_policy_prefers_higher_tier() {
    let fancy = adapter("fancy", 0.06);
    let budget = adapter("budget", 0.001);
    let mut tiers = HashMap::new();
    tiers.insert("fancy".to_owned(), 3_u8);
    tiers.insert("budget".to_owned(), 1_u8);

    let h = harness(
        RouterConfig {
            default_policy: RoutingPolicy::Quality,
            quality_tiers: tiers,
            ..Default::default()
        },
        &[fancy, budget],
    );

    let result = h.gateway.handle(&request("Hi")).await.expect("succeeds");
    assert_eq!(result.provider, "fancy");
}
