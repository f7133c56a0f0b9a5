//! # LLM Broker
//!
//! Resilient multi-provider text-generation broker: policy routing, circuit
//! breaking, sequential fallback, and cost tracking behind one facade.
//!
//! ## Usage
//!
//! ```bash
//! # One-shot generation with the default config search path
//! llm-broker "Explain borrowing in one paragraph"
//!
//! # Explicit config file
//! llm-broker --config broker.yaml "Hello"
//!
//! # Environment override for the config path
//! LLM_BROKER_CONFIG=broker.yaml llm-broker "Hello"
//! ```
//!
//! The result (or error) is printed as a JSON envelope on stdout; logs go to
//! stderr.

use anyhow::{bail, Context};
use broker_config::{BrokerConfig, ProviderKind, ProviderSettings};
use broker_core::{
    ErrorEnvelope, GenerateRequest, ModelPricing, ProviderAdapter, RateLimitInfo, SuccessEnvelope,
};
use broker_gateway::{Gateway, MemoryCache, OrchestratorConfig};
use broker_providers::{
    AdapterRegistry, LocalAdapter, OpenAiCompatibleAdapter, OpenAiCompatibleConfig,
};
use broker_resilience::{
    CircuitBreakerConfig, HealthMonitor, HealthMonitorConfig, QuotaTracker, RatePacer,
};
use broker_routing::{PolicyRouter, RouterConfig};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{error, info, warn};

const CONFIG_ENV: &str = "LLM_BROKER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "broker.yaml";

/// Application entry point
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting LLM broker");

    if let Err(e) = run().await {
        error!(error = %e, "Broker failed");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run() -> anyhow::Result<()> {
    let (config_path, prompt) = parse_args()?;

    let config = load_config(config_path.as_deref())?;
    let registry = build_registry(&config)?;
    let adapters = registry.all();
    info!(providers = registry.len(), "Provider fleet initialized");

    let health = Arc::new(HealthMonitor::new(HealthMonitorConfig {
        breaker: CircuitBreakerConfig {
            consecutive_failures: config.circuit_breaker.consecutive_failures,
            window_size: config.circuit_breaker.window_size,
            failure_rate_threshold: config.circuit_breaker.failure_rate_threshold,
            min_requests: config.circuit_breaker.min_requests,
            cooldown: config.circuit_breaker.cooldown,
            backoff_multiplier: config.circuit_breaker.backoff_multiplier,
            max_cooldown: config.circuit_breaker.max_cooldown,
        },
        probe_interval: config.health.probe_interval,
    }));
    let quota = Arc::new(QuotaTracker::with_defaults());

    let router = Arc::new(PolicyRouter::new(
        RouterConfig {
            default_policy: config.routing.default_policy,
            fallback_chain: config.routing.fallback_chain.clone(),
            quality_tiers: config.quality_tiers(),
        },
        Arc::clone(&health),
        Arc::clone(&quota),
    ));
    for adapter in &adapters {
        router.register(Arc::clone(adapter));
    }

    let pacer = Arc::new(RatePacer::new());
    for adapter in &adapters {
        pacer.register(adapter.provider_name(), adapter.rate_limit());
    }

    let quota_loop = spawn_quota_loop(Arc::clone(&quota), adapters.clone());
    let probe_loop = health.spawn_probe_loop(adapters);

    let mut builder = Gateway::builder()
        .router(router)
        .health(health)
        .pacer(pacer)
        .orchestrator_config(OrchestratorConfig {
            attempt_timeout: config.orchestrator.attempt_timeout,
        });
    if config.cache.enabled {
        builder = builder.cache(Arc::new(MemoryCache::new(config.cache.max_entries)));
    }
    let gateway = builder.build()?;

    let request = GenerateRequest::builder().prompt(prompt).build()?;
    let outcome = gateway.handle(&request).await;
    probe_loop.abort();
    quota_loop.abort();

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&SuccessEnvelope::new(result))?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&ErrorEnvelope::from(&err))?);
            std::process::exit(1);
        }
    }
}

/// Periodically refresh advisory quota snapshots for the whole fleet.
/// Snapshots still within the tracker's TTL (e.g. recorded from response
/// headers) are left alone.
fn spawn_quota_loop(
    quota: Arc<QuotaTracker>,
    adapters: Vec<Arc<dyn ProviderAdapter>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(10));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for adapter in &adapters {
                if !quota.is_fresh(adapter.provider_name()) {
                    quota.refresh(adapter.as_ref()).await;
                }
            }
        }
    })
}

/// Parse `[--config <path>] <prompt...>` from argv.
fn parse_args() -> anyhow::Result<(Option<String>, String)> {
    let mut args = std::env::args().skip(1);
    let mut config_path = std::env::var(CONFIG_ENV).ok();
    let mut prompt_parts = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--config" {
            config_path = Some(
                args.next()
                    .context("--config requires a path argument")?,
            );
        } else {
            prompt_parts.push(arg);
        }
    }

    if prompt_parts.is_empty() {
        bail!("usage: llm-broker [--config <path>] <prompt>");
    }
    Ok((config_path, prompt_parts.join(" ")))
}

/// Load the config file, falling back to a local echo fleet when none exists.
fn load_config(path: Option<&str>) -> anyhow::Result<BrokerConfig> {
    if let Some(path) = path {
        return BrokerConfig::from_file(path)
            .with_context(|| format!("loading config from {path}"));
    }

    if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() {
        return BrokerConfig::from_file(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("loading config from {DEFAULT_CONFIG_PATH}"));
    }

    warn!("No config file found, using a local echo provider");
    BrokerConfig::from_yaml(
        r"
providers:
  - name: local-echo
    kind: local
    model: echo-1
",
    )
    .context("building fallback config")
}

/// Build one adapter per enabled provider entry.
fn build_registry(config: &BrokerConfig) -> anyhow::Result<AdapterRegistry> {
    let registry = AdapterRegistry::new();

    for entry in config.enabled_providers() {
        let adapter = build_adapter(entry, config.effective_pricing(entry))
            .with_context(|| format!("building provider '{}'", entry.name))?;
        registry.register(adapter)?;
    }

    Ok(registry)
}

fn build_adapter(
    entry: &ProviderSettings,
    pricing: Option<ModelPricing>,
) -> anyhow::Result<Arc<dyn ProviderAdapter>> {
    match entry.kind {
        ProviderKind::OpenaiCompatible => {
            let api_key = entry.resolve_api_key()?;
            let mut config = OpenAiCompatibleConfig::new(
                &entry.name,
                &entry.model,
                api_key.expose_secret().as_str(),
            );
            if let Some(base_url) = &entry.base_url {
                config = config.with_base_url(base_url);
            }
            if let Some(pricing) = pricing {
                config = config.with_pricing(pricing);
            }
            if entry.requests_per_minute > 0 {
                config = config.with_rate_limit(RateLimitInfo {
                    requests_per_minute: entry.requests_per_minute,
                    requests_per_day: 0,
                });
            }
            Ok(Arc::new(OpenAiCompatibleAdapter::new(config)?))
        }
        ProviderKind::Local => {
            let mut builder = LocalAdapter::builder(&entry.name, &entry.model);
            if let Some(pricing) = pricing {
                builder = builder.pricing(pricing);
            }
            Ok(Arc::new(builder.build()?))
        }
    }
}
