//! Configuration schema and loading.
//!
//! The file is YAML. Every section has defaults, so the minimal valid config
//! is a `providers` list with at least one enabled entry. API keys are
//! resolved from the environment via `api_key_env` at startup; the file never
//! contains the key itself.

use broker_core::{ModelPricing, PricingTable, RoutingPolicy};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML for the schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The parsed config violates a semantic rule
    #[error("invalid config: {0}")]
    Invalid(String),

    /// A referenced environment variable is missing or unreadable
    #[error("environment variable '{0}' is not set")]
    MissingEnv(String),
}

/// Top-level broker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// The provider fleet
    pub providers: Vec<ProviderSettings>,

    /// Routing defaults
    #[serde(default)]
    pub routing: RoutingSettings,

    /// Circuit breaker tuning, applied to every provider
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Health probing
    #[serde(default)]
    pub health: HealthSettings,

    /// Fallback orchestration
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Response cache
    #[serde(default)]
    pub cache: CacheSettings,

    /// Per-model pricing lookup for provider entries without explicit pricing
    #[serde(default)]
    pub pricing: Option<PricingTable>,
}

/// What kind of adapter a provider entry builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// HTTP adapter speaking the OpenAI chat-completions dialect
    OpenaiCompatible,
    /// Deterministic in-process echo adapter
    Local,
}

/// One provider entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    /// Provider name, unique within the fleet
    pub name: String,

    /// Adapter kind
    pub kind: ProviderKind,

    /// Model served by this provider
    pub model: String,

    /// Environment variable holding the API key (HTTP adapters only)
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// API base URL override
    #[serde(default)]
    pub base_url: Option<String>,

    /// Pricing override for cost estimation; entries without one fall back
    /// to the top-level pricing table
    #[serde(default)]
    pub pricing: Option<ModelPricing>,

    /// Quality tier for the quality routing policy (higher is better)
    #[serde(default)]
    pub quality_tier: Option<u8>,

    /// Local pacing limit; zero means unlimited
    #[serde(default)]
    pub requests_per_minute: u32,

    /// Whether this entry participates in routing
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Routing defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingSettings {
    /// Policy applied when the request does not choose one
    #[serde(default = "default_policy")]
    pub default_policy: RoutingPolicy,

    /// Fixed priority order for the fallback-chain policy
    #[serde(default)]
    pub fallback_chain: Vec<String>,
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_consecutive_failures")]
    pub consecutive_failures: u32,

    /// Size of the sliding attempt window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Failure rate over the window that opens the circuit
    #[serde(default = "default_failure_rate")]
    pub failure_rate_threshold: f64,

    /// Minimum windowed attempts before the rate applies
    #[serde(default = "default_min_requests")]
    pub min_requests: u32,

    /// Open-state cooldown before a half-open trial
    #[serde(with = "humantime_serde", default = "default_cooldown")]
    pub cooldown: Duration,

    /// Cooldown growth factor on a failed half-open trial (1.0 disables)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on the grown cooldown
    #[serde(with = "humantime_serde", default = "default_max_cooldown")]
    pub max_cooldown: Duration,
}

/// Health probing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSettings {
    /// Interval between scheduled probes
    #[serde(with = "humantime_serde", default = "default_probe_interval")]
    pub probe_interval: Duration,
}

/// Fallback orchestration settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorSettings {
    /// Upper bound on any single attempt
    #[serde(with = "humantime_serde", default = "default_attempt_timeout")]
    pub attempt_timeout: Duration,
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Whether a cache is attached at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum cached entries
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

fn default_true() -> bool {
    true
}

const fn default_policy() -> RoutingPolicy {
    RoutingPolicy::FallbackChain
}

const fn default_consecutive_failures() -> u32 {
    3
}

const fn default_window_size() -> usize {
    5
}

const fn default_failure_rate() -> f64 {
    0.5
}

const fn default_min_requests() -> u32 {
    5
}

const fn default_cooldown() -> Duration {
    Duration::from_secs(30)
}

const fn default_backoff_multiplier() -> f64 {
    1.0
}

const fn default_max_cooldown() -> Duration {
    Duration::from_secs(300)
}

const fn default_probe_interval() -> Duration {
    Duration::from_secs(60)
}

const fn default_attempt_timeout() -> Duration {
    Duration::from_secs(15)
}

const fn default_cache_entries() -> usize {
    1024
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            default_policy: default_policy(),
            fallback_chain: Vec::new(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            consecutive_failures: default_consecutive_failures(),
            window_size: default_window_size(),
            failure_rate_threshold: default_failure_rate(),
            min_requests: default_min_requests(),
            cooldown: default_cooldown(),
            backoff_multiplier: default_backoff_multiplier(),
            max_cooldown: default_max_cooldown(),
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe_interval: default_probe_interval(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            attempt_timeout: default_attempt_timeout(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_cache_entries(),
        }
    }
}

impl BrokerConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    /// [`ConfigError`] on I/O, parse, or validation failure.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading broker config");
        Self::from_yaml(&contents)
    }

    /// Parse and validate config from a YAML string.
    ///
    /// # Errors
    /// [`ConfigError`] on parse or validation failure.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation beyond what serde enforces.
    ///
    /// # Errors
    /// `ConfigError::Invalid` describing the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled_providers().next().is_none() {
            return Err(ConfigError::Invalid(
                "at least one enabled provider is required".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::Invalid("provider name cannot be empty".into()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
            if provider.kind == ProviderKind::OpenaiCompatible && provider.api_key_env.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' requires api_key_env",
                    provider.name
                )));
            }
        }

        for name in &self.routing.fallback_chain {
            if !self.providers.iter().any(|p| &p.name == name) {
                return Err(ConfigError::Invalid(format!(
                    "fallback_chain references unknown provider '{name}'"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.circuit_breaker.failure_rate_threshold) {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_rate_threshold must be within 0.0..=1.0".into(),
            ));
        }
        if self.circuit_breaker.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.backoff_multiplier must be at least 1.0".into(),
            ));
        }

        Ok(())
    }

    /// Providers that participate in routing.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Quality tiers collected from provider entries, for the quality policy.
    #[must_use]
    pub fn quality_tiers(&self) -> HashMap<String, u8> {
        self.enabled_providers()
            .filter_map(|p| p.quality_tier.map(|tier| (p.name.clone(), tier)))
            .collect()
    }

    /// Pricing for a provider entry: its own `pricing` when set, otherwise a
    /// model lookup in the top-level pricing table. `None` when neither is
    /// configured (the adapter keeps its built-in default).
    #[must_use]
    pub fn effective_pricing(&self, provider: &ProviderSettings) -> Option<ModelPricing> {
        provider.pricing.clone().or_else(|| {
            self.pricing
                .as_ref()
                .map(|table| table.for_model(&provider.model).clone())
        })
    }
}

impl ProviderSettings {
    /// Resolve this provider's API key from the environment.
    ///
    /// # Errors
    /// `ConfigError::MissingEnv` when `api_key_env` names an unset variable,
    /// `ConfigError::Invalid` when no variable is configured at all.
    pub fn resolve_api_key(&self) -> Result<SecretString, ConfigError> {
        let var = self.api_key_env.as_deref().ok_or_else(|| {
            ConfigError::Invalid(format!("provider '{}' has no api_key_env", self.name))
        })?;
        std::env::var(var)
            .map(SecretString::new)
            .map_err(|_| ConfigError::MissingEnv(var.to_owned()))
    }
}
