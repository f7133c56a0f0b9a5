//! # Broker Config
//!
//! YAML configuration for the LLM broker. A [`BrokerConfig`] describes the
//! provider fleet, routing defaults, and resilience tuning; secrets are never
//! stored in the file, only the names of environment variables that hold
//! them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod settings;

// Re-export main types
pub use settings::{
    BrokerConfig, CacheSettings, CircuitBreakerSettings, ConfigError, HealthSettings,
    OrchestratorSettings, ProviderKind, ProviderSettings, RoutingSettings,
};
