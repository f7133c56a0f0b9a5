//! # Broker Resilience
//!
//! Failure-handling state for the LLM broker:
//! - Per-provider circuit breaker (CLOSED / OPEN / HALF_OPEN)
//! - Health monitor combining circuit state with probe snapshots
//! - Advisory quota tracking and local rate pacing

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod health;
pub mod quota;

// Re-export main types
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use health::{HealthMonitor, HealthMonitorConfig};
pub use quota::{QuotaTracker, RatePacer};
