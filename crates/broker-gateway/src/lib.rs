//! # Broker Gateway
//!
//! The single entry point for generation requests: validation, cache lookup,
//! routing, sequential fallback execution, and metrics.
//!
//! The facade owns the end-to-end pipeline; the orchestrator owns one
//! candidate list at a time and guarantees that every raw provider failure is
//! normalized and every outcome is reported to the health monitor.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod facade;
pub mod metrics;
pub mod orchestrator;

// Re-export main types
pub use cache::{request_fingerprint, MemoryCache, ResponseCache};
pub use facade::{Gateway, GatewayBuilder};
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use orchestrator::{FallbackOrchestrator, OrchestratorConfig};
