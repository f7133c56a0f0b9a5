//! # Broker Core
//!
//! Core types, traits, and error handling for the LLM broker.
//!
//! This crate provides the foundational pieces used throughout the broker:
//! - Request and result types
//! - The provider adapter contract
//! - The closed gateway error taxonomy and the provider error normalizer
//! - Cost estimation primitives (approximate, never billing-accurate)
//! - Validated domain newtypes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod cost;
pub mod error;
pub mod normalize;
pub mod request;
pub mod response;
pub mod types;

// Re-export commonly used types
pub use adapter::{
    AdapterCapabilities, AdapterDescriptor, HealthStatus, ProviderAdapter, QuotaStatus,
    RateLimitInfo,
};
pub use cost::{approximate_tokens, CostBreakdown, CostEstimate, ModelPricing, PricingTable};
pub use error::{AttemptError, GatewayError, GatewayResult, RawProviderError};
pub use normalize::{normalize, normalize_value};
pub use request::{GenerateOptions, GenerateRequest, RoutingPolicy};
pub use response::{ErrorEnvelope, GenerateResult, SuccessEnvelope, Usage};
pub use types::{ModelId, ProviderId, RequestId};
