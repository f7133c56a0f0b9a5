//! Request types for the broker.
//!
//! [`GenerateRequest`] is the caller-owned description of one text-generation
//! call; the broker treats it as read-only.

use crate::types::RequestId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default total request budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_allow_fallback() -> bool {
    true
}

/// A text-generation request submitted to the gateway facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Unique request identifier
    #[serde(default = "RequestId::generate")]
    pub id: RequestId,

    /// The prompt to complete
    pub prompt: String,

    /// Requested model (consulted by the user-preference policy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Requested provider (consulted by the user-preference policy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Honor the caller's model/provider preference when routing
    #[serde(default)]
    pub use_user_preference: bool,

    /// Routing policy override; the router's configured default applies
    /// when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_policy: Option<RoutingPolicy>,

    /// Generation options
    #[serde(default)]
    pub options: GenerateOptions,

    /// Serve from the response cache when possible
    #[serde(default)]
    pub use_cache: bool,

    /// Try further candidates after a failed attempt
    #[serde(default = "default_allow_fallback")]
    pub allow_fallback: bool,

    /// Total time budget across all fallback attempts
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

/// Generation options shared by all providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Top-p (nucleus sampling) parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// System prompt, for providers that support one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Provider-selection strategy applied to eligible adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingPolicy {
    /// Single candidate: the caller's requested model/provider
    UserPreference,
    /// Candidates ranked by ascending estimated cost
    CostOptimized,
    /// Candidates ranked by ascending last-known latency
    Performance,
    /// Candidates ranked by configured quality tier, highest first
    Quality,
    /// Eligible candidates rotated by a process-wide index
    RoundRobin,
    /// Candidates in the fixed configured priority order
    FallbackChain,
}

impl std::fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UserPreference => "user-preference",
            Self::CostOptimized => "cost-optimized",
            Self::Performance => "performance",
            Self::Quality => "quality",
            Self::RoundRobin => "round-robin",
            Self::FallbackChain => "fallback-chain",
        };
        f.write_str(s)
    }
}

impl GenerateRequest {
    /// Create a new builder for `GenerateRequest`.
    #[must_use]
    pub fn builder() -> GenerateRequestBuilder {
        GenerateRequestBuilder::default()
    }

    /// Validate the request.
    ///
    /// # Errors
    /// Returns `GatewayError::InvalidRequest` if any field is out of range.
    pub fn validate(&self) -> Result<(), crate::error::GatewayError> {
        if self.prompt.trim().is_empty() {
            return Err(crate::error::GatewayError::invalid_request(
                "prompt cannot be empty",
                Some("prompt"),
            ));
        }

        if let Some(temp) = self.options.temperature {
            if !(0.0..=2.0).contains(&temp) {
                return Err(crate::error::GatewayError::invalid_request(
                    format!("temperature must be between 0.0 and 2.0, got {temp}"),
                    Some("options.temperature"),
                ));
            }
        }

        if let Some(top_p) = self.options.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(crate::error::GatewayError::invalid_request(
                    format!("top_p must be between 0.0 and 1.0, got {top_p}"),
                    Some("options.top_p"),
                ));
            }
        }

        if let Some(max_tokens) = self.options.max_tokens {
            if max_tokens == 0 {
                return Err(crate::error::GatewayError::invalid_request(
                    "max_tokens must be at least 1",
                    Some("options.max_tokens"),
                ));
            }
        }

        if self.timeout.is_zero() {
            return Err(crate::error::GatewayError::invalid_request(
                "timeout must be greater than zero",
                Some("timeout"),
            ));
        }

        if self.use_user_preference && self.model.is_none() && self.provider.is_none() {
            return Err(crate::error::GatewayError::invalid_request(
                "use_user_preference requires a model or provider",
                Some("use_user_preference"),
            ));
        }

        Ok(())
    }
}

/// Builder for [`GenerateRequest`].
#[derive(Debug, Default)]
pub struct GenerateRequestBuilder {
    id: Option<RequestId>,
    prompt: Option<String>,
    model: Option<String>,
    provider: Option<String>,
    use_user_preference: bool,
    routing_policy: Option<RoutingPolicy>,
    options: GenerateOptions,
    use_cache: bool,
    allow_fallback: Option<bool>,
    timeout: Option<Duration>,
}

impl GenerateRequestBuilder {
    /// Set the request ID
    #[must_use]
    pub fn id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the prompt
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Set the requested model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the requested provider
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Honor the caller's model/provider preference
    #[must_use]
    pub fn use_user_preference(mut self, value: bool) -> Self {
        self.use_user_preference = value;
        self
    }

    /// Set the routing policy
    #[must_use]
    pub fn routing_policy(mut self, policy: RoutingPolicy) -> Self {
        self.routing_policy = Some(policy);
        self
    }

    /// Set max_tokens
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    /// Set top_p
    #[must_use]
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.options.top_p = Some(top_p);
        self
    }

    /// Set stop sequences
    #[must_use]
    pub fn stop_sequences(mut self, stop: Vec<String>) -> Self {
        self.options.stop_sequences = Some(stop);
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.options.system_prompt = Some(system_prompt.into());
        self
    }

    /// Enable cache lookup
    #[must_use]
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Allow or forbid fallback to further candidates
    #[must_use]
    pub fn allow_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = Some(allow);
        self
    }

    /// Set the total time budget
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build and validate the request.
    ///
    /// # Errors
    /// Returns an error if required fields are missing or out of range.
    pub fn build(self) -> Result<GenerateRequest, crate::error::GatewayError> {
        let prompt = self.prompt.ok_or_else(|| {
            crate::error::GatewayError::invalid_request("prompt is required", Some("prompt"))
        })?;

        let request = GenerateRequest {
            id: self.id.unwrap_or_else(RequestId::generate),
            prompt,
            model: self.model,
            provider: self.provider,
            use_user_preference: self.use_user_preference,
            routing_policy: self.routing_policy,
            options: self.options,
            use_cache: self.use_cache,
            allow_fallback: self.allow_fallback.unwrap_or(true),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
        };

        request.validate()?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_defaults() {
        let request = GenerateRequest::builder()
            .prompt("Hello")
            .build()
            .expect("should build");

        assert_eq!(request.prompt, "Hello");
        assert!(request.allow_fallback);
        assert!(!request.use_cache);
        assert_eq!(request.timeout, DEFAULT_TIMEOUT);
        assert!(request.routing_policy.is_none());
    }

    #[test]
    fn test_request_builder_missing_prompt() {
        assert!(GenerateRequest::builder().build().is_err());
    }

    #[test]
    fn test_request_validation_temperature() {
        let result = GenerateRequest::builder()
            .prompt("Hello")
            .temperature(3.0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_request_validation_zero_max_tokens() {
        let result = GenerateRequest::builder()
            .prompt("Hello")
            .max_tokens(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_user_preference_requires_target() {
        let result = GenerateRequest::builder()
            .prompt("Hello")
            .use_user_preference(true)
            .build();
        assert!(result.is_err());

        let result = GenerateRequest::builder()
            .prompt("Hello")
            .use_user_preference(true)
            .provider("openai")
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_routing_policy_serde() {
        let policy: RoutingPolicy =
            serde_json::from_str("\"cost-optimized\"").expect("deserialize");
        assert_eq!(policy, RoutingPolicy::CostOptimized);
        assert_eq!(policy.to_string(), "cost-optimized");
    }
}
