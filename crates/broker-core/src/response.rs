//! Result types and the wire envelope.

use crate::cost::CostEstimate;
use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token usage reported (or estimated) for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens produced in the completion
    pub completion_tokens: u32,
    /// Sum of prompt and completion tokens
    pub total_tokens: u32,
}

impl Usage {
    /// Create usage with the total derived from the parts.
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// The successful outcome of one generation request.
///
/// Produced exactly once per successful request. `raw` is opaque provider
/// passthrough for diagnostics, never parsed by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResult {
    /// Provider that produced the output
    pub provider: String,
    /// Model that produced the output
    pub model: String,
    /// Generated text
    pub output: String,
    /// Token usage (provider-reported or estimated)
    pub usage: Usage,
    /// End-to-end latency of the winning attempt
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// Whether this result was served from the cache
    pub cached: bool,
    /// Informational cost estimate
    pub cost_estimate: CostEstimate,
    /// Opaque provider response passthrough
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// Wire envelope for a successful result.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessEnvelope {
    /// Always `true`
    pub success: bool,
    /// The result payload
    pub data: GenerateResult,
    /// Envelope timestamp
    pub timestamp: DateTime<Utc>,
}

impl SuccessEnvelope {
    /// Wrap a result.
    #[must_use]
    pub fn new(data: GenerateResult) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Wire envelope for a failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    /// Always `false`
    pub success: bool,
    /// Error body
    pub error: ErrorBody,
    /// Envelope timestamp
    pub timestamp: DateTime<Utc>,
}

/// Machine-readable error body inside [`ErrorEnvelope`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable error code from the closed taxonomy
    pub code: &'static str,
    /// Human-readable message
    pub message: String,
    /// Diagnostic metadata (provider, attempts, per-provider errors)
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl From<&GatewayError> for ErrorEnvelope {
    fn from(error: &GatewayError) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: error.code(),
                message: error.to_string(),
                metadata: error.metadata(),
            },
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total() {
        let usage = Usage::new(10, 32);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn test_error_envelope_shape() {
        let err = GatewayError::no_adapter("all circuits open");
        let envelope = ErrorEnvelope::from(&err);
        let value = serde_json::to_value(&envelope).expect("serialize");

        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "NO_ADAPTER_FOUND");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_success_envelope_shape() {
        let result = GenerateResult {
            provider: "local".into(),
            model: "echo-1".into(),
            output: "hello".into(),
            usage: Usage::new(2, 2),
            latency: Duration::from_millis(3),
            cached: false,
            cost_estimate: CostEstimate::zero(),
            raw: None,
        };
        let value = serde_json::to_value(SuccessEnvelope::new(result)).expect("serialize");
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["provider"], "local");
    }
}
