//! The closed gateway error taxonomy.
//!
//! Every failure surfaced to a caller is a [`GatewayError`] with a stable
//! machine-readable code and a deterministic HTTP status mapping. Raw
//! provider failures are carried as [`RawProviderError`] until the
//! normalizer maps them into the taxonomy.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Convenience result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// One failed fallback attempt: the provider tried and the normalized error.
#[derive(Debug, Clone)]
pub struct AttemptError {
    /// Provider that was attempted
    pub provider: String,
    /// The normalized failure
    pub error: Box<GatewayError>,
}

impl AttemptError {
    /// Create a new attempt error.
    #[must_use]
    pub fn new(provider: impl Into<String>, error: GatewayError) -> Self {
        Self {
            provider: provider.into(),
            error: Box::new(error),
        }
    }
}

/// The closed set of gateway errors.
///
/// No raw provider exception or transport error ever escapes the gateway
/// boundary unwrapped; the normalizer maps everything into one of these.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Malformed caller input
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Human-readable description
        message: String,
        /// Offending field, when known
        field: Option<String>,
    },

    /// Bad credentials
    #[error("unauthorized by provider '{provider}': {message}")]
    Unauthorized {
        /// Provider that rejected the credentials
        provider: String,
        /// Provider message
        message: String,
    },

    /// Access denied
    #[error("forbidden by provider '{provider}': {message}")]
    Forbidden {
        /// Provider that denied access
        provider: String,
        /// Provider message
        message: String,
    },

    /// Requested model unknown to the provider or registry
    #[error("model '{model}' not found")]
    ModelNotFound {
        /// The unknown model
        model: String,
        /// Provider consulted, when known
        provider: Option<String>,
    },

    /// Prompt plus completion exceeds the model's max tokens
    #[error("context length exceeded on provider '{provider}': {message}")]
    ContextLengthExceeded {
        /// Provider that rejected the request
        provider: String,
        /// Provider message
        message: String,
    },

    /// Safety system rejected the content
    #[error("content filtered by provider '{provider}': {message}")]
    ContentFiltered {
        /// Provider that filtered the content
        provider: String,
        /// Provider message
        message: String,
    },

    /// Provider-side throttling
    #[error("rate limit exceeded on provider '{provider}'")]
    RateLimitExceeded {
        /// Throttling provider
        provider: String,
        /// Suggested wait, when reported
        retry_after: Option<Duration>,
    },

    /// Account or budget exhausted
    #[error("quota exceeded on provider '{provider}'")]
    QuotaExceeded {
        /// Exhausted provider
        provider: String,
        /// When the quota resets, if known
        reset_at: Option<DateTime<Utc>>,
    },

    /// Provider returned an application error
    #[error("provider '{provider}' error: {message}")]
    Provider {
        /// Failing provider
        provider: String,
        /// Original provider message, preserved verbatim
        message: String,
        /// HTTP status reported by the provider, if any
        status: Option<u16>,
    },

    /// The router produced no eligible candidate
    #[error("no adapter found: {message}")]
    NoAdapterFound {
        /// Why no candidate was eligible
        message: String,
    },

    /// Provider excluded or unreachable (open circuit, connection refused)
    #[error("provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable {
        /// Unavailable provider
        provider: String,
        /// Exclusion reason
        reason: String,
    },

    /// An attempt exceeded its deadline
    #[error("provider '{provider}' timed out")]
    ProviderTimeout {
        /// Timed-out provider
        provider: String,
        /// The per-attempt budget that elapsed, when known
        timeout: Option<Duration>,
    },

    /// Every fallback candidate failed
    #[error("all {attempts} provider(s) failed")]
    AllProvidersFailed {
        /// Number of attempts made; always equals `provider_errors.len()`
        attempts: usize,
        /// Per-provider normalized failures, in attempt order
        provider_errors: Vec<AttemptError>,
    },

    /// A provider produced something that is not an error at all
    #[error("unknown provider failure: {detail}")]
    Unknown {
        /// Provider involved, when known
        provider: String,
        /// Best-effort description of what was thrown
        detail: String,
    },

    /// Defensive catch-all for broker defects
    #[error("internal error: {message}")]
    Internal {
        /// Description
        message: String,
        /// Whether this is an expected request-time failure (`true`) or a
        /// bug that should be logged as such (`false`)
        operational: bool,
    },
}

impl GatewayError {
    /// Create an `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            field: field.map(ToOwned::to_owned),
        }
    }

    /// Create a `ModelNotFound` error.
    #[must_use]
    pub fn model_not_found(model: impl Into<String>, provider: Option<&str>) -> Self {
        Self::ModelNotFound {
            model: model.into(),
            provider: provider.map(ToOwned::to_owned),
        }
    }

    /// Create a `NoAdapterFound` error.
    #[must_use]
    pub fn no_adapter(message: impl Into<String>) -> Self {
        Self::NoAdapterFound {
            message: message.into(),
        }
    }

    /// Create a `ProviderUnavailable` error.
    #[must_use]
    pub fn unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Create a `ProviderTimeout` error with a known budget.
    #[must_use]
    pub fn timeout(provider: impl Into<String>, timeout: Duration) -> Self {
        Self::ProviderTimeout {
            provider: provider.into(),
            timeout: Some(timeout),
        }
    }

    /// Create an `AllProvidersFailed` error; `attempts` is derived from the
    /// error list, never supplied independently.
    #[must_use]
    pub fn all_failed(provider_errors: Vec<AttemptError>) -> Self {
        Self::AllProvidersFailed {
            attempts: provider_errors.len(),
            provider_errors,
        }
    }

    /// Create a non-operational `Internal` error (a broker defect).
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            operational: false,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            Self::ContextLengthExceeded { .. } => "CONTEXT_LENGTH_EXCEEDED",
            Self::ContentFiltered { .. } => "CONTENT_FILTERED",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::NoAdapterFound { .. } => "NO_ADAPTER_FOUND",
            Self::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            Self::ProviderTimeout { .. } => "PROVIDER_TIMEOUT",
            Self::AllProvidersFailed { .. } => "ALL_PROVIDERS_FAILED",
            Self::Unknown { .. } => "UNKNOWN_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Deterministic HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. }
            | Self::ContextLengthExceeded { .. }
            | Self::ContentFiltered { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::ModelNotFound { .. } => 404,
            Self::RateLimitExceeded { .. } | Self::QuotaExceeded { .. } => 429,
            Self::Provider { .. } => 502,
            Self::NoAdapterFound { .. }
            | Self::ProviderUnavailable { .. }
            | Self::AllProvidersFailed { .. } => 503,
            Self::ProviderTimeout { .. } => 504,
            Self::Unknown { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Whether this is an expected request-time failure rather than a defect.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        match self {
            Self::Internal { operational, .. } => *operational,
            _ => true,
        }
    }

    /// Diagnostic metadata for the wire envelope. Contains provider names,
    /// timeouts, attempt counts, and per-provider error codes, never adapter
    /// internals.
    #[must_use]
    pub fn metadata(&self) -> serde_json::Value {
        match self {
            Self::InvalidRequest { field, .. } => json!({ "field": field }),
            Self::Unauthorized { provider, .. }
            | Self::Forbidden { provider, .. }
            | Self::ContextLengthExceeded { provider, .. }
            | Self::ContentFiltered { provider, .. }
            | Self::Unknown { provider, .. } => json!({ "provider": provider }),
            Self::ModelNotFound { model, provider } => {
                json!({ "model": model, "provider": provider })
            }
            Self::RateLimitExceeded {
                provider,
                retry_after,
            } => json!({
                "provider": provider,
                "retryAfterMs": retry_after.map(|d| d.as_millis() as u64),
            }),
            Self::QuotaExceeded { provider, reset_at } => {
                json!({ "provider": provider, "resetAt": reset_at })
            }
            Self::Provider {
                provider, status, ..
            } => json!({ "provider": provider, "providerStatus": status }),
            Self::NoAdapterFound { .. } | Self::Internal { .. } => json!({}),
            Self::ProviderUnavailable { provider, reason } => {
                json!({ "provider": provider, "reason": reason })
            }
            Self::ProviderTimeout { provider, timeout } => json!({
                "provider": provider,
                "timeoutMs": timeout.map(|d| d.as_millis() as u64),
            }),
            Self::AllProvidersFailed {
                attempts,
                provider_errors,
            } => json!({
                "attempts": attempts,
                "providerErrors": provider_errors
                    .iter()
                    .map(|e| json!({
                        "provider": e.provider,
                        "code": e.error.code(),
                        "message": e.error.to_string(),
                    }))
                    .collect::<Vec<_>>(),
            }),
        }
    }
}

/// A raw, provider-native failure captured by an adapter.
///
/// Adapters fail with this type without interpreting it; only the normalizer
/// ([`crate::normalize`]) maps it into the [`GatewayError`] taxonomy.
#[derive(Debug, Clone, Default)]
pub struct RawProviderError {
    /// HTTP status returned by the provider, if the failure was an HTTP error
    pub status: Option<u16>,
    /// Provider error code string (e.g. "rate_limit_exceeded", "ETIMEDOUT")
    pub code: Option<String>,
    /// Provider error message
    pub message: Option<String>,
    /// Full provider error body, opaque to the core
    pub body: Option<serde_json::Value>,
    /// The transport reported a timeout
    pub timed_out: bool,
}

impl RawProviderError {
    /// A transport-level failure with only a message.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// An HTTP failure with status and body.
    #[must_use]
    pub fn http(status: u16, body: serde_json::Value) -> Self {
        let mut raw = Self::from_value(&body);
        raw.status = Some(status);
        raw.body = Some(body);
        raw
    }

    /// A failure identified by a provider code string.
    #[must_use]
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A timed-out attempt.
    #[must_use]
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    /// Build from an arbitrary JSON value. Total: any input produces a valid
    /// raw error, including `null`, strings, and unrecognized objects.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::default(),
            Value::String(s) => Self {
                message: Some(s.clone()),
                ..Self::default()
            },
            Value::Bool(_) | Value::Number(_) => Self {
                message: Some(value.to_string()),
                ..Self::default()
            },
            Value::Array(_) => Self {
                message: Some(value.to_string()),
                body: Some(value.clone()),
                ..Self::default()
            },
            Value::Object(map) => {
                // Providers nest details under "error" inconsistently.
                let inner = map.get("error").and_then(Value::as_object);
                let lookup = |key: &str| {
                    inner
                        .and_then(|m| m.get(key))
                        .or_else(|| map.get(key))
                        .cloned()
                };

                let status = lookup("status")
                    .or_else(|| lookup("statusCode"))
                    .and_then(|v| v.as_u64())
                    .map(|s| s as u16);
                let code = lookup("code")
                    .or_else(|| lookup("type"))
                    .and_then(|v| v.as_str().map(ToOwned::to_owned));
                let message = lookup("message")
                    .and_then(|v| v.as_str().map(ToOwned::to_owned));

                Self {
                    status,
                    code,
                    message,
                    body: Some(value.clone()),
                    timed_out: false,
                }
            }
        }
    }
}

impl std::fmt::Display for RawProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.timed_out {
            return f.write_str("provider call timed out");
        }
        match (&self.message, &self.code, self.status) {
            (Some(msg), _, _) => f.write_str(msg),
            (None, Some(code), _) => write!(f, "provider error code {code}"),
            (None, None, Some(status)) => write!(f, "provider returned HTTP {status}"),
            (None, None, None) => f.write_str("provider returned a non-error value"),
        }
    }
}

impl std::error::Error for RawProviderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_table() {
        assert_eq!(
            GatewayError::invalid_request("bad", None).status_code(),
            400
        );
        assert_eq!(
            GatewayError::model_not_found("gpt-9", None).status_code(),
            404
        );
        assert_eq!(
            GatewayError::RateLimitExceeded {
                provider: "openai".into(),
                retry_after: None
            }
            .status_code(),
            429
        );
        assert_eq!(GatewayError::no_adapter("none").status_code(), 503);
        assert_eq!(
            GatewayError::timeout("openai", Duration::from_secs(30)).status_code(),
            504
        );
        assert_eq!(GatewayError::all_failed(vec![]).status_code(), 503);
        assert_eq!(GatewayError::internal("bug").status_code(), 500);
    }

    #[test]
    fn test_operational_flags() {
        assert!(GatewayError::invalid_request("bad", None).is_operational());
        assert!(GatewayError::all_failed(vec![]).is_operational());
        assert!(!GatewayError::internal("bug").is_operational());
        assert!(GatewayError::Internal {
            message: "tolerated".into(),
            operational: true
        }
        .is_operational());
    }

    #[test]
    fn test_all_failed_attempts_matches_errors() {
        let errors = vec![
            AttemptError::new("a", GatewayError::timeout("a", Duration::from_secs(1))),
            AttemptError::new("b", GatewayError::unavailable("b", "circuit open")),
        ];
        match GatewayError::all_failed(errors) {
            GatewayError::AllProvidersFailed {
                attempts,
                provider_errors,
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(attempts, provider_errors.len());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_metadata_has_provider_errors() {
        let err = GatewayError::all_failed(vec![AttemptError::new(
            "openai",
            GatewayError::timeout("openai", Duration::from_secs(5)),
        )]);
        let meta = err.metadata();
        assert_eq!(meta["attempts"], 1);
        assert_eq!(meta["providerErrors"][0]["code"], "PROVIDER_TIMEOUT");
    }

    #[test]
    fn test_raw_error_from_value_total() {
        use serde_json::json;

        let cases = vec![
            json!(null),
            json!("boom"),
            json!(42),
            json!({ "status": 429 }),
            json!({ "code": "ETIMEDOUT" }),
            json!({ "anything": ["goes", "here"] }),
        ];
        for value in cases {
            // Must never panic, whatever the shape.
            let raw = RawProviderError::from_value(&value);
            let _ = raw.to_string();
        }
    }

    #[test]
    fn test_raw_error_nested_shape() {
        let raw = RawProviderError::from_value(&serde_json::json!({
            "error": { "code": "rate_limit_exceeded", "message": "slow down" }
        }));
        assert_eq!(raw.code.as_deref(), Some("rate_limit_exceeded"));
        assert_eq!(raw.message.as_deref(), Some("slow down"));
    }
}
