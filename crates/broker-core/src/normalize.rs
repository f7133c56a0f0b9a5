//! Provider error normalization.
//!
//! Maps a raw, provider-native failure into the closed [`GatewayError`]
//! taxonomy using a narrow per-provider table over transport signals (HTTP
//! status, error code string, timeout flag). Normalization is total and
//! idempotent: any input yields exactly one taxonomy member, the original
//! message is never lost, and this module never returns an error itself.

use crate::error::{GatewayError, RawProviderError};

/// Normalize a raw provider failure into the gateway taxonomy.
#[must_use]
pub fn normalize(provider: &str, raw: &RawProviderError) -> GatewayError {
    if raw.timed_out {
        return GatewayError::ProviderTimeout {
            provider: provider.to_owned(),
            timeout: None,
        };
    }

    let message = raw
        .message
        .clone()
        .unwrap_or_else(|| raw.to_string());

    if let Some(code) = raw.code.as_deref() {
        if let Some(err) = match_code(provider, code, &message) {
            return err;
        }
    }

    if let Some(status) = raw.status {
        return match_status(provider, status, &message, raw);
    }

    if raw.message.is_some() {
        return GatewayError::Provider {
            provider: provider.to_owned(),
            message,
            status: None,
        };
    }

    // Nothing recognizable at all: a null, a bare value, an empty object.
    GatewayError::Unknown {
        provider: provider.to_owned(),
        detail: raw.to_string(),
    }
}

/// Normalize an arbitrary JSON value (as thrown by a provider SDK).
#[must_use]
pub fn normalize_value(provider: &str, value: &serde_json::Value) -> GatewayError {
    normalize(provider, &RawProviderError::from_value(value))
}

/// Provider code-string table. Narrow by design: only codes the named
/// provider is known to emit, plus transport-level codes common to all.
fn match_code(provider: &str, code: &str, message: &str) -> Option<GatewayError> {
    let provider_owned = || provider.to_owned();
    let message_owned = || message.to_owned();

    // Transport codes, provider-independent.
    match code {
        "ETIMEDOUT" | "ESOCKETTIMEDOUT" | "request_timeout" => {
            return Some(GatewayError::ProviderTimeout {
                provider: provider_owned(),
                timeout: None,
            });
        }
        "ECONNREFUSED" | "ECONNRESET" | "ENOTFOUND" | "EAI_AGAIN" => {
            return Some(GatewayError::ProviderUnavailable {
                provider: provider_owned(),
                reason: message_owned(),
            });
        }
        _ => {}
    }

    let err = match (provider, code) {
        // OpenAI-style codes (also emitted by OpenAI-compatible servers).
        (_, "context_length_exceeded") => GatewayError::ContextLengthExceeded {
            provider: provider_owned(),
            message: message_owned(),
        },
        (_, "rate_limit_exceeded" | "rate_limit_error") => GatewayError::RateLimitExceeded {
            provider: provider_owned(),
            retry_after: None,
        },
        (_, "insufficient_quota" | "billing_hard_limit_reached") => GatewayError::QuotaExceeded {
            provider: provider_owned(),
            reset_at: None,
        },
        (_, "model_not_found") => GatewayError::ModelNotFound {
            model: message_owned(),
            provider: Some(provider_owned()),
        },
        (_, "content_filter" | "content_policy_violation") => GatewayError::ContentFiltered {
            provider: provider_owned(),
            message: message_owned(),
        },
        (_, "invalid_api_key" | "authentication_error") => GatewayError::Unauthorized {
            provider: provider_owned(),
            message: message_owned(),
        },
        (_, "permission_error" | "insufficient_permissions") => GatewayError::Forbidden {
            provider: provider_owned(),
            message: message_owned(),
        },
        // Anthropic-specific codes.
        ("anthropic", "overloaded_error") => GatewayError::ProviderUnavailable {
            provider: provider_owned(),
            reason: message_owned(),
        },
        ("anthropic", "not_found_error") => GatewayError::ModelNotFound {
            model: message_owned(),
            provider: Some(provider_owned()),
        },
        ("anthropic", "invalid_request_error") => {
            if message.contains("prompt is too long") {
                GatewayError::ContextLengthExceeded {
                    provider: provider_owned(),
                    message: message_owned(),
                }
            } else {
                GatewayError::InvalidRequest {
                    message: message_owned(),
                    field: None,
                }
            }
        }
        _ => return None,
    };
    Some(err)
}

/// HTTP status fallback table, applied when no code matched.
fn match_status(
    provider: &str,
    status: u16,
    message: &str,
    raw: &RawProviderError,
) -> GatewayError {
    let provider_owned = || provider.to_owned();
    let message_owned = || message.to_owned();

    match status {
        400 | 422 => GatewayError::InvalidRequest {
            message: message_owned(),
            field: None,
        },
        401 => GatewayError::Unauthorized {
            provider: provider_owned(),
            message: message_owned(),
        },
        403 => GatewayError::Forbidden {
            provider: provider_owned(),
            message: message_owned(),
        },
        404 => GatewayError::ModelNotFound {
            model: message_owned(),
            provider: Some(provider_owned()),
        },
        408 => GatewayError::ProviderTimeout {
            provider: provider_owned(),
            timeout: None,
        },
        413 => GatewayError::ContextLengthExceeded {
            provider: provider_owned(),
            message: message_owned(),
        },
        429 => {
            // Quota exhaustion shares 429 with throttling; disambiguate on
            // the message when the code gave no signal.
            if message.to_ascii_lowercase().contains("quota")
                || raw
                    .code
                    .as_deref()
                    .is_some_and(|c| c.contains("quota"))
            {
                GatewayError::QuotaExceeded {
                    provider: provider_owned(),
                    reset_at: None,
                }
            } else {
                GatewayError::RateLimitExceeded {
                    provider: provider_owned(),
                    retry_after: None,
                }
            }
        }
        503 => GatewayError::ProviderUnavailable {
            provider: provider_owned(),
            reason: message_owned(),
        },
        504 => GatewayError::ProviderTimeout {
            provider: provider_owned(),
            timeout: None,
        },
        _ => GatewayError::Provider {
            provider: provider_owned(),
            message: message_owned(),
            status: Some(status),
        },
    }
}
