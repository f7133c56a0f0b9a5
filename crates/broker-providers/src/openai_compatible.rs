//! OpenAI-compatible HTTP adapter.
//!
//! Speaks the widely-cloned `/chat/completions` shape. Failures are captured
//! as raw provider errors (status, code, body) without interpretation — the
//! core's normalizer owns the mapping into the gateway taxonomy.

use async_trait::async_trait;
use broker_core::{
    AdapterCapabilities, AdapterDescriptor, CostEstimate, GenerateRequest, GenerateResult,
    HealthStatus, ModelId, ModelPricing, ProviderAdapter, ProviderId, QuotaStatus, RateLimitInfo,
    RawProviderError, Usage,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::debug;

/// Configuration for an [`OpenAiCompatibleAdapter`].
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Provider name to register under
    pub name: String,
    /// Model to request
    pub model: String,
    /// API key sent as a bearer token
    pub api_key: SecretString,
    /// Base URL including the version segment (default: OpenAI's)
    pub base_url: String,
    /// Declared capabilities
    pub capabilities: AdapterCapabilities,
    /// Pricing for cost estimates
    pub pricing: ModelPricing,
    /// Static rate limits for local pacing
    pub rate_limit: RateLimitInfo,
    /// Health probe timeout
    pub probe_timeout: Duration,
}

impl OpenAiCompatibleConfig {
    /// Create a configuration with OpenAI defaults.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.openai.com/v1".to_string(),
            capabilities: AdapterCapabilities {
                max_tokens: 128_000,
                supports_streaming: true,
                supports_system_prompt: true,
                supports_functions: true,
            },
            pricing: ModelPricing::default(),
            rate_limit: RateLimitInfo::unlimited(),
            probe_timeout: Duration::from_secs(5),
        }
    }

    /// Override the base URL (for compatible servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override pricing.
    #[must_use]
    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Override static rate limits.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitInfo) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

/// HTTP adapter for OpenAI-style chat completion endpoints.
pub struct OpenAiCompatibleAdapter {
    descriptor: AdapterDescriptor,
    config: OpenAiCompatibleConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl OpenAiCompatibleAdapter {
    /// Create an adapter from configuration.
    ///
    /// # Errors
    /// Returns an error if identifiers are invalid or the HTTP client cannot
    /// be constructed.
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, broker_core::GatewayError> {
        let descriptor = AdapterDescriptor {
            provider: ProviderId::new(config.name.clone())?,
            model: ModelId::new(config.model.clone())?,
            capabilities: config.capabilities,
        };

        let client = reqwest::Client::builder()
            .user_agent(concat!("llm-broker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                broker_core::GatewayError::internal(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            descriptor,
            config,
            client,
        })
    }

    fn build_payload(&self, request: &GenerateRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.options.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = serde_json::Map::new();
        body.insert("model".into(), json!(self.descriptor.model.as_str()));
        body.insert("messages".into(), json!(messages));
        if let Some(max_tokens) = request.options.max_tokens {
            body.insert("max_tokens".into(), json!(max_tokens));
        }
        if let Some(temperature) = request.options.temperature {
            body.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_p) = request.options.top_p {
            body.insert("top_p".into(), json!(top_p));
        }
        if let Some(stop) = &request.options.stop_sequences {
            body.insert("stop".into(), json!(stop));
        }
        serde_json::Value::Object(body)
    }

    fn raw_from_reqwest(error: &reqwest::Error) -> RawProviderError {
        if error.is_timeout() {
            return RawProviderError::timed_out();
        }
        let mut raw = RawProviderError::transport(error.to_string());
        if error.is_connect() {
            raw.code = Some("ECONNREFUSED".to_string());
        }
        raw
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResult, RawProviderError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let payload = self.build_payload(request);
        let started = Instant::now();

        debug!(provider = %self.descriptor.provider, model = %self.descriptor.model, "Dispatching chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::raw_from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .json::<serde_json::Value>()
                .await
                .unwrap_or(serde_json::Value::Null);
            return Err(RawProviderError::http(status.as_u16(), body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RawProviderError::transport(format!("invalid response body: {e}")))?;
        let parsed: ChatCompletionResponse = serde_json::from_value(body.clone())
            .map_err(|e| RawProviderError::transport(format!("unexpected response shape: {e}")))?;

        let output = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        // Prefer provider-reported usage, estimate otherwise.
        let usage = parsed.usage.map_or_else(
            || {
                Usage::new(
                    broker_core::approximate_tokens(&request.prompt),
                    broker_core::approximate_tokens(&output),
                )
            },
            |u| Usage::new(u.prompt_tokens, u.completion_tokens),
        );

        Ok(GenerateResult {
            provider: self.descriptor.provider.to_string(),
            model: self.descriptor.model.to_string(),
            output,
            usage,
            latency: started.elapsed(),
            cached: false,
            cost_estimate: self.config.pricing.estimate_usage(&usage),
            raw: Some(body),
        })
    }

    async fn health(&self) -> HealthStatus {
        let url = format!("{}/models", self.config.base_url);
        let started = Instant::now();

        let probe = self
            .client
            .get(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .timeout(self.config.probe_timeout)
            .send()
            .await;

        match probe {
            Ok(response) if response.status().is_success() => {
                HealthStatus::healthy(started.elapsed())
            }
            Ok(response) => HealthStatus::unhealthy(format!(
                "probe returned HTTP {}",
                response.status().as_u16()
            )),
            Err(e) => HealthStatus::unhealthy(e.to_string()),
        }
    }

    fn estimate_cost(&self, request: &GenerateRequest) -> CostEstimate {
        self.config.pricing.estimate_request(request)
    }

    async fn check_quota(&self) -> QuotaStatus {
        // No portable quota API across compatible servers.
        QuotaStatus::unmetered()
    }

    fn rate_limit(&self) -> RateLimitInfo {
        self.config.rate_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> OpenAiCompatibleAdapter {
        OpenAiCompatibleAdapter::new(OpenAiCompatibleConfig::new(
            "openai",
            "gpt-4o-mini",
            "sk-test",
        ))
        .expect("build adapter")
    }

    #[test]
    fn test_payload_includes_options() {
        let request = GenerateRequest::builder()
            .prompt("Hello")
            .system_prompt("Be terse")
            .max_tokens(64)
            .temperature(0.2)
            .build()
            .expect("valid request");

        let payload = adapter().build_payload(&request);
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "Hello");
        assert_eq!(payload["max_tokens"], 64);
        assert!(payload.get("top_p").is_none());
    }

    #[test]
    fn test_estimate_cost_is_pure() {
        let request = GenerateRequest::builder()
            .prompt("Hello")
            .max_tokens(100)
            .build()
            .expect("valid request");

        let a = adapter().estimate_cost(&request);
        let b = adapter().estimate_cost(&request);
        assert_eq!(a, b);
    }

    #[test]
    fn test_descriptor_identity() {
        let adapter = adapter();
        assert_eq!(adapter.provider_name(), "openai");
        assert_eq!(adapter.model_name(), "gpt-4o-mini");
    }
}
