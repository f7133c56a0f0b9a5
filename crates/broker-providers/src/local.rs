//! Deterministic local adapter.
//!
//! A no-network adapter that echoes the prompt (or a canned response). It
//! serves two roles: a last-resort fallback that always answers, and the
//! failure-injection fixture used across the broker's tests — queued raw
//! errors are returned before any successful generation.

use async_trait::async_trait;
use broker_core::{
    approximate_tokens, AdapterCapabilities, AdapterDescriptor, CostEstimate, GenerateRequest,
    GenerateResult, HealthStatus, ModelId, ModelPricing, ProviderAdapter, ProviderId, QuotaStatus,
    RateLimitInfo, RawProviderError, Usage,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Configuration for a [`LocalAdapter`].
#[derive(Debug, Clone)]
pub struct LocalAdapterConfig {
    /// Pricing used for cost estimates (free by default)
    pub pricing: ModelPricing,
    /// Artificial latency added to each generation
    pub latency: Duration,
    /// Canned output; `None` echoes the prompt
    pub canned_output: Option<String>,
    /// Declared capabilities
    pub capabilities: AdapterCapabilities,
    /// Static rate limits
    pub rate_limit: RateLimitInfo,
}

impl Default for LocalAdapterConfig {
    fn default() -> Self {
        Self {
            pricing: ModelPricing::free(),
            latency: Duration::ZERO,
            canned_output: None,
            capabilities: AdapterCapabilities::default(),
            rate_limit: RateLimitInfo::unlimited(),
        }
    }
}

/// Builder for [`LocalAdapter`].
#[derive(Debug)]
pub struct LocalAdapterBuilder {
    name: String,
    model: String,
    config: LocalAdapterConfig,
}

impl LocalAdapterBuilder {
    /// Set pricing.
    #[must_use]
    pub fn pricing(mut self, pricing: ModelPricing) -> Self {
        self.config.pricing = pricing;
        self
    }

    /// Set artificial latency.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.config.latency = latency;
        self
    }

    /// Set a canned output instead of echoing.
    #[must_use]
    pub fn canned_output(mut self, output: impl Into<String>) -> Self {
        self.config.canned_output = Some(output.into());
        self
    }

    /// Set declared capabilities.
    #[must_use]
    pub fn capabilities(mut self, capabilities: AdapterCapabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Set static rate limits.
    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimitInfo) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    /// Build the adapter.
    ///
    /// # Errors
    /// Returns an error if the provider or model ID is invalid.
    pub fn build(self) -> Result<LocalAdapter, broker_core::GatewayError> {
        Ok(LocalAdapter {
            descriptor: AdapterDescriptor {
                provider: ProviderId::new(self.name)?,
                model: ModelId::new(self.model)?,
                capabilities: self.config.capabilities,
            },
            config: self.config,
            failure_script: Mutex::new(VecDeque::new()),
            quota: Mutex::new(QuotaStatus::unmetered()),
        })
    }
}

/// Deterministic no-network adapter.
pub struct LocalAdapter {
    descriptor: AdapterDescriptor,
    config: LocalAdapterConfig,
    failure_script: Mutex<VecDeque<RawProviderError>>,
    quota: Mutex<QuotaStatus>,
}

impl LocalAdapter {
    /// Start building an adapter with the given provider and model names.
    #[must_use]
    pub fn builder(name: impl Into<String>, model: impl Into<String>) -> LocalAdapterBuilder {
        LocalAdapterBuilder {
            name: name.into(),
            model: model.into(),
            config: LocalAdapterConfig::default(),
        }
    }

    /// Queue a raw error to be returned by the next `generate` call.
    pub fn push_failure(&self, raw: RawProviderError) {
        self.failure_script.lock().push_back(raw);
    }

    /// Queue `count` copies of a raw error.
    pub fn push_failures(&self, count: usize, raw: &RawProviderError) {
        let mut script = self.failure_script.lock();
        for _ in 0..count {
            script.push_back(raw.clone());
        }
    }

    /// Override the quota reported by `check_quota`.
    pub fn set_quota(&self, quota: QuotaStatus) {
        *self.quota.lock() = quota;
    }
}

#[async_trait]
impl ProviderAdapter for LocalAdapter {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResult, RawProviderError> {
        let scripted = self.failure_script.lock().pop_front();
        if let Some(raw) = scripted {
            // Scripted failures still pay the configured latency, so timeout
            // behavior can be exercised.
            if !self.config.latency.is_zero() {
                tokio::time::sleep(self.config.latency).await;
            }
            return Err(raw);
        }

        let started = Instant::now();
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        let output = self
            .config
            .canned_output
            .clone()
            .unwrap_or_else(|| format!("echo: {}", request.prompt));

        let mut prompt_tokens = approximate_tokens(&request.prompt);
        if let Some(system) = &request.options.system_prompt {
            prompt_tokens += approximate_tokens(system);
        }
        let usage = Usage::new(prompt_tokens, approximate_tokens(&output));

        Ok(GenerateResult {
            provider: self.descriptor.provider.to_string(),
            model: self.descriptor.model.to_string(),
            output,
            usage,
            latency: started.elapsed(),
            cached: false,
            cost_estimate: self.config.pricing.estimate_usage(&usage),
            raw: None,
        })
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus::healthy(self.config.latency)
    }

    fn estimate_cost(&self, request: &GenerateRequest) -> CostEstimate {
        self.config.pricing.estimate_request(request)
    }

    async fn check_quota(&self) -> QuotaStatus {
        *self.quota.lock()
    }

    fn rate_limit(&self) -> RateLimitInfo {
        self.config.rate_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest::builder()
            .prompt(prompt)
            .build()
            .expect("valid request")
    }

    #[tokio::test]
    async fn test_echoes_prompt() {
        let adapter = LocalAdapter::builder("local-echo", "echo-1")
            .build()
            .expect("build");

        let result = adapter.generate(&request("Hello")).await.expect("generate");
        assert_eq!(result.output, "echo: Hello");
        assert_eq!(result.provider, "local-echo");
        assert_eq!(result.model, "echo-1");
        assert!(result.usage.total_tokens > 0);
        assert!(!result.cached);
    }

    #[tokio::test]
    async fn test_canned_output() {
        let adapter = LocalAdapter::builder("local-echo", "echo-1")
            .canned_output("fixed response")
            .build()
            .expect("build");

        let result = adapter.generate(&request("anything")).await.expect("generate");
        assert_eq!(result.output, "fixed response");
    }

    #[tokio::test]
    async fn test_failure_script_consumed_in_order() {
        let adapter = LocalAdapter::builder("local-echo", "echo-1")
            .build()
            .expect("build");
        adapter.push_failure(RawProviderError::with_code("rate_limit_exceeded", "busy"));

        let first = adapter.generate(&request("Hi")).await;
        assert!(first.is_err());

        let second = adapter.generate(&request("Hi")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_free_pricing_costs_nothing() {
        let adapter = LocalAdapter::builder("local-echo", "echo-1")
            .build()
            .expect("build");

        let estimate = adapter.estimate_cost(&request("Hello world"));
        assert!((estimate.amount - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_quota_override() {
        let adapter = LocalAdapter::builder("local-echo", "echo-1")
            .build()
            .expect("build");
        assert!(!adapter.check_quota().await.is_exhausted());

        adapter.set_quota(QuotaStatus::metered(0.0, 10.0, None));
        assert!(adapter.check_quota().await.is_exhausted());
    }
}
