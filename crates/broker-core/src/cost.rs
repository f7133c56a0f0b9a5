//! Cost estimation primitives.
//!
//! Costs are computed deterministically from token counts and a per-model
//! pricing table. Token counts are approximated from character length when a
//! provider does not report exact usage; estimates are informational and
//! never billing-accurate.

use crate::request::GenerateRequest;
use crate::response::Usage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Completion token count assumed when the request does not set `max_tokens`.
pub const DEFAULT_COMPLETION_TOKENS: u32 = 256;

/// Approximate a token count from text length.
///
/// Uses the common ~4 characters/token heuristic. An estimate, not a
/// tokenizer.
#[must_use]
pub fn approximate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4)
}

/// Cost split between prompt and completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Cost attributed to prompt tokens
    pub prompt_cost: f64,
    /// Cost attributed to completion tokens
    pub completion_cost: f64,
}

/// A deterministic, informational cost estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Total estimated cost
    pub amount: f64,
    /// Currency code
    pub currency: String,
    /// Prompt/completion split
    pub breakdown: CostBreakdown,
}

impl CostEstimate {
    /// Build from a breakdown.
    #[must_use]
    pub fn new(prompt_cost: f64, completion_cost: f64, currency: impl Into<String>) -> Self {
        Self {
            amount: prompt_cost + completion_cost,
            currency: currency.into(),
            breakdown: CostBreakdown {
                prompt_cost,
                completion_cost,
            },
        }
    }

    /// A zero-cost estimate (free providers).
    #[must_use]
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, "USD")
    }
}

/// Per-model pricing information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per 1K prompt tokens (USD)
    pub input_cost_per_1k: f64,
    /// Cost per 1K completion tokens (USD)
    pub output_cost_per_1k: f64,
    /// Currency (default: USD)
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_cost_per_1k: 0.01,
            output_cost_per_1k: 0.03,
            currency: default_currency(),
        }
    }
}

impl ModelPricing {
    /// Create pricing with explicit rates.
    #[must_use]
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_cost_per_1k: input_per_1k,
            output_cost_per_1k: output_per_1k,
            currency: default_currency(),
        }
    }

    /// Free pricing (local adapters).
    #[must_use]
    pub fn free() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Estimate cost for explicit token counts.
    #[must_use]
    pub fn estimate(&self, prompt_tokens: u32, completion_tokens: u32) -> CostEstimate {
        let prompt_cost = (f64::from(prompt_tokens) / 1000.0) * self.input_cost_per_1k;
        let completion_cost = (f64::from(completion_tokens) / 1000.0) * self.output_cost_per_1k;
        CostEstimate::new(prompt_cost, completion_cost, self.currency.clone())
    }

    /// Pre-flight estimate for a request: prompt tokens approximated from the
    /// prompt plus system prompt, completion tokens from `max_tokens`.
    #[must_use]
    pub fn estimate_request(&self, request: &GenerateRequest) -> CostEstimate {
        let mut prompt_tokens = approximate_tokens(&request.prompt);
        if let Some(system) = &request.options.system_prompt {
            prompt_tokens += approximate_tokens(system);
        }
        let completion_tokens = request
            .options
            .max_tokens
            .unwrap_or(DEFAULT_COMPLETION_TOKENS);
        self.estimate(prompt_tokens, completion_tokens)
    }

    /// Actual-intent estimate from reported usage.
    #[must_use]
    pub fn estimate_usage(&self, usage: &Usage) -> CostEstimate {
        self.estimate(usage.prompt_tokens, usage.completion_tokens)
    }
}

/// Pricing table keyed by model ID, with a default for unknown models.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingTable {
    /// Per-model pricing entries
    #[serde(default)]
    models: HashMap<String, ModelPricing>,
    /// Pricing applied to models without an entry
    #[serde(default)]
    default: ModelPricing,
}

impl PricingTable {
    /// Create an empty table with the given default pricing.
    #[must_use]
    pub fn with_default(default: ModelPricing) -> Self {
        Self {
            models: HashMap::new(),
            default,
        }
    }

    /// Insert pricing for a model.
    pub fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.models.insert(model.into(), pricing);
    }

    /// Look up pricing for a model, falling back to the default.
    #[must_use]
    pub fn for_model(&self, model: &str) -> &ModelPricing {
        self.models.get(model).unwrap_or(&self.default)
    }
}
