//! Response cache seam.
//!
//! The facade consults a [`ResponseCache`] only when the request opts in with
//! `use_cache`. The cache key is a fingerprint over every field that affects
//! the output, so two requests differing in any generation option never share
//! an entry.

use async_trait::async_trait;
use broker_core::{GenerateRequest, GenerateResult};
use dashmap::DashMap;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Compute the cache fingerprint for a request.
///
/// Covers the prompt, model/provider targeting, and all generation options.
/// The request ID, timeout, and routing policy are deliberately excluded:
/// they change how the answer is obtained, not what the answer is.
#[must_use]
pub fn request_fingerprint(request: &GenerateRequest) -> String {
    let key = json!({
        "prompt": request.prompt,
        "model": request.model,
        "provider": request.provider,
        "max_tokens": request.options.max_tokens,
        "temperature": request.options.temperature,
        "top_p": request.options.top_p,
        "stop_sequences": request.options.stop_sequences,
        "system_prompt": request.options.system_prompt,
    });

    let mut hasher = Sha256::new();
    hasher.update(key.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Pluggable response cache used by the gateway facade.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Look up a cached result by fingerprint.
    async fn get(&self, key: &str) -> Option<GenerateResult>;

    /// Store a result under a fingerprint.
    async fn put(&self, key: &str, result: &GenerateResult);
}

/// In-process response cache with a bounded entry count.
pub struct MemoryCache {
    entries: DashMap<String, GenerateResult>,
    max_entries: usize,
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` results.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Current number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<GenerateResult> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    async fn put(&self, key: &str, result: &GenerateResult) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            // Evict an arbitrary entry to stay within the bound.
            let victim = self.entries.iter().next().map(|e| e.key().clone());
            if let Some(victim) = victim {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(key.to_owned(), result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::{CostEstimate, Usage};
    use std::time::Duration;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest::builder()
            .prompt(prompt)
            .build()
            .expect("valid request")
    }

    fn result(output: &str) -> GenerateResult {
        GenerateResult {
            provider: "local".into(),
            model: "echo-1".into(),
            output: output.into(),
            usage: Usage::new(1, 1),
            latency: Duration::from_millis(1),
            cached: false,
            cost_estimate: CostEstimate::zero(),
            raw: None,
        }
    }

    #[test]
    fn test_fingerprint_ignores_request_id() {
        let a = request("Hello");
        let b = request("Hello");
        assert_ne!(a.id, b.id);
        assert_eq!(request_fingerprint(&a), request_fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_varies_with_options() {
        let plain = request("Hello");
        let tuned = GenerateRequest::builder()
            .prompt("Hello")
            .temperature(0.2)
            .build()
            .expect("valid request");
        assert_ne!(request_fingerprint(&plain), request_fingerprint(&tuned));
    }

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new(8);
        let key = request_fingerprint(&request("Hello"));

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, &result("hi")).await;
        let hit = cache.get(&key).await.expect("cached");
        assert_eq!(hit.output, "hi");
    }

    #[tokio::test]
    async fn test_memory_cache_bounded() {
        let cache = MemoryCache::new(2);
        cache.put("a", &result("a")).await;
        cache.put("b", &result("b")).await;
        cache.put("c", &result("c")).await;
        assert_eq!(cache.len(), 2);
    }
}
