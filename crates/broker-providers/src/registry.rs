//! Provider adapter registry.
//!
//! A keyed table from provider name to adapter, populated at startup.
//! Descriptors are immutable once registered; duplicate registration is
//! rejected.

use broker_core::{GatewayError, ProviderAdapter};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Registry of provider adapters, keyed by provider name.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its descriptor's provider name.
    ///
    /// # Errors
    /// Returns an error if the provider name is already registered.
    pub fn register(&self, adapter: Arc<dyn ProviderAdapter>) -> Result<(), GatewayError> {
        let name = adapter.provider_name().to_owned();
        let model = adapter.model_name().to_owned();

        if self.adapters.contains_key(&name) {
            return Err(GatewayError::internal(format!(
                "provider '{name}' is already registered"
            )));
        }

        self.adapters.insert(name.clone(), adapter);
        info!(provider = %name, model = %model, "Registered provider adapter");
        Ok(())
    }

    /// Look up an adapter by provider name.
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).map(|entry| Arc::clone(&entry))
    }

    /// Find the adapter serving a given model ID.
    #[must_use]
    pub fn find_by_model(&self, model: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters
            .iter()
            .find(|entry| entry.value().model_name() == model)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// All registered adapters, ordered by provider name for determinism.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        let mut adapters: Vec<_> = self
            .adapters
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        adapters.sort_by(|a, b| a.provider_name().cmp(b.provider_name()));
        adapters
    }

    /// Registered provider names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .adapters
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalAdapter;

    #[test]
    fn test_register_and_get() {
        let registry = AdapterRegistry::new();
        let adapter = LocalAdapter::builder("local-echo", "echo-1")
            .build()
            .expect("valid adapter");
        registry.register(Arc::new(adapter)).expect("register");

        assert_eq!(registry.len(), 1);
        assert!(registry.get("local-echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = AdapterRegistry::new();
        let a = LocalAdapter::builder("local-echo", "echo-1")
            .build()
            .expect("valid adapter");
        let b = LocalAdapter::builder("local-echo", "echo-2")
            .build()
            .expect("valid adapter");

        registry.register(Arc::new(a)).expect("first register");
        assert!(registry.register(Arc::new(b)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_find_by_model() {
        let registry = AdapterRegistry::new();
        let adapter = LocalAdapter::builder("local-echo", "echo-1")
            .build()
            .expect("valid adapter");
        registry.register(Arc::new(adapter)).expect("register");

        assert!(registry.find_by_model("echo-1").is_some());
        assert!(registry.find_by_model("gpt-4o").is_none());
    }

    #[test]
    fn test_all_sorted_by_name() {
        let registry = AdapterRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            let adapter = LocalAdapter::builder(name, "echo-1")
                .build()
                .expect("valid adapter");
            registry.register(Arc::new(adapter)).expect("register");
        }

        let names: Vec<_> = registry
            .all()
            .iter()
            .map(|a| a.provider_name().to_owned())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
