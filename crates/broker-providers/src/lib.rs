//! # Broker Providers
//!
//! Adapter implementations and the keyed registry for the LLM broker:
//! - [`AdapterRegistry`]: provider-name-keyed table of registered adapters
//! - [`OpenAiCompatibleAdapter`]: HTTP adapter for OpenAI-style
//!   `/chat/completions` endpoints
//! - [`LocalAdapter`]: deterministic, no-network echo adapter (last-resort
//!   fallback and test fixture)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod local;
pub mod openai_compatible;
pub mod registry;

// Re-export main types
pub use local::{LocalAdapter, LocalAdapterConfig};
pub use openai_compatible::{OpenAiCompatibleAdapter, OpenAiCompatibleConfig};
pub use registry::AdapterRegistry;
