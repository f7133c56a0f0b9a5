//! # Broker Routing
//!
//! Policy-based provider selection for the LLM broker.
//!
//! The router turns one request plus the current health/quota snapshots into
//! an ordered list of candidate adapters. Providers with open circuits or
//! exhausted quota are filtered out before ranking, never merely ranked last.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod router;

// Re-export main types
pub use router::{PolicyRouter, RouterConfig};
