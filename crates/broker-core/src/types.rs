//! Validated domain newtypes.
//!
//! Provider and model identifiers are validated once at the boundary and
//! carried as opaque newtypes afterwards.

use serde::{Deserialize, Serialize};

/// Identifier of a registered provider adapter (e.g. "openai", "anthropic").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a validated provider ID.
    ///
    /// # Errors
    /// Returns an error if the ID is empty or contains characters outside
    /// `[a-z0-9_-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, crate::error::GatewayError> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::error::GatewayError::invalid_request(
                "provider id cannot be empty",
                Some("provider"),
            ));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(crate::error::GatewayError::invalid_request(
                format!("provider id '{id}' must match [a-z0-9_-]+"),
                Some("provider"),
            ));
        }
        Ok(Self(id))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProviderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a model served by a provider (e.g. "gpt-4o-mini").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Maximum accepted model ID length.
    pub const MAX_LEN: usize = 256;

    /// Create a validated model ID.
    ///
    /// # Errors
    /// Returns an error if the ID is empty or longer than [`Self::MAX_LEN`].
    pub fn new(id: impl Into<String>) -> Result<Self, crate::error::GatewayError> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::error::GatewayError::invalid_request(
                "model id cannot be empty",
                Some("model"),
            ));
        }
        if id.len() > Self::MAX_LEN {
            return Err(crate::error::GatewayError::invalid_request(
                format!("model id exceeds {} characters", Self::MAX_LEN),
                Some("model"),
            ));
        }
        Ok(Self(id))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    /// Generate a fresh random request ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}
