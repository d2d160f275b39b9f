//! Newtype wrappers for type safety

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

// ============================================================================
// Newtype Wrappers for Type Safety
// ============================================================================

/// Consumer key newtype for type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerKey(String);

impl ConsumerKey {
    /// Create a new consumer key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the consumer key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConsumerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ConsumerKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for ConsumerKey {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for ConsumerKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConsumerKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConsumerKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Token identifier newtype
///
/// Provider-issued and opaque; the crate never parses its internal
/// structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenIdentifier(String);

impl TokenIdentifier {
    /// Create a new token identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the token identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TokenIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TokenIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for TokenIdentifier {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for TokenIdentifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for TokenIdentifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TokenIdentifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Association handle newtype
///
/// Provider-issued and opaque, like [`TokenIdentifier`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssociationHandle(String);

impl AssociationHandle {
    /// Create a new association handle
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get the handle as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssociationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AssociationHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for AssociationHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AssociationHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newtype_construction() {
        let key = ConsumerKey::new("consumer1");
        assert_eq!(key.as_str(), "consumer1");
        assert_eq!(key.to_string(), "consumer1");

        let token = TokenIdentifier::from("abc");
        assert_eq!(token.as_str(), "abc");

        let handle = AssociationHandle::new("h-42");
        assert_eq!(handle.as_ref(), "h-42");
    }

    #[test]
    fn test_serde_transparent() {
        let key = ConsumerKey::new("k");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"k\"");
        let back: ConsumerKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
