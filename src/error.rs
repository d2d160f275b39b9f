//! Error types for authwire

use thiserror::Error;

/// The specific reason a wire-level protection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionFailureReason {
    /// The message signature did not verify against the claimed credential
    InvalidSignature,
    /// The message nonce was already consumed within its validity window
    ReplayedMessage,
    /// The message aged out of its skew-adjusted lifetime
    Expired,
    /// No signing credential was available for the operation
    MissingCredential,
}

impl std::fmt::Display for ProtectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::InvalidSignature => "invalid signature",
            Self::ReplayedMessage => "replayed message",
            Self::Expired => "message expired",
            Self::MissingCredential => "missing credential",
        };
        write!(f, "{text}")
    }
}

/// Main error type for authwire
#[derive(Error, Debug)]
pub enum AuthWireError {
    /// A message failed field-level validation during serialization or
    /// deserialization
    #[error("Validation error: {message}")]
    Validation {
        /// What was wrong
        message: String,
        /// The offending field, when one can be named
        field: Option<String>,
    },

    /// A wire-level protection (signing, replay, expiration) failed
    #[error("Protection failure: {reason}")]
    ProtectionFailure {
        /// The specific protection that failed
        reason: ProtectionFailureReason,
    },

    /// The remote party returned a direct error response
    #[error("Protocol error: {message}")]
    Protocol {
        /// Machine-readable error code, when the provider sent one
        code: Option<String>,
        /// Human-readable error text from the provider
        message: String,
        /// Contact address offered by the provider
        contact: Option<String>,
        /// Reference URI offered by the provider
        reference: Option<String>,
    },

    /// A token was used in a state that does not permit the operation
    #[error("Token state error: {0}")]
    TokenState(String),

    /// An expired association was offered for signing
    #[error("Association {handle} has expired and cannot sign messages")]
    AssociationExpired {
        /// Handle of the expired association
        handle: String,
    },

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Cryptographic operation error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for authwire operations
pub type Result<T> = std::result::Result<T, AuthWireError>;

impl AuthWireError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending field
    pub fn validation_field(msg: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a protection failure
    #[must_use]
    pub fn protection(reason: ProtectionFailureReason) -> Self {
        Self::ProtectionFailure { reason }
    }

    /// Create a protocol error from a provider's direct error response
    pub fn protocol(
        code: Option<String>,
        message: impl Into<String>,
        contact: Option<String>,
        reference: Option<String>,
    ) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            contact,
            reference,
        }
    }

    /// Create a token state error
    pub fn token_state(msg: impl Into<String>) -> Self {
        Self::TokenState(msg.into())
    }

    /// Create an association expired error
    pub fn association_expired(handle: impl Into<String>) -> Self {
        Self::AssociationExpired {
            handle: handle.into(),
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a crypto error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// The protection failure reason, if this is a protection failure
    #[must_use]
    pub fn protection_reason(&self) -> Option<ProtectionFailureReason> {
        match self {
            Self::ProtectionFailure { reason } => Some(*reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = AuthWireError::validation_field("missing required field", "oauth_token");
        assert!(err.to_string().contains("missing required field"));
        match err {
            AuthWireError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("oauth_token"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_protection_reason_accessor() {
        let err = AuthWireError::protection(ProtectionFailureReason::ReplayedMessage);
        assert_eq!(
            err.protection_reason(),
            Some(ProtectionFailureReason::ReplayedMessage)
        );
        assert!(AuthWireError::transport("x").protection_reason().is_none());
    }
}
