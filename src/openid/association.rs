//! Associations
//!
//! A shared-secret relationship between relying party and provider,
//! established by the associate handshake and used to sign subsequent
//! messages until it expires. An expired association must be discarded;
//! offering one for signing is a caller error.

use std::time::{Duration, SystemTime};

use crate::crypto::dh::DhSessionHash;
use crate::crypto::{AssociationAlgorithm, SigningCredential};
use crate::error::{AuthWireError, Result};
use crate::types::AssociationHandle;

/// Key-exchange session types for the associate handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    /// The MAC key travels in the clear; only permitted over a transport
    /// that itself provides confidentiality
    NoEncryption,
    /// Diffie-Hellman with SHA-1 key derivation
    DhSha1,
    /// Diffie-Hellman with SHA-256 key derivation
    DhSha256,
}

impl SessionType {
    /// Wire name of the session type
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::NoEncryption => "no-encryption",
            Self::DhSha1 => "DH-SHA1",
            Self::DhSha256 => "DH-SHA256",
        }
    }

    /// Parse a wire session type name
    ///
    /// # Errors
    /// Returns a validation error for unknown names.
    pub fn from_wire_name(name: &str) -> Result<Self> {
        match name {
            "no-encryption" | "" => Ok(Self::NoEncryption),
            "DH-SHA1" => Ok(Self::DhSha1),
            "DH-SHA256" => Ok(Self::DhSha256),
            other => Err(AuthWireError::validation(format!(
                "unknown session type {other:?}"
            ))),
        }
    }

    /// The key-derivation hash, for Diffie-Hellman session types
    #[must_use]
    pub fn dh_hash(&self) -> Option<DhSessionHash> {
        match self {
            Self::NoEncryption => None,
            Self::DhSha1 => Some(DhSessionHash::Sha1),
            Self::DhSha256 => Some(DhSessionHash::Sha256),
        }
    }
}

/// An established association
#[derive(Clone)]
pub struct Association {
    /// Provider-issued opaque handle
    pub handle: AssociationHandle,
    secret: Vec<u8>,
    /// Signing algorithm negotiated for this association
    pub algorithm: AssociationAlgorithm,
    /// Instant past which the association must not sign
    pub expires_at: SystemTime,
}

impl Association {
    /// Create an association expiring after `expires_in`.
    ///
    /// # Errors
    /// Returns a validation error when the secret length does not match
    /// the algorithm's MAC key length.
    pub fn new(
        handle: AssociationHandle,
        secret: Vec<u8>,
        algorithm: AssociationAlgorithm,
        expires_in: Duration,
    ) -> Result<Self> {
        if secret.len() != algorithm.mac_key_len() {
            return Err(AuthWireError::validation(format!(
                "association secret is {} bytes, {} requires {}",
                secret.len(),
                algorithm.wire_name(),
                algorithm.mac_key_len()
            )));
        }
        Ok(Self {
            handle,
            secret,
            algorithm,
            expires_at: SystemTime::now() + expires_in,
        })
    }

    /// Whether the association has reached its expiration timestamp
    #[must_use]
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// Remaining validity, if any
    #[must_use]
    pub fn remaining_validity(&self) -> Option<Duration> {
        self.expires_at.duration_since(SystemTime::now()).ok()
    }

    /// The shared MAC key
    #[must_use]
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// A signing credential for this association.
    ///
    /// # Errors
    /// Returns an association-expired error once the expiration
    /// timestamp has passed; a fresh negotiation must occur instead.
    pub fn credential(&self) -> Result<SigningCredential> {
        if self.is_expired() {
            return Err(AuthWireError::association_expired(self.handle.as_str()));
        }
        Ok(SigningCredential::Association {
            handle: self.handle.clone(),
            mac_key: self.secret.clone(),
            algorithm: self.algorithm,
        })
    }
}

impl std::fmt::Debug for Association {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Association")
            .field("handle", &self.handle)
            .field("algorithm", &self.algorithm)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
