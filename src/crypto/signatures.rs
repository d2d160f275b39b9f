//! Signature methods and signing credentials
//!
//! A [`SigningCredential`] is scoped to one relationship (a
//! consumer/provider pair or an association). The binding pipeline
//! borrows it per operation; nothing here persists secret material.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::{AuthWireError, Result};
use crate::types::{AssociationHandle, ConsumerKey};
use crate::utils::percent_encode;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Methods and Algorithms
// ============================================================================

/// OAuth signature methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMethod {
    /// HMAC-SHA1 keyed with the encoded consumer and token secrets
    HmacSha1,
    /// HMAC-SHA256 keyed the same way
    HmacSha256,
    /// RSA-SHA1 over the signature base string
    RsaSha1,
    /// The bare key string; only meaningful over a confidential transport
    Plaintext,
}

impl SignatureMethod {
    /// Wire name of the method
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::HmacSha1 => "HMAC-SHA1",
            Self::HmacSha256 => "HMAC-SHA256",
            Self::RsaSha1 => "RSA-SHA1",
            Self::Plaintext => "PLAINTEXT",
        }
    }

    /// Parse a wire method name
    ///
    /// # Errors
    /// Returns a validation error for unknown method names.
    pub fn from_wire_name(name: &str) -> Result<Self> {
        match name {
            "HMAC-SHA1" => Ok(Self::HmacSha1),
            "HMAC-SHA256" => Ok(Self::HmacSha256),
            "RSA-SHA1" => Ok(Self::RsaSha1),
            "PLAINTEXT" => Ok(Self::Plaintext),
            other => Err(AuthWireError::validation(format!(
                "unknown signature method {other:?}"
            ))),
        }
    }
}

/// Signature algorithms an association can be established with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationAlgorithm {
    /// HMAC-SHA1 with a 20-byte MAC key
    HmacSha1,
    /// HMAC-SHA256 with a 32-byte MAC key
    HmacSha256,
}

impl AssociationAlgorithm {
    /// Wire name of the algorithm
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::HmacSha1 => "HMAC-SHA1",
            Self::HmacSha256 => "HMAC-SHA256",
        }
    }

    /// Expected MAC key length in bytes
    #[must_use]
    pub fn mac_key_len(&self) -> usize {
        match self {
            Self::HmacSha1 => 20,
            Self::HmacSha256 => 32,
        }
    }

    /// Parse a wire algorithm name
    ///
    /// # Errors
    /// Returns a validation error for unknown algorithm names.
    pub fn from_wire_name(name: &str) -> Result<Self> {
        match name {
            "HMAC-SHA1" => Ok(Self::HmacSha1),
            "HMAC-SHA256" => Ok(Self::HmacSha256),
            other => Err(AuthWireError::validation(format!(
                "unknown association algorithm {other:?}"
            ))),
        }
    }
}

// ============================================================================
// Signing Credential
// ============================================================================

/// Secret material for signing and verifying one relationship's messages
#[derive(Clone)]
pub enum SigningCredential {
    /// OAuth consumer credential signing with shared secrets
    Consumer {
        /// The consumer's key
        key: ConsumerKey,
        /// The consumer's shared secret
        consumer_secret: String,
        /// The token secret, empty before any token is issued
        token_secret: String,
        /// Method used to sign (HMAC variants or PLAINTEXT)
        method: SignatureMethod,
    },
    /// OAuth consumer credential signing with an RSA key pair
    Rsa {
        /// The consumer's key
        key: ConsumerKey,
        /// Private half; absent on the verifying side
        private_key: Option<RsaPrivateKey>,
        /// Public half
        public_key: RsaPublicKey,
    },
    /// OpenID association MAC key
    Association {
        /// The association handle
        handle: AssociationHandle,
        /// The shared MAC key
        mac_key: Vec<u8>,
        /// The algorithm negotiated for the association
        algorithm: AssociationAlgorithm,
    },
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consumer { key, method, .. } => f
                .debug_struct("Consumer")
                .field("key", key)
                .field("method", method)
                .finish_non_exhaustive(),
            Self::Rsa { key, .. } => f
                .debug_struct("Rsa")
                .field("key", key)
                .finish_non_exhaustive(),
            Self::Association {
                handle, algorithm, ..
            } => f
                .debug_struct("Association")
                .field("handle", handle)
                .field("algorithm", algorithm)
                .finish_non_exhaustive(),
        }
    }
}

impl SigningCredential {
    /// Wire name of the signature method this credential signs with
    #[must_use]
    pub fn method_wire_name(&self) -> &'static str {
        match self {
            Self::Consumer { method, .. } => method.wire_name(),
            Self::Rsa { .. } => SignatureMethod::RsaSha1.wire_name(),
            Self::Association { algorithm, .. } => algorithm.wire_name(),
        }
    }

    /// Identity string for replay-context derivation.
    ///
    /// Distinct relationships must never share a nonce context, so the
    /// identity embeds the credential kind and its scoping key.
    #[must_use]
    pub fn identity(&self) -> String {
        match self {
            Self::Consumer { key, .. } => format!("oauth:{key}"),
            Self::Rsa { key, .. } => format!("rsa:{key}"),
            Self::Association { handle, .. } => format!("assoc:{handle}"),
        }
    }

    fn oauth_key(consumer_secret: &str, token_secret: &str) -> String {
        format!(
            "{}&{}",
            percent_encode(consumer_secret),
            percent_encode(token_secret)
        )
    }

    /// Sign a base string, producing the wire signature value.
    ///
    /// Deterministic: the same base string and credential always yield
    /// the same signature.
    ///
    /// # Errors
    /// Returns a crypto error when signing key material is unusable, and
    /// a missing-credential protection failure when asked to sign with a
    /// verify-only RSA credential.
    pub fn sign(&self, base_string: &str) -> Result<String> {
        match self {
            Self::Consumer {
                consumer_secret,
                token_secret,
                method,
                ..
            } => {
                let key = Self::oauth_key(consumer_secret, token_secret);
                match method {
                    SignatureMethod::HmacSha1 => {
                        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
                            .map_err(|e| AuthWireError::crypto(format!("HMAC key: {e}")))?;
                        mac.update(base_string.as_bytes());
                        Ok(STANDARD.encode(mac.finalize().into_bytes()))
                    }
                    SignatureMethod::HmacSha256 => {
                        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
                            .map_err(|e| AuthWireError::crypto(format!("HMAC key: {e}")))?;
                        mac.update(base_string.as_bytes());
                        Ok(STANDARD.encode(mac.finalize().into_bytes()))
                    }
                    SignatureMethod::Plaintext => Ok(key),
                    SignatureMethod::RsaSha1 => Err(AuthWireError::crypto(
                        "RSA-SHA1 requires an RSA credential, not shared secrets",
                    )),
                }
            }
            Self::Rsa { private_key, .. } => {
                let private = private_key.as_ref().ok_or(AuthWireError::protection(
                    crate::error::ProtectionFailureReason::MissingCredential,
                ))?;
                let signing_key = SigningKey::<Sha1>::new(private.clone());
                let signature = signing_key.sign(base_string.as_bytes());
                Ok(STANDARD.encode(signature.to_bytes()))
            }
            Self::Association {
                mac_key, algorithm, ..
            } => match algorithm {
                AssociationAlgorithm::HmacSha1 => {
                    let mut mac = HmacSha1::new_from_slice(mac_key)
                        .map_err(|e| AuthWireError::crypto(format!("MAC key: {e}")))?;
                    mac.update(base_string.as_bytes());
                    Ok(STANDARD.encode(mac.finalize().into_bytes()))
                }
                AssociationAlgorithm::HmacSha256 => {
                    let mut mac = HmacSha256::new_from_slice(mac_key)
                        .map_err(|e| AuthWireError::crypto(format!("MAC key: {e}")))?;
                    mac.update(base_string.as_bytes());
                    Ok(STANDARD.encode(mac.finalize().into_bytes()))
                }
            },
        }
    }

    /// Verify a claimed signature against a base string.
    ///
    /// MAC comparisons are constant-time; there is no partial-match
    /// tolerance anywhere.
    ///
    /// # Errors
    /// Returns a crypto error when key material is unusable. A claimed
    /// signature that is merely wrong (including undecodable base64)
    /// yields `Ok(false)`.
    pub fn verify(&self, base_string: &str, claimed: &str) -> Result<bool> {
        match self {
            Self::Consumer {
                consumer_secret,
                token_secret,
                method,
                ..
            } => {
                let key = Self::oauth_key(consumer_secret, token_secret);
                match method {
                    SignatureMethod::HmacSha1 => {
                        let Ok(claimed_bytes) = STANDARD.decode(claimed) else {
                            return Ok(false);
                        };
                        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
                            .map_err(|e| AuthWireError::crypto(format!("HMAC key: {e}")))?;
                        mac.update(base_string.as_bytes());
                        Ok(mac.verify_slice(&claimed_bytes).is_ok())
                    }
                    SignatureMethod::HmacSha256 => {
                        let Ok(claimed_bytes) = STANDARD.decode(claimed) else {
                            return Ok(false);
                        };
                        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
                            .map_err(|e| AuthWireError::crypto(format!("HMAC key: {e}")))?;
                        mac.update(base_string.as_bytes());
                        Ok(mac.verify_slice(&claimed_bytes).is_ok())
                    }
                    SignatureMethod::Plaintext => Ok(claimed == key),
                    SignatureMethod::RsaSha1 => Err(AuthWireError::crypto(
                        "RSA-SHA1 requires an RSA credential, not shared secrets",
                    )),
                }
            }
            Self::Rsa { public_key, .. } => {
                let Ok(claimed_bytes) = STANDARD.decode(claimed) else {
                    return Ok(false);
                };
                let Ok(signature) = Signature::try_from(claimed_bytes.as_slice()) else {
                    return Ok(false);
                };
                let verifying_key = VerifyingKey::<Sha1>::new(public_key.clone());
                Ok(verifying_key
                    .verify(base_string.as_bytes(), &signature)
                    .is_ok())
            }
            Self::Association { .. } => {
                let expected = self.sign(base_string)?;
                let Ok(claimed_bytes) = STANDARD.decode(claimed) else {
                    return Ok(false);
                };
                let Ok(expected_bytes) = STANDARD.decode(&expected) else {
                    return Ok(false);
                };
                // Both sides are freshly computed MACs; compare via the
                // constant-time helper to keep behavior uniform.
                Ok(constant_time_eq(&expected_bytes, &claimed_bytes))
            }
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer_credential() -> SigningCredential {
        SigningCredential::Consumer {
            key: ConsumerKey::new("consumer1"),
            consumer_secret: "kd94hf93k423kf44".to_string(),
            token_secret: "pfkkdhi9sl3r4s00".to_string(),
            method: SignatureMethod::HmacSha1,
        }
    }

    #[test]
    fn test_method_wire_names_round_trip() {
        for method in [
            SignatureMethod::HmacSha1,
            SignatureMethod::HmacSha256,
            SignatureMethod::RsaSha1,
            SignatureMethod::Plaintext,
        ] {
            assert_eq!(
                SignatureMethod::from_wire_name(method.wire_name()).unwrap(),
                method
            );
        }
        assert!(SignatureMethod::from_wire_name("MD5").is_err());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let credential = consumer_credential();
        let base = "POST&https%3A%2F%2Fprovider.example%2Frt&a%3D1";
        let first = credential.sign(base).unwrap();
        let second = credential.sign(base).unwrap();
        assert_eq!(first, second);
        assert!(credential.verify(base, &first).unwrap());
    }

    #[test]
    fn test_tampered_base_string_fails_verification() {
        let credential = consumer_credential();
        let signature = credential.sign("POST&uri&a%3D1").unwrap();
        assert!(!credential.verify("POST&uri&a%3D2", &signature).unwrap());
    }

    #[test]
    fn test_undecodable_signature_is_false_not_error() {
        let credential = consumer_credential();
        assert!(!credential.verify("base", "!!!not-base64!!!").unwrap());
    }

    #[test]
    fn test_plaintext_signature_is_key_string() {
        let credential = SigningCredential::Consumer {
            key: ConsumerKey::new("consumer1"),
            consumer_secret: "djr9rjt0jd78jf88".to_string(),
            token_secret: "jjd999tj88uiths3".to_string(),
            method: SignatureMethod::Plaintext,
        };
        assert_eq!(
            credential.sign("ignored").unwrap(),
            "djr9rjt0jd78jf88&jjd999tj88uiths3"
        );
    }

    #[test]
    fn test_association_credential_signs_and_verifies() {
        let credential = SigningCredential::Association {
            handle: AssociationHandle::new("h1"),
            mac_key: vec![7u8; 32],
            algorithm: AssociationAlgorithm::HmacSha256,
        };
        let signature = credential.sign("base-string").unwrap();
        assert!(credential.verify("base-string", &signature).unwrap());
        assert!(!credential.verify("other", &signature).unwrap());
    }

    #[test]
    fn test_association_algorithm_key_lengths() {
        assert_eq!(AssociationAlgorithm::HmacSha1.mac_key_len(), 20);
        assert_eq!(AssociationAlgorithm::HmacSha256.mac_key_len(), 32);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", consumer_credential());
        assert!(!rendered.contains("kd94hf93k423kf44"));
        assert!(rendered.contains("consumer1"));
    }
}
