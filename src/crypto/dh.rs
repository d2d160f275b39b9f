//! Diffie-Hellman key agreement for association establishment
//!
//! Numbers travel in btwoc form (big-endian two's complement, minimal
//! length) wrapped in base64. The MAC key comes back XOR-masked with the
//! digest of the shared secret; masking and unmasking are the same
//! operation.

use base64::{Engine, engine::general_purpose::STANDARD};
use num_bigint::BigUint;
use num_traits::One;
use rand::RngCore;
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::{AuthWireError, Result};

/// The default 1024-bit modulus, btwoc base64 as it appears on the wire
pub const DEFAULT_MODULUS_BASE64: &str = "ANz5OguIOXLsDhmYmsWizjEOHTdxfo2Vcbt2I3MYZuYe\
91ouJ4mLBX+YkcLiemOcPym2CBRYHNOyyjmG0mg3BVd9RcLn5S3IHHoXGHblzqdLFEi/368Ygo79JRnxTkXj\
gmY0rxlJ5bU1zIKaSDuKdiI+XUkKJX8Fvf8W8vsixYOr";

/// The default generator
pub const DEFAULT_GENERATOR: u32 = 2;

/// Hash used to derive the secret-masking digest, fixed by the session
/// type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhSessionHash {
    /// SHA-1, 20-byte digest (DH-SHA1 sessions)
    Sha1,
    /// SHA-256, 32-byte digest (DH-SHA256 sessions)
    Sha256,
}

impl DhSessionHash {
    /// Digest length in bytes
    #[must_use]
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
        }
    }
}

/// Encode a number in btwoc form: minimal big-endian bytes with the sign
/// bit clear.
#[must_use]
pub fn btwoc(value: &BigUint) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        let mut padded = Vec::with_capacity(bytes.len() + 1);
        padded.push(0);
        padded.extend_from_slice(&bytes);
        padded
    } else {
        bytes
    }
}

/// Decode a btwoc byte string into a number
#[must_use]
pub fn from_btwoc(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Parse a base64 btwoc wire value into a number
///
/// # Errors
/// Returns a validation error when the value is not valid base64.
pub fn parse_public(value: &str) -> Result<BigUint> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|_| AuthWireError::validation("public key is not valid base64"))?;
    Ok(from_btwoc(&bytes))
}

/// Encode a number as a base64 btwoc wire value
#[must_use]
pub fn encode_public(value: &BigUint) -> String {
    STANDARD.encode(btwoc(value))
}

/// An ephemeral Diffie-Hellman key pair
pub struct DhKeyPair {
    modulus: BigUint,
    private: BigUint,
    public: BigUint,
}

impl DhKeyPair {
    /// Generate a key pair over the default modulus and generator
    #[must_use]
    pub fn generate() -> Self {
        let modulus = from_btwoc(
            &STANDARD
                .decode(DEFAULT_MODULUS_BASE64)
                .expect("default modulus constant is valid base64"),
        );
        Self::generate_with(modulus, BigUint::from(DEFAULT_GENERATOR))
    }

    /// Generate a key pair over explicit group parameters
    #[must_use]
    pub fn generate_with(modulus: BigUint, generator: BigUint) -> Self {
        let mut bytes = vec![0u8; (modulus.bits() as usize).div_ceil(8)];
        rand::thread_rng().fill_bytes(&mut bytes);
        // Reduce into [1, p-2]; the group order excludes 0 and p-1.
        let span = &modulus - BigUint::from(2u32);
        let private = BigUint::from_bytes_be(&bytes) % span + BigUint::one();
        let public = generator.modpow(&private, &modulus);
        Self {
            modulus,
            private,
            public,
        }
    }

    /// The public component, base64 btwoc for the wire
    #[must_use]
    pub fn public_base64(&self) -> String {
        encode_public(&self.public)
    }

    /// The public component as a number
    #[must_use]
    pub fn public(&self) -> &BigUint {
        &self.public
    }

    /// Derive the shared secret from the other party's public component
    #[must_use]
    pub fn shared_secret(&self, other_public: &BigUint) -> BigUint {
        other_public.modpow(&self.private, &self.modulus)
    }
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public", &self.public_base64())
            .finish_non_exhaustive()
    }
}

/// XOR a MAC key with the digest of the shared secret.
///
/// Applying this to a plaintext key wraps it; applying it to a wrapped
/// key recovers the plaintext.
///
/// # Errors
/// Returns a crypto error when the key length does not match the session
/// hash's digest length.
pub fn mask_mac_key(shared: &BigUint, key: &[u8], hash: DhSessionHash) -> Result<Vec<u8>> {
    if key.len() != hash.digest_len() {
        return Err(AuthWireError::crypto(format!(
            "MAC key length {} does not match session digest length {}",
            key.len(),
            hash.digest_len()
        )));
    }
    let digest = hash.digest(&btwoc(shared));
    Ok(key.iter().zip(digest.iter()).map(|(k, d)| k ^ d).collect())
}
