//! Cryptographic primitives
//!
//! Signature methods (HMAC-SHA1, HMAC-SHA256, RSA-SHA1, PLAINTEXT), the
//! canonical signature base string both signer and verifier must compute
//! byte-for-byte, Diffie-Hellman key agreement for association
//! establishment, and nonce generation.
//!
//! Everything here is pure and CPU-bound; no function in this module
//! performs I/O.

pub mod base_string;
pub mod dh;
pub mod nonce_gen;
pub mod signatures;

pub use base_string::signature_base_string;
pub use dh::{DhKeyPair, DhSessionHash};
pub use nonce_gen::{DEFAULT_NONCE_LENGTH, generate_nonce};
pub use signatures::{AssociationAlgorithm, SignatureMethod, SigningCredential};
