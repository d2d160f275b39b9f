//! Nonce generation

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

/// Default nonce length in random bytes before encoding
pub const DEFAULT_NONCE_LENGTH: usize = 16;

/// Generate a fresh random nonce, base64url-encoded.
#[must_use]
pub fn generate_nonce(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
