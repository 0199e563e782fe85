//! Cryptographic primitives for key negotiation.
//!
//! Two operations: drawing 32-byte nonces from the operating system RNG and
//! deriving the shared key from a completed exchange.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use keyneg_types::{CryptoError, KEY_SIZE, NONCE_SIZE};

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Generate a fresh 32-byte nonce.
///
/// Failure of the OS random source aborts the session rather than falling
/// back to a weaker generator.
pub fn generate_nonce() -> CryptoResult<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|_| CryptoError::RngFailure)?;
    Ok(nonce)
}

/// Derive the shared key for a completed exchange: SHA-256(r1 ‖ r2).
///
/// Deterministic and pure; both endpoints compute the same key from the same
/// pair of nonces.
pub fn derive_key(random1: &[u8; NONCE_SIZE], random2: &[u8; NONCE_SIZE]) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(random1);
    hasher.update(random2);
    hasher.finalize().into()
}
