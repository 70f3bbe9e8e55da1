//! # Hashing Utilities
//!
//! - **BLAKE3** for relay payload ids (domain separated) and for deriving
//!   contract and labelled account addresses.
//! - **SHA-256** for account addresses derived from Ed25519 public keys.

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as a fixed-size array.
///
/// ```
/// use bridgelend_protocol::crypto::sha256_array;
///
/// assert_eq!(sha256_array(b"bridgelend").len(), 32);
/// ```
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// BLAKE3 over `parts` in order, as if concatenated.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// BLAKE3 in `derive_key` mode under `context`.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}
