//! # Cryptographic Primitives
//!
//! Thin wrappers over audited implementations:
//!
//! - **BLAKE3** for payload ids and deterministic contract addresses.
//! - **SHA-256** for deriving account addresses from public keys.
//! - **Ed25519** for the relay guardian that signs every cross-chain
//!   history message.

pub mod hash;
pub mod keys;

pub use hash::{blake3_hash_multi, domain_separated_hash, sha256_array};
pub use keys::{GuardianKeypair, GuardianPublicKey, GuardianSignature, KeyError};
