//! # Relay Guardian Keys
//!
//! The relay network authenticates every message it carries. In BridgeLend
//! that authentication is an Ed25519 signature by the relay's guardian key
//! over the message's payload id. Registries are configured with the
//! guardian's public key at `init2` time and reject anything else.
//!
//! Key bytes are never logged.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::Address;

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: expected 32 bytes of hex")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// The guardian's signing keypair.
///
/// Deliberately not `Serialize`: exporting a secret should be an explicit
/// call to [`secret_key_hex`](Self::secret_key_hex).
pub struct GuardianKeypair {
    signing_key: SigningKey,
}

/// Public half of the guardian key, as stored in a registry's cross-chain
/// link.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuardianPublicKey {
    bytes: [u8; 32],
}

/// An Ed25519 signature by the guardian. Always 64 bytes when produced by
/// [`GuardianKeypair::sign`]; anything else fails verification.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSignature {
    bytes: Vec<u8>,
}

impl GuardianKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Load a keypair from a hex-encoded 32-byte secret.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// Hex-encoded secret. Handle with care.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key(&self) -> GuardianPublicKey {
        GuardianPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// On-chain address of the guardian, derived from its public key.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key().bytes)
    }

    pub fn sign(&self, message: &[u8]) -> GuardianSignature {
        GuardianSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }
}

impl Clone for GuardianKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for GuardianKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuardianKeypair(pub={})", self.public_key().to_hex())
    }
}

impl GuardianPublicKey {
    /// Parses and validates raw public key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidPublicKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        Self::from_bytes(arr)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Returns `true` if `signature` is a valid guardian signature over
    /// `message`. Malformed keys or signatures simply fail.
    pub fn verify(&self, message: &[u8], signature: &GuardianSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.bytes.as_slice()) else {
            return false;
        };
        verifying_key
            .verify(message, &DalekSignature::from_bytes(&sig_bytes))
            .is_ok()
    }
}

impl fmt::Display for GuardianPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for GuardianPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuardianPublicKey({})", &self.to_hex()[..16])
    }
}

impl GuardianSignature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for GuardianSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "GuardianSignature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "GuardianSignature({})", hex_str)
        }
    }
}
