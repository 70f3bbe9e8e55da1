//! Relay wire types: the history message and the signed envelope around it.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::RelayError;
use crate::config::{RELAY_MESSAGE_VERSION, RELAY_PAYLOAD_CONTEXT};
use crate::crypto::hash::domain_separated_hash;
use crate::crypto::keys::{GuardianKeypair, GuardianPublicKey, GuardianSignature};
use crate::types::{Address, AssetRef, ChainId, Timestamp};

// ---------------------------------------------------------------------------
// LoanOutcome
// ---------------------------------------------------------------------------

/// How a loan reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanOutcome {
    /// Returned within the loan period.
    Repaid,
    /// Returned after the loan period elapsed but before the lender claimed
    /// default.
    RepaidLate,
    /// The lender claimed default after expiry; collateral went to the lender.
    Defaulted,
}

impl LoanOutcome {
    /// `true` for both repayment outcomes.
    pub fn is_repayment(&self) -> bool {
        matches!(self, LoanOutcome::Repaid | LoanOutcome::RepaidLate)
    }
}

impl fmt::Display for LoanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanOutcome::Repaid => write!(f, "Repaid"),
            LoanOutcome::RepaidLate => write!(f, "RepaidLate"),
            LoanOutcome::Defaulted => write!(f, "Defaulted"),
        }
    }
}

// ---------------------------------------------------------------------------
// HistoryMessage
// ---------------------------------------------------------------------------

/// A closed loan, as reported to the counterpart registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Layout version, see [`RELAY_MESSAGE_VERSION`].
    pub version: u8,
    /// Chain the loan lived on.
    pub source_chain: ChainId,
    /// Registry that closed the loan.
    pub source_registry: Address,
    /// Chain of the counterpart registry.
    pub target_chain: ChainId,
    /// Counterpart registry.
    pub target_registry: Address,
    /// Per-source sequence number, starting at 1, strictly increasing.
    pub sequence: u64,
    /// Whose history this entry belongs to.
    pub borrower: Address,
    /// Lender of the closed loan.
    pub lender: Address,
    /// The asset that was lent.
    pub asset: AssetRef,
    /// How the loan ended.
    pub outcome: LoanOutcome,
    /// Source-chain timestamp of the close.
    pub closed_at: Timestamp,
}

impl HistoryMessage {
    /// Canonical bytes of the message (bincode).
    pub fn encode(&self) -> Result<Vec<u8>, RelayError> {
        bincode::serialize(self).map_err(|e| RelayError::Serialization(e.to_string()))
    }

    /// Content-derived identifier: domain-separated BLAKE3 over
    /// [`encode`](Self::encode).
    pub fn payload_id(&self) -> Result<[u8; 32], RelayError> {
        Ok(domain_separated_hash(RELAY_PAYLOAD_CONTEXT, &self.encode()?))
    }
}

// ---------------------------------------------------------------------------
// RelayEnvelope
// ---------------------------------------------------------------------------

/// A history message as it travels over the relay: content-addressed and
/// signed by the guardian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    /// The message itself.
    pub message: HistoryMessage,
    /// BLAKE3 payload id of `message`.
    pub payload_id: [u8; 32],
    /// Guardian that signed the envelope.
    pub guardian: GuardianPublicKey,
    /// Signature over `payload_id`.
    pub signature: GuardianSignature,
}

impl RelayEnvelope {
    /// Computes the payload id and signs it.
    pub fn seal(message: HistoryMessage, guardian: &GuardianKeypair) -> Result<Self, RelayError> {
        let payload_id = message.payload_id()?;
        let signature = guardian.sign(&payload_id);
        Ok(Self {
            message,
            payload_id,
            guardian: guardian.public_key(),
            signature,
        })
    }

    /// Checks version, guardian identity, content hash and signature, in that
    /// order.
    pub fn verify(&self, expected_guardian: &GuardianPublicKey) -> Result<(), RelayError> {
        if self.message.version != RELAY_MESSAGE_VERSION {
            return Err(RelayError::UnsupportedVersion(self.message.version));
        }
        if &self.guardian != expected_guardian {
            return Err(RelayError::UnknownGuardian);
        }
        if self.message.payload_id()? != self.payload_id {
            return Err(RelayError::PayloadIdMismatch);
        }
        if !self.guardian.verify(&self.payload_id, &self.signature) {
            return Err(RelayError::InvalidSignature);
        }
        Ok(())
    }

    /// Hex rendering of the payload id, for logs.
    pub fn payload_id_hex(&self) -> String {
        hex::encode(self.payload_id)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RelayError> {
        bincode::serialize(self).map_err(|e| RelayError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RelayError> {
        bincode::deserialize(bytes).map_err(|e| RelayError::Serialization(e.to_string()))
    }
}
