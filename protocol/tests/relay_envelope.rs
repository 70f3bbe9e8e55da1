//! Integration tests for the relay wire path.
//!
//! A history message is sealed by the guardian, pushed through the bincode
//! wire format, and verified on the far side against the configured guardian
//! key. Every tamper case must fail verification with a specific error.

use bridgelend_protocol::config::{CHAIN_ID_BSC_TESTNET, CHAIN_ID_POLYGON_MUMBAI, RELAY_MESSAGE_VERSION};
use bridgelend_protocol::crypto::GuardianKeypair;
use bridgelend_protocol::relay::{HistoryMessage, LoanOutcome, RelayEnvelope, RelayError};
use bridgelend_protocol::{Address, AssetRef};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn closed_loan(sequence: u64, outcome: LoanOutcome) -> HistoryMessage {
    HistoryMessage {
        version: RELAY_MESSAGE_VERSION,
        source_chain: CHAIN_ID_POLYGON_MUMBAI,
        source_registry: Address::for_contract(CHAIN_ID_POLYGON_MUMBAI, &Address::from_label("deployer"), 0),
        target_chain: CHAIN_ID_BSC_TESTNET,
        target_registry: Address::for_contract(CHAIN_ID_BSC_TESTNET, &Address::from_label("deployer"), 0),
        sequence,
        borrower: Address::from_label("borrower"),
        lender: Address::from_label("lender"),
        asset: AssetRef::new(Address::from_label("collection"), 7),
        outcome,
        closed_at: 1_700_000_300,
    }
}

/// Seals, encodes and decodes, the way the delivery worker does.
fn over_the_wire(message: HistoryMessage, guardian: &GuardianKeypair) -> RelayEnvelope {
    let sealed = RelayEnvelope::seal(message, guardian).unwrap();
    let bytes = sealed.to_bytes().unwrap();
    RelayEnvelope::from_bytes(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn sealed_envelope_verifies_after_transit() {
    let guardian = GuardianKeypair::generate();
    let envelope = over_the_wire(closed_loan(1, LoanOutcome::Repaid), &guardian);

    envelope.verify(&guardian.public_key()).unwrap();
    assert_eq!(envelope.message.outcome, LoanOutcome::Repaid);
    assert_eq!(envelope.payload_id_hex().len(), 64);
}

#[test]
fn guardian_from_persisted_secret_verifies_same_envelopes() {
    let guardian = GuardianKeypair::generate();
    let restored = GuardianKeypair::from_hex(&guardian.secret_key_hex()).unwrap();
    let envelope = over_the_wire(closed_loan(3, LoanOutcome::Defaulted), &restored);

    envelope.verify(&guardian.public_key()).unwrap();
}

#[test]
fn each_sequence_has_its_own_payload_id() {
    let guardian = GuardianKeypair::from_seed(&[9u8; 32]);
    let first = over_the_wire(closed_loan(1, LoanOutcome::Repaid), &guardian);
    let second = over_the_wire(closed_loan(2, LoanOutcome::Repaid), &guardian);

    assert_ne!(first.payload_id, second.payload_id);
}

#[test]
fn foreign_guardian_is_rejected() {
    let guardian = GuardianKeypair::generate();
    let impostor = GuardianKeypair::generate();
    let envelope = over_the_wire(closed_loan(1, LoanOutcome::Repaid), &impostor);

    assert!(matches!(
        envelope.verify(&guardian.public_key()),
        Err(RelayError::UnknownGuardian)
    ));
}

#[test]
fn rewritten_outcome_breaks_the_payload_id() {
    let guardian = GuardianKeypair::generate();
    let mut envelope = over_the_wire(closed_loan(1, LoanOutcome::Defaulted), &guardian);
    envelope.message.outcome = LoanOutcome::Repaid;

    assert!(matches!(
        envelope.verify(&guardian.public_key()),
        Err(RelayError::PayloadIdMismatch)
    ));
}

#[test]
fn recomputed_id_without_resigning_fails_signature() {
    let guardian = GuardianKeypair::generate();
    let mut envelope = over_the_wire(closed_loan(1, LoanOutcome::Defaulted), &guardian);
    envelope.message.outcome = LoanOutcome::Repaid;
    envelope.payload_id = envelope.message.payload_id().unwrap();

    assert!(matches!(
        envelope.verify(&guardian.public_key()),
        Err(RelayError::InvalidSignature)
    ));
}

#[test]
fn future_message_version_is_rejected() {
    let guardian = GuardianKeypair::generate();
    let mut message = closed_loan(1, LoanOutcome::Repaid);
    message.version = RELAY_MESSAGE_VERSION + 1;
    let envelope = over_the_wire(message, &guardian);

    assert!(matches!(
        envelope.verify(&guardian.public_key()),
        Err(RelayError::UnsupportedVersion(v)) if v == RELAY_MESSAGE_VERSION + 1
    ));
}

#[test]
fn truncated_bytes_fail_to_decode() {
    let guardian = GuardianKeypair::generate();
    let sealed = RelayEnvelope::seal(closed_loan(1, LoanOutcome::Repaid), &guardian).unwrap();
    let bytes = sealed.to_bytes().unwrap();

    assert!(matches!(
        RelayEnvelope::from_bytes(&bytes[..bytes.len() / 2]),
        Err(RelayError::Serialization(_))
    ));
}
