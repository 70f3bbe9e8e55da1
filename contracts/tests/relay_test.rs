//! Integration tests for cross-chain history mirroring.
//!
//! Two registries on two chains, linked to each other through a relay entry
//! point with a guardian key. Messages are moved by hand here; the node's
//! delivery worker does the same thing on a timer.

use std::sync::Arc;

use bridgelend_contracts::{Chain, LoanRegistry, ReceiveOutcome, RelayEntryPoint, ScoreGate};
use bridgelend_protocol::crypto::GuardianKeypair;
use bridgelend_protocol::relay::{HistoryMessage, LoanOutcome, RelayEnvelope, RelayError};
use bridgelend_protocol::{Address, AssetRef, ChainId, ManualClock};

const NATIVE: Address = Address::ZERO;

struct Side {
    clock: Arc<ManualClock>,
    chain: Arc<Chain>,
    registry: Arc<LoanRegistry>,
    gate: Arc<ScoreGate>,
}

struct Bridge {
    polygon: Side,
    bsc: Side,
    guardian: GuardianKeypair,
    relayer: Address,
    lender: Address,
    borrower: Address,
}

fn side(chain_id: ChainId, owner: Address) -> Side {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let chain = Arc::new(Chain::new(chain_id, clock.clone()));
    let registry = LoanRegistry::deploy(chain.clone(), owner);
    let gate = ScoreGate::deploy(chain.clone(), &owner, registry.address(), 1, 0);
    registry.init(&owner, gate.clone(), NATIVE).unwrap();
    Side {
        clock,
        chain,
        registry,
        gate,
    }
}

/// Helper: two linked registries, a credentialed borrower on Polygon.
fn bridge() -> Bridge {
    let owner = Address::from_label("owner");
    let polygon = side(ChainId(5), owner);
    let bsc = side(ChainId(4), owner);
    let guardian = GuardianKeypair::generate();
    let relayer = Address::from_label("relayer");
    let entry = RelayEntryPoint {
        address: relayer,
        guardian: guardian.public_key(),
    };

    polygon
        .registry
        .init2(&owner, bsc.registry.address(), entry, bsc.chain.chain_id())
        .unwrap();
    bsc.registry
        .init2(&owner, polygon.registry.address(), entry, polygon.chain.chain_id())
        .unwrap();

    let lender = Address::from_label("lender");
    let borrower = Address::from_label("borrower");
    polygon.chain.funds().credit(NATIVE, borrower, 1_000).unwrap();
    polygon.gate.mint(borrower, 1).unwrap();

    Bridge {
        polygon,
        bsc,
        guardian,
        relayer,
        lender,
        borrower,
    }
}

/// Helper: runs one loan on Polygon from listing to a return, token `id`.
fn repay_loan(b: &Bridge, id: u128) {
    let p = &b.polygon;
    let asset = AssetRef::new(Address::from_label("collection"), id);
    p.chain.assets().mint(asset, b.lender).unwrap();
    p.chain.assets().approve(&b.lender, &asset, p.registry.address()).unwrap();
    p.registry.offer_for_loaning(b.lender, asset, 600).unwrap();
    p.registry.request_to_borrow(b.borrower, asset).unwrap();
    p.registry.approve_loan_request(b.lender, asset, b.borrower, 1, 9).unwrap();
    p.registry.borrow_nft(b.borrower, asset, 10).unwrap();
    p.chain.assets().approve(&b.borrower, &asset, p.registry.address()).unwrap();
    p.registry.return_nft(b.borrower, asset).unwrap();
}

fn seal(b: &Bridge, message: HistoryMessage) -> RelayEnvelope {
    RelayEnvelope::seal(message, &b.guardian).unwrap()
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[test]
fn closing_a_loan_queues_exactly_one_message() {
    let b = bridge();
    repay_loan(&b, 1);

    let pending = b.polygon.registry.pending_messages();
    assert_eq!(pending.len(), 1);
    let message = &pending[0];
    assert_eq!(message.sequence, 1);
    assert_eq!(message.outcome, LoanOutcome::Repaid);
    assert_eq!(message.source_chain, ChainId(5));
    assert_eq!(message.target_chain, ChainId(4));
    assert_eq!(message.target_registry, b.bsc.registry.address());
    assert_eq!(message.borrower, b.borrower);
}

#[test]
fn unlinked_registry_closes_without_relaying() {
    let owner = Address::from_label("owner");
    let lone = side(ChainId(5), owner);
    let lender = Address::from_label("lender");
    let borrower = Address::from_label("borrower");
    let asset = AssetRef::new(Address::from_label("collection"), 1);

    lone.chain.funds().credit(NATIVE, borrower, 100).unwrap();
    lone.gate.mint(borrower, 1).unwrap();
    lone.chain.assets().mint(asset, lender).unwrap();
    lone.chain.assets().approve(&lender, &asset, lone.registry.address()).unwrap();
    lone.registry.offer_for_loaning(lender, asset, 60).unwrap();
    lone.registry.request_to_borrow(borrower, asset).unwrap();
    lone.registry.approve_loan_request(lender, asset, borrower, 1, 9).unwrap();
    lone.registry.borrow_nft(borrower, asset, 10).unwrap();
    lone.chain.assets().approve(&borrower, &asset, lone.registry.address()).unwrap();

    let closed = lone.registry.return_nft(borrower, asset).unwrap();
    assert_eq!(closed.outcome, Some(LoanOutcome::Repaid));
    assert_eq!(lone.registry.outbox_len(), 0);
    assert_eq!(lone.gate.history_of(&borrower).repaid, 1);
}

#[test]
fn late_return_is_reported_as_repaid_late() {
    let b = bridge();
    let p = &b.polygon;
    let asset = AssetRef::new(Address::from_label("collection"), 9);
    p.chain.assets().mint(asset, b.lender).unwrap();
    p.chain.assets().approve(&b.lender, &asset, p.registry.address()).unwrap();
    p.registry.offer_for_loaning(b.lender, asset, 60).unwrap();
    p.registry.request_to_borrow(b.borrower, asset).unwrap();
    p.registry.approve_loan_request(b.lender, asset, b.borrower, 1, 9).unwrap();
    p.registry.borrow_nft(b.borrower, asset, 10).unwrap();
    p.clock.advance(61);
    p.chain.assets().approve(&b.borrower, &asset, p.registry.address()).unwrap();
    p.registry.return_nft(b.borrower, asset).unwrap();

    let pending = p.registry.pending_messages();
    assert_eq!(pending[0].outcome, LoanOutcome::RepaidLate);
}

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

#[test]
fn delivered_message_updates_counterpart_history() {
    let b = bridge();
    repay_loan(&b, 1);
    let message = b.polygon.registry.pending_messages().remove(0);

    let outcome = b
        .bsc
        .registry
        .receive_relay(&b.relayer, &seal(&b, message))
        .unwrap();
    assert_eq!(outcome, ReceiveOutcome::Applied { applied: 1 });

    let history = b.bsc.gate.history_of(&b.borrower);
    assert_eq!(history.repaid, 1);
    assert_eq!(history.entries[0].origin_chain, ChainId(5));
    assert!(b.polygon.registry.ack_message(1));
    assert_eq!(b.polygon.registry.outbox_len(), 0);
}

#[test]
fn duplicate_delivery_applies_once() {
    let b = bridge();
    repay_loan(&b, 1);
    let envelope = seal(&b, b.polygon.registry.pending_messages().remove(0));

    // Through the wire format, twice.
    let bytes = envelope.to_bytes().unwrap();
    let first = RelayEnvelope::from_bytes(&bytes).unwrap();
    let second = RelayEnvelope::from_bytes(&bytes).unwrap();

    assert_eq!(
        b.bsc.registry.receive_relay(&b.relayer, &first).unwrap(),
        ReceiveOutcome::Applied { applied: 1 }
    );
    assert_eq!(
        b.bsc.registry.receive_relay(&b.relayer, &second).unwrap(),
        ReceiveOutcome::Duplicate
    );
    assert_eq!(b.bsc.gate.history_of(&b.borrower).entries.len(), 1);
    assert_eq!(
        b.bsc.registry.last_applied(ChainId(5), &b.polygon.registry.address()),
        1
    );
}

#[test]
fn out_of_order_delivery_waits_for_the_gap() {
    let b = bridge();
    repay_loan(&b, 1);
    repay_loan(&b, 2);
    let pending = b.polygon.registry.pending_messages();
    assert_eq!(pending.len(), 2);

    assert_eq!(
        b.bsc
            .registry
            .receive_relay(&b.relayer, &seal(&b, pending[1].clone()))
            .unwrap(),
        ReceiveOutcome::Buffered
    );
    assert_eq!(b.bsc.gate.history_of(&b.borrower).repaid, 0);

    assert_eq!(
        b.bsc
            .registry
            .receive_relay(&b.relayer, &seal(&b, pending[0].clone()))
            .unwrap(),
        ReceiveOutcome::Applied { applied: 2 }
    );
    assert_eq!(b.bsc.gate.history_of(&b.borrower).repaid, 2);
}

#[test]
fn unknown_relayer_is_rejected() {
    let b = bridge();
    repay_loan(&b, 1);
    let envelope = seal(&b, b.polygon.registry.pending_messages().remove(0));
    let intruder = Address::from_label("intruder");

    assert!(matches!(
        b.bsc.registry.receive_relay(&intruder, &envelope),
        Err(RelayError::UnauthorizedRelayer { .. })
    ));
    assert_eq!(b.bsc.gate.history_of(&b.borrower).entries.len(), 0);
}

#[test]
fn foreign_guardian_is_rejected() {
    let b = bridge();
    repay_loan(&b, 1);
    let forged = RelayEnvelope::seal(
        b.polygon.registry.pending_messages().remove(0),
        &GuardianKeypair::generate(),
    )
    .unwrap();

    assert!(matches!(
        b.bsc.registry.receive_relay(&b.relayer, &forged),
        Err(RelayError::UnknownGuardian)
    ));
}

#[test]
fn message_for_another_registry_is_rejected() {
    let b = bridge();
    repay_loan(&b, 1);
    let mut message = b.polygon.registry.pending_messages().remove(0);
    message.target_registry = Address::from_label("someone-else");

    assert!(matches!(
        b.bsc.registry.receive_relay(&b.relayer, &seal(&b, message)),
        Err(RelayError::WrongDestination { .. })
    ));
}

#[test]
fn message_from_a_stranger_registry_is_rejected() {
    let b = bridge();
    repay_loan(&b, 1);
    let mut message = b.polygon.registry.pending_messages().remove(0);
    message.source_registry = Address::from_label("impostor");

    assert!(matches!(
        b.bsc.registry.receive_relay(&b.relayer, &seal(&b, message)),
        Err(RelayError::UnexpectedSource { .. })
    ));
}

#[test]
fn unlinked_registry_refuses_delivery() {
    let owner = Address::from_label("owner");
    let lone = side(ChainId(4), owner);
    let b = bridge();
    repay_loan(&b, 1);
    let envelope = seal(&b, b.polygon.registry.pending_messages().remove(0));

    assert!(matches!(
        lone.registry.receive_relay(&b.relayer, &envelope),
        Err(RelayError::NotLinked)
    ));
}
