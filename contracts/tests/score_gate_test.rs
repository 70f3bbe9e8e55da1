//! Integration tests for the score gate: paid credentials, eligibility, and
//! how loan outcomes move a borrower's score.

use std::sync::Arc;

use bridgelend_contracts::{Chain, LoanError, LoanRegistry, ScoreError, ScoreGate};
use bridgelend_protocol::config::{BASE_CREDIT_SCORE, SCORE_DEFAULT_PENALTY};
use bridgelend_protocol::{parse_ether, Address, AssetRef, ChainId, ManualClock};

const NATIVE: Address = Address::ZERO;

fn deploy(min_score: u32) -> (Arc<ManualClock>, Arc<Chain>, Arc<LoanRegistry>, Arc<ScoreGate>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let chain = Arc::new(Chain::new(ChainId(5), clock.clone()));
    let owner = Address::from_label("owner");
    let registry = LoanRegistry::deploy(chain.clone(), owner);
    let gate = ScoreGate::deploy(
        chain.clone(),
        &owner,
        registry.address(),
        parse_ether("0.1").unwrap(),
        min_score,
    );
    registry.init(&owner, gate.clone(), NATIVE).unwrap();
    (clock, chain, registry, gate)
}

// ---------------------------------------------------------------------------
// Minting
// ---------------------------------------------------------------------------

#[test]
fn double_mint_charges_once() {
    let (_, chain, registry, gate) = deploy(0);
    let alice = Address::from_label("alice");
    let payment = parse_ether("0.2").unwrap();
    chain.funds().credit(NATIVE, alice, parse_ether("1").unwrap()).unwrap();

    gate.mint(alice, payment).unwrap();
    assert_eq!(gate.mint(alice, payment), Err(ScoreError::AlreadyCredentialed(alice)));

    assert_eq!(chain.balance_of(&NATIVE, &registry.address()), payment);
    assert_eq!(
        chain.balance_of(&NATIVE, &alice),
        parse_ether("0.8").unwrap()
    );
    assert_eq!(gate.credential_of(&alice).unwrap().paid, payment);
}

#[test]
fn concurrent_mints_by_one_address_charge_once() {
    let (_, chain, registry, gate) = deploy(0);
    let alice = Address::from_label("alice");
    let payment = parse_ether("0.1").unwrap();
    chain.funds().credit(NATIVE, alice, parse_ether("1").unwrap()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gate = gate.clone();
            std::thread::spawn(move || gate.mint(alice, payment).is_ok())
        })
        .collect();
    let minted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(minted, 1);
    assert_eq!(chain.balance_of(&NATIVE, &registry.address()), payment);
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

#[test]
fn default_drops_borrower_below_minimum() {
    let min = BASE_CREDIT_SCORE - SCORE_DEFAULT_PENALTY + 1;
    let (clock, chain, registry, gate) = deploy(min);
    let lender = Address::from_label("lender");
    let borrower = Address::from_label("borrower");
    chain.funds().credit(NATIVE, borrower, 1_000_000_000_000_000_000).unwrap();
    gate.mint(borrower, parse_ether("0.1").unwrap()).unwrap();
    assert!(gate.is_eligible(&borrower));

    let first = AssetRef::new(Address::from_label("collection"), 1);
    let second = AssetRef::new(Address::from_label("collection"), 2);
    for asset in [first, second] {
        chain.assets().mint(asset, lender).unwrap();
        chain.assets().approve(&lender, &asset, registry.address()).unwrap();
        registry.offer_for_loaning(lender, asset, 60).unwrap();
    }

    registry.request_to_borrow(borrower, first).unwrap();
    registry.approve_loan_request(lender, first, borrower, 1, 9).unwrap();
    registry.borrow_nft(borrower, first, 10).unwrap();
    clock.advance(61);
    registry.claim_default(lender, first).unwrap();

    assert_eq!(gate.score_of(&borrower), BASE_CREDIT_SCORE - SCORE_DEFAULT_PENALTY);
    assert!(!gate.is_eligible(&borrower));
    assert_eq!(
        registry.request_to_borrow(borrower, second),
        Err(LoanError::NotEligible(borrower))
    );
}

#[test]
fn registry_is_the_only_history_writer() {
    let (_, _, registry, gate) = deploy(0);
    assert_eq!(gate.treasury(), registry.address());
    let outsider = Address::from_label("outsider");
    assert!(matches!(
        gate.record_outcome(
            &outsider,
            outsider,
            bridgelend_contracts::HistoryEntry {
                origin_chain: ChainId(5),
                asset: AssetRef::new(Address::from_label("collection"), 1),
                lender: outsider,
                outcome: bridgelend_protocol::relay::LoanOutcome::Repaid,
                at: 0,
            },
        ),
        Err(ScoreError::UnauthorizedHistoryWriter(_))
    ));
}
