//! # Loan Registry
//!
//! The per-chain ledger of NFT loans. Each [`AssetRef`] has at most one
//! active [`LoanRecord`], which only ever moves forward:
//!
//! ```text
//!  offer_for_loaning      request_to_borrow      approve_loan_request
//! ───────────────▶ Listed ───────────────▶ Requested ───────────────▶ Approved
//!                                 ▲    │ (re-bind)                        │
//!                                 └────┘                       borrow_nft │
//!                                                                         ▼
//!        Closed(Repaid | RepaidLate) ◀── return_nft ─── Borrowed ── claim_default ──▶ Closed(Defaulted)
//! ```
//!
//! `cancel_listing` closes a record that was never borrowed. Closed records
//! move into the asset's history and the asset can be listed again.
//!
//! The registry is the sole mutator of its [`AssetEscrow`] and the sole
//! history writer of its [`ScoreGate`]. Every repayment or default is
//! written to the local score gate and queued in the outbox for the
//! counterpart registry on the other chain; the relay worker takes it from
//! there. A missing cross-chain link never fails a local close.
//!
//! Calls on the same asset are serialized by a per-asset slot lock; calls
//! on different assets run concurrently. Every guard is checked while the
//! ledgers are held, before anything moves.

use std::fmt;
use std::sync::Arc;

use bridgelend_protocol::config::{MAX_LOAN_PERIOD_SECS, MIN_LOAN_PERIOD_SECS, RELAY_MESSAGE_VERSION};
use bridgelend_protocol::crypto::GuardianPublicKey;
use bridgelend_protocol::relay::{HistoryMessage, LoanOutcome, RelayEnvelope, RelayError};
use bridgelend_protocol::{Address, Amount, AssetRef, ChainId, Timestamp};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assets::AssetError;
use crate::chain::Chain;
use crate::escrow::{AssetEscrow, EscrowError, FundsLockId};
use crate::funds::FundsError;
use crate::relay::{Admission, Inbox, Outbox};
use crate::score_gate::{HistoryEntry, ScoreError, ScoreGate};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoanError {
    /// `init` has not been called yet.
    #[error("registry is not initialized")]
    NotInitialized,

    /// `init` or `init2` was already called.
    #[error("registry is already initialized")]
    AlreadyInitialized,

    /// Only the deployer may configure the registry.
    #[error("{0} is not the registry owner")]
    NotRegistryOwner(Address),

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The loan is not in a state that allows this operation.
    #[error("invalid state transition: loan is {current}, expected {expected}")]
    InvalidState {
        /// The loan's current state.
        current: String,
        /// The state(s) required for this operation.
        expected: String,
    },

    /// The asset has no active loan record.
    #[error("no active loan for {0}")]
    NoActiveLoan(AssetRef),

    /// The asset already has an active loan record.
    #[error("{0} already has an active loan")]
    ActiveLoanExists(AssetRef),

    /// Loan period outside `[MIN_LOAN_PERIOD_SECS, MAX_LOAN_PERIOD_SECS]`.
    #[error("invalid loan period: {0}s")]
    InvalidLoanPeriod(u64),

    /// The caller is not the lender of this loan.
    #[error("{0} is not the lender")]
    NotLender(Address),

    /// The caller is not the borrower of this loan.
    #[error("{0} is not the borrower")]
    NotBorrower(Address),

    /// A lender cannot borrow their own asset.
    #[error("lender cannot borrow their own asset")]
    SelfBorrow,

    /// The borrower lacks a credential or a high enough score.
    #[error("{0} is not an eligible borrower")]
    NotEligible(Address),

    /// The approval names someone other than the current requester.
    #[error("approval names {approved}, but the requester is {requested}")]
    BorrowerMismatch {
        /// Current requester.
        requested: Address,
        /// Borrower named in the approval.
        approved: Address,
    },

    /// The value attached to `borrow_nft` does not cover fee plus collateral.
    #[error("insufficient value: attached {value}, required {required}")]
    InsufficientValue {
        /// Value attached by the caller.
        value: Amount,
        /// `fee + collateral`.
        required: Amount,
    },

    /// Default can only be claimed after the loan expires.
    #[error("loan has not expired: expires at {expires_at}, now {now}")]
    NotExpired {
        /// Expiry timestamp.
        expires_at: Timestamp,
        /// Current chain time.
        now: Timestamp,
    },

    /// Fee plus collateral, or the expiry timestamp, overflowed.
    #[error("arithmetic overflow")]
    Overflow,

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Funds(#[from] FundsError),

    #[error(transparent)]
    Score(#[from] ScoreError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle state of a loan record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanState {
    /// Offered by the lender; no borrower yet.
    Listed,
    /// A borrower has asked for the asset.
    Requested,
    /// The lender accepted the request and fixed fee and collateral.
    Approved,
    /// The borrower holds the asset; fee and collateral are in escrow.
    Borrowed,
    /// Terminal.
    Closed,
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanState::Listed => write!(f, "Listed"),
            LoanState::Requested => write!(f, "Requested"),
            LoanState::Approved => write!(f, "Approved"),
            LoanState::Borrowed => write!(f, "Borrowed"),
            LoanState::Closed => write!(f, "Closed"),
        }
    }
}

/// One loan agreement over one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub loan_id: Uuid,
    pub asset: AssetRef,
    pub lender: Address,
    pub state: LoanState,
    /// Seconds, fixed at listing.
    pub loan_period: u64,
    /// Current requester; fixed once approved.
    pub borrower: Option<Address>,
    /// Token fee and collateral are paid in. Zero means native currency.
    pub fee_token: Address,
    pub fee: Amount,
    pub collateral: Amount,
    pub listed_at: Timestamp,
    pub approved_at: Option<Timestamp>,
    pub borrowed_at: Option<Timestamp>,
    /// `borrowed_at + loan_period`.
    pub expires_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    /// `None` for a cancelled listing.
    pub outcome: Option<LoanOutcome>,
    pub fee_lock: Option<FundsLockId>,
    pub collateral_lock: Option<FundsLockId>,
}

impl LoanRecord {
    fn listed(asset: AssetRef, lender: Address, loan_period: u64, fee_token: Address, now: Timestamp) -> Self {
        Self {
            loan_id: Uuid::new_v4(),
            asset,
            lender,
            state: LoanState::Listed,
            loan_period,
            borrower: None,
            fee_token,
            fee: 0,
            collateral: 0,
            listed_at: now,
            approved_at: None,
            borrowed_at: None,
            expires_at: None,
            closed_at: None,
            outcome: None,
            fee_lock: None,
            collateral_lock: None,
        }
    }

    fn expect_state(&self, allowed: &[LoanState]) -> Result<(), LoanError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(LoanError::InvalidState {
            current: self.state.to_string(),
            expected: allowed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" or "),
        })
    }

    fn expect_lender(&self, caller: &Address) -> Result<(), LoanError> {
        if self.lender != *caller {
            return Err(LoanError::NotLender(*caller));
        }
        Ok(())
    }

    fn expect_borrower(&self, caller: &Address) -> Result<Address, LoanError> {
        match self.borrower {
            Some(borrower) if borrower == *caller => Ok(borrower),
            _ => Err(LoanError::NotBorrower(*caller)),
        }
    }

    /// Fee plus collateral.
    pub fn required_value(&self) -> Result<Amount, LoanError> {
        self.fee.checked_add(self.collateral).ok_or(LoanError::Overflow)
    }
}

/// Set once by `init`.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub score_gate: Arc<ScoreGate>,
    pub fee_token: Address,
}

/// The relay endpoint allowed to deliver messages, and the guardian whose
/// signature they must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEntryPoint {
    pub address: Address,
    pub guardian: GuardianPublicKey,
}

/// Set once by `init2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainLink {
    pub counterpart: Address,
    pub relay_entry_point: RelayEntryPoint,
    pub counterpart_chain: ChainId,
}

/// Result of a successful [`LoanRegistry::receive_relay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// `applied` messages were written to history (the delivered one plus
    /// any buffered successors).
    Applied { applied: usize },
    /// Already applied; nothing changed.
    Duplicate,
    /// Held until earlier sequences arrive.
    Buffered,
}

#[derive(Debug, Default)]
struct LoanSlot {
    current: Option<LoanRecord>,
    history: Vec<LoanRecord>,
}

impl LoanSlot {
    fn active(&mut self, asset: AssetRef) -> Result<&mut LoanRecord, LoanError> {
        self.current.as_mut().ok_or(LoanError::NoActiveLoan(asset))
    }

    /// Moves the active record to history as `Closed`.
    fn close(&mut self, outcome: Option<LoanOutcome>, now: Timestamp) -> Option<LoanRecord> {
        let mut record = self.current.take()?;
        record.state = LoanState::Closed;
        record.outcome = outcome;
        record.closed_at = Some(now);
        self.history.push(record.clone());
        Some(record)
    }
}

// ---------------------------------------------------------------------------
// LoanRegistry
// ---------------------------------------------------------------------------

/// The loan registry contract for one chain.
pub struct LoanRegistry {
    address: Address,
    owner: Address,
    chain: Arc<Chain>,
    config: RwLock<Option<RegistryConfig>>,
    link: RwLock<Option<CrossChainLink>>,
    slots: DashMap<AssetRef, Arc<Mutex<LoanSlot>>>,
    escrow: Mutex<AssetEscrow>,
    outbox: Mutex<Outbox>,
    inbox: Mutex<Inbox>,
}

impl LoanRegistry {
    /// Deploys an uninitialized registry owned by `deployer`.
    pub fn deploy(chain: Arc<Chain>, deployer: Address) -> Arc<Self> {
        let address = chain.next_contract_address(&deployer);
        info!(chain = %chain.name(), %address, owner = %deployer, "loan registry deployed");
        Arc::new(Self {
            address,
            owner: deployer,
            chain,
            config: RwLock::new(None),
            link: RwLock::new(None),
            slots: DashMap::new(),
            escrow: Mutex::new(AssetEscrow::new(address)),
            outbox: Mutex::new(Outbox::new()),
            inbox: Mutex::new(Inbox::new()),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    pub fn config(&self) -> Option<RegistryConfig> {
        self.config.read().clone()
    }

    pub fn link(&self) -> Option<CrossChainLink> {
        *self.link.read()
    }

    // -- configuration -------------------------------------------------------

    /// Binds the score gate and fee token. Owner only, exactly once. The
    /// score gate must name this registry as its treasury.
    pub fn init(&self, caller: &Address, score_gate: Arc<ScoreGate>, fee_token: Address) -> Result<(), LoanError> {
        if *caller != self.owner {
            return Err(LoanError::NotRegistryOwner(*caller));
        }
        let mut config = self.config.write();
        if config.is_some() {
            return Err(LoanError::AlreadyInitialized);
        }
        if score_gate.treasury() != self.address {
            return Err(LoanError::InvalidConfig(format!(
                "score gate treasury {} is not this registry",
                score_gate.treasury()
            )));
        }
        info!(
            chain = %self.chain.name(),
            registry = %self.address,
            score_gate = %score_gate.address(),
            %fee_token,
            "registry initialized"
        );
        *config = Some(RegistryConfig { score_gate, fee_token });
        Ok(())
    }

    /// Binds the counterpart registry and the relay entry point. Owner only,
    /// exactly once.
    pub fn init2(
        &self,
        caller: &Address,
        counterpart: Address,
        relay_entry_point: RelayEntryPoint,
        counterpart_chain: ChainId,
    ) -> Result<(), LoanError> {
        if *caller != self.owner {
            return Err(LoanError::NotRegistryOwner(*caller));
        }
        let mut link = self.link.write();
        if link.is_some() {
            return Err(LoanError::AlreadyInitialized);
        }
        if counterpart_chain == self.chain.chain_id() {
            return Err(LoanError::InvalidConfig(format!(
                "counterpart chain {} is this registry's own chain",
                counterpart_chain
            )));
        }
        info!(
            chain = %self.chain.name(),
            registry = %self.address,
            %counterpart,
            counterpart_chain = %counterpart_chain,
            relayer = %relay_entry_point.address,
            "cross-chain link configured"
        );
        *link = Some(CrossChainLink {
            counterpart,
            relay_entry_point,
            counterpart_chain,
        });
        Ok(())
    }

    // -- lifecycle -----------------------------------------------------------

    /// Lists `asset` for `loan_period` seconds. The caller must own it and
    /// have approved this registry as its operator.
    pub fn offer_for_loaning(&self, caller: Address, asset: AssetRef, loan_period: u64) -> Result<LoanRecord, LoanError> {
        self.run_in_slot("offer_for_loaning", asset, true, |slot, config| {
            if !(MIN_LOAN_PERIOD_SECS..=MAX_LOAN_PERIOD_SECS).contains(&loan_period) {
                return Err(LoanError::InvalidLoanPeriod(loan_period));
            }
            if slot.current.is_some() {
                return Err(LoanError::ActiveLoanExists(asset));
            }

            let now = self.chain.now();
            {
                let mut escrow = self.escrow.lock();
                let assets = self.chain.assets();
                if assets.owner_of(&asset).is_some() && assets.owner_of(&asset) != Some(caller) {
                    return Err(AssetError::NotOwner { asset, caller }.into());
                }
                escrow.lock(&assets, asset, caller, now)?;
            }

            let record = LoanRecord::listed(asset, caller, loan_period, config.fee_token, now);
            info!(
                chain = %self.chain.name(),
                loan_id = %record.loan_id,
                %asset,
                lender = %caller,
                loan_period,
                "asset listed for loan"
            );
            slot.current = Some(record.clone());
            Ok(record)
        })
    }

    /// Asks to borrow a listed asset. A later request re-binds the borrower
    /// until the lender approves.
    pub fn request_to_borrow(&self, caller: Address, asset: AssetRef) -> Result<LoanRecord, LoanError> {
        self.with_slot("request_to_borrow", asset, |slot, config| {
            let record = slot.active(asset)?;
            record.expect_state(&[LoanState::Listed, LoanState::Requested])?;
            if record.lender == caller {
                return Err(LoanError::SelfBorrow);
            }
            if !config.score_gate.is_eligible(&caller) {
                return Err(LoanError::NotEligible(caller));
            }

            let previous = record.borrower.replace(caller);
            record.state = LoanState::Requested;
            info!(
                chain = %self.chain.name(),
                loan_id = %record.loan_id,
                %asset,
                borrower = %caller,
                rebound = previous.is_some(),
                "borrow requested"
            );
            Ok(record.clone())
        })
    }

    /// Accepts the pending request and fixes fee and collateral.
    pub fn approve_loan_request(
        &self,
        caller: Address,
        asset: AssetRef,
        borrower: Address,
        fee: Amount,
        collateral: Amount,
    ) -> Result<LoanRecord, LoanError> {
        self.with_slot("approve_loan_request", asset, |slot, _| {
            let record = slot.active(asset)?;
            record.expect_lender(&caller)?;
            record.expect_state(&[LoanState::Requested])?;
            match record.borrower {
                Some(requested) if requested == borrower => {}
                Some(requested) => {
                    return Err(LoanError::BorrowerMismatch {
                        requested,
                        approved: borrower,
                    })
                }
                None => return Err(LoanError::NotBorrower(borrower)),
            }
            fee.checked_add(collateral).ok_or(LoanError::Overflow)?;

            record.fee = fee;
            record.collateral = collateral;
            record.approved_at = Some(self.chain.now());
            record.state = LoanState::Approved;
            info!(
                chain = %self.chain.name(),
                loan_id = %record.loan_id,
                %asset,
                %borrower,
                fee,
                collateral,
                "loan request approved"
            );
            Ok(record.clone())
        })
    }

    /// Takes the asset. `value` must cover fee plus collateral; only that
    /// much is charged.
    pub fn borrow_nft(&self, caller: Address, asset: AssetRef, value: Amount) -> Result<LoanRecord, LoanError> {
        self.with_slot("borrow_nft", asset, |slot, _| {
            let record = slot.active(asset)?;
            record.expect_state(&[LoanState::Approved])?;
            let borrower = record.expect_borrower(&caller)?;
            let required = record.required_value()?;
            if value < required {
                return Err(LoanError::InsufficientValue { value, required });
            }

            let now = self.chain.now();
            let expires_at = now.checked_add(record.loan_period).ok_or(LoanError::Overflow)?;
            let token = record.fee_token;

            let mut escrow = self.escrow.lock();
            let mut assets = self.chain.assets();
            let mut funds = self.chain.funds();

            escrow.check_transfer(&assets, &asset, &record.lender)?;
            funds.ensure_balance(&token, &borrower, required)?;

            let fee_lock = escrow.lock_funds(&mut funds, token, borrower, record.fee)?;
            let collateral_lock = match escrow.lock_funds(&mut funds, token, borrower, record.collateral) {
                Ok(id) => id,
                Err(err) => {
                    escrow.release(&mut funds, fee_lock, borrower)?;
                    return Err(err.into());
                }
            };
            escrow.transfer_to(&mut assets, &asset, &record.lender, borrower)?;

            record.fee_lock = Some(fee_lock);
            record.collateral_lock = Some(collateral_lock);
            record.borrowed_at = Some(now);
            record.expires_at = Some(expires_at);
            record.state = LoanState::Borrowed;
            info!(
                chain = %self.chain.name(),
                loan_id = %record.loan_id,
                %asset,
                %borrower,
                charged = required,
                expires_at,
                "asset borrowed"
            );
            Ok(record.clone())
        })
    }

    /// Hands the asset back. The caller must have re-approved this registry.
    /// The fee goes to the lender and the collateral back to the borrower,
    /// even after expiry as long as no default was claimed.
    pub fn return_nft(&self, caller: Address, asset: AssetRef) -> Result<LoanRecord, LoanError> {
        self.with_slot("return_nft", asset, |slot, config| {
            let now = self.chain.now();
            let (lender, borrower, outcome) = {
                let record = slot.active(asset)?;
                record.expect_state(&[LoanState::Borrowed])?;
                let borrower = record.expect_borrower(&caller)?;
                let (fee_lock, collateral_lock) = locks_of(record)?;

                let mut escrow = self.escrow.lock();
                let mut assets = self.chain.assets();
                let mut funds = self.chain.funds();

                escrow.check_transfer(&assets, &asset, &borrower)?;
                escrow.check_payouts(&funds, &[(fee_lock, record.lender), (collateral_lock, borrower)])?;

                escrow.release(&mut funds, fee_lock, record.lender)?;
                escrow.release(&mut funds, collateral_lock, borrower)?;
                escrow.transfer_to(&mut assets, &asset, &borrower, record.lender)?;
                escrow.unlock(&asset)?;

                let outcome = match record.expires_at {
                    Some(expires_at) if now > expires_at => LoanOutcome::RepaidLate,
                    _ => LoanOutcome::Repaid,
                };
                (record.lender, borrower, outcome)
            };

            let closed = slot.close(Some(outcome), now).ok_or(LoanError::NoActiveLoan(asset))?;
            info!(
                chain = %self.chain.name(),
                loan_id = %closed.loan_id,
                %asset,
                %lender,
                %borrower,
                %outcome,
                "asset returned, loan closed"
            );
            self.publish_outcome(config, &closed, borrower, outcome, now);
            Ok(closed)
        })
    }

    /// Lender-triggered default after expiry. Fee and collateral both go to
    /// the lender; the asset stays where it is.
    pub fn claim_default(&self, caller: Address, asset: AssetRef) -> Result<LoanRecord, LoanError> {
        self.with_slot("claim_default", asset, |slot, config| {
            let now = self.chain.now();
            let borrower = {
                let record = slot.active(asset)?;
                record.expect_lender(&caller)?;
                record.expect_state(&[LoanState::Borrowed])?;
                let (fee_lock, collateral_lock) = locks_of(record)?;
                let expires_at = record.expires_at.unwrap_or(Timestamp::MAX);
                if now <= expires_at {
                    return Err(LoanError::NotExpired { expires_at, now });
                }
                let borrower = record.borrower.ok_or(LoanError::NoActiveLoan(asset))?;

                let mut escrow = self.escrow.lock();
                let mut funds = self.chain.funds();
                escrow.check_unlock(&asset)?;
                escrow.check_payouts(&funds, &[(fee_lock, record.lender), (collateral_lock, record.lender)])?;

                escrow.release(&mut funds, fee_lock, record.lender)?;
                escrow.release(&mut funds, collateral_lock, record.lender)?;
                escrow.unlock(&asset)?;
                borrower
            };

            let closed = slot
                .close(Some(LoanOutcome::Defaulted), now)
                .ok_or(LoanError::NoActiveLoan(asset))?;
            warn!(
                chain = %self.chain.name(),
                loan_id = %closed.loan_id,
                %asset,
                lender = %caller,
                %borrower,
                "loan defaulted, collateral seized"
            );
            self.publish_outcome(config, &closed, borrower, LoanOutcome::Defaulted, now);
            Ok(closed)
        })
    }

    /// Withdraws a listing that was never borrowed. Nothing is relayed.
    pub fn cancel_listing(&self, caller: Address, asset: AssetRef) -> Result<LoanRecord, LoanError> {
        self.with_slot("cancel_listing", asset, |slot, _| {
            {
                let record = slot.active(asset)?;
                record.expect_lender(&caller)?;
                record.expect_state(&[LoanState::Listed, LoanState::Requested, LoanState::Approved])?;
                self.escrow.lock().unlock(&asset)?;
            }
            let closed = slot
                .close(None, self.chain.now())
                .ok_or(LoanError::NoActiveLoan(asset))?;
            info!(chain = %self.chain.name(), loan_id = %closed.loan_id, %asset, "listing cancelled");
            Ok(closed)
        })
    }

    // -- queries -------------------------------------------------------------

    /// The active record for `asset`, if any.
    pub fn loan(&self, asset: &AssetRef) -> Option<LoanRecord> {
        let slot = self.slots.get(asset)?.value().clone();
        let slot = slot.lock();
        slot.current.clone()
    }

    /// Closed records for `asset`, oldest first.
    pub fn loan_history(&self, asset: &AssetRef) -> Vec<LoanRecord> {
        match self.slots.get(asset).map(|s| s.value().clone()) {
            Some(slot) => slot.lock().history.clone(),
            None => Vec::new(),
        }
    }

    /// Every active record, ordered by asset.
    pub fn active_loans(&self) -> Vec<LoanRecord> {
        let slots: Vec<Arc<Mutex<LoanSlot>>> = self.slots.iter().map(|e| e.value().clone()).collect();
        let mut active: Vec<LoanRecord> = slots
            .iter()
            .filter_map(|slot| slot.lock().current.clone())
            .collect();
        active.sort_by_key(|r| r.asset);
        active
    }

    /// The escrow, for inspection.
    pub fn escrow(&self) -> MutexGuard<'_, AssetEscrow> {
        self.escrow.lock()
    }

    // -- relay ---------------------------------------------------------------

    /// Unacknowledged outgoing messages, oldest first.
    pub fn pending_messages(&self) -> Vec<HistoryMessage> {
        self.outbox.lock().pending()
    }

    /// Removes a delivered message from the outbox.
    pub fn ack_message(&self, sequence: u64) -> bool {
        self.outbox.lock().ack(sequence)
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Highest sequence applied from `source` on `chain`.
    pub fn last_applied(&self, chain: ChainId, source: &Address) -> u64 {
        self.inbox.lock().last_applied(chain, source)
    }

    /// Messages from `source` held back behind a sequence gap.
    pub fn buffered_messages(&self, chain: ChainId, source: &Address) -> usize {
        self.inbox.lock().buffered(chain, source)
    }

    /// Relay entry point. `caller` must be the configured relay address, and
    /// the envelope must carry the configured guardian's signature and come
    /// from the counterpart registry.
    pub fn receive_relay(&self, caller: &Address, envelope: &RelayEnvelope) -> Result<ReceiveOutcome, RelayError> {
        let link = self.link().ok_or(RelayError::NotLinked)?;
        if *caller != link.relay_entry_point.address {
            return Err(RelayError::UnauthorizedRelayer { caller: *caller });
        }
        envelope.verify(&link.relay_entry_point.guardian)?;

        let message = &envelope.message;
        if message.source_chain != link.counterpart_chain || message.source_registry != link.counterpart {
            return Err(RelayError::UnexpectedSource {
                chain: message.source_chain,
                registry: message.source_registry,
            });
        }
        if message.target_chain != self.chain.chain_id() || message.target_registry != self.address {
            return Err(RelayError::WrongDestination {
                chain: message.target_chain,
                registry: message.target_registry,
            });
        }
        let config = self.config().ok_or(RelayError::Uninitialized)?;

        let mut inbox = self.inbox.lock();
        match inbox.admit(message.clone())? {
            Admission::Duplicate => {
                debug!(
                    chain = %self.chain.name(),
                    sequence = message.sequence,
                    payload_id = %envelope.payload_id_hex(),
                    "duplicate relay message ignored"
                );
                Ok(ReceiveOutcome::Duplicate)
            }
            Admission::Buffered => {
                warn!(
                    chain = %self.chain.name(),
                    sequence = message.sequence,
                    last_applied = inbox.last_applied(message.source_chain, &message.source_registry),
                    "relay message arrived ahead of a gap, buffered"
                );
                Ok(ReceiveOutcome::Buffered)
            }
            Admission::Ready(ready) => {
                let applied = ready.len();
                for m in ready {
                    let entry = HistoryEntry {
                        origin_chain: m.source_chain,
                        asset: m.asset,
                        lender: m.lender,
                        outcome: m.outcome,
                        at: m.closed_at,
                    };
                    if let Err(err) = config.score_gate.record_outcome(&self.address, m.borrower, entry) {
                        warn!(chain = %self.chain.name(), sequence = m.sequence, error = %err, "relayed history not recorded");
                        continue;
                    }
                    info!(
                        chain = %self.chain.name(),
                        origin = %m.source_chain,
                        sequence = m.sequence,
                        borrower = %m.borrower,
                        outcome = %m.outcome,
                        "relayed loan history applied"
                    );
                }
                Ok(ReceiveOutcome::Applied { applied })
            }
        }
    }

    // -- internals -----------------------------------------------------------

    /// The asset's slot. Only listing creates one; every other operation on
    /// an asset that was never listed sees `None`.
    fn slot(&self, asset: AssetRef, create: bool) -> Option<Arc<Mutex<LoanSlot>>> {
        if create {
            Some(self.slots.entry(asset).or_default().value().clone())
        } else {
            self.slots.get(&asset).map(|slot| slot.value().clone())
        }
    }

    /// Runs a lifecycle operation with the asset's existing slot held.
    fn with_slot<T>(
        &self,
        op: &'static str,
        asset: AssetRef,
        f: impl FnOnce(&mut LoanSlot, &RegistryConfig) -> Result<T, LoanError>,
    ) -> Result<T, LoanError> {
        self.run_in_slot(op, asset, false, f)
    }

    /// Runs a lifecycle operation with the asset's slot held, creating the
    /// slot if needed. Rejections are logged at debug level.
    fn run_in_slot<T>(
        &self,
        op: &'static str,
        asset: AssetRef,
        create: bool,
        f: impl FnOnce(&mut LoanSlot, &RegistryConfig) -> Result<T, LoanError>,
    ) -> Result<T, LoanError> {
        let result = match (self.config(), self.slot(asset, create)) {
            (None, _) => Err(LoanError::NotInitialized),
            (Some(_), None) => Err(LoanError::NoActiveLoan(asset)),
            (Some(config), Some(slot)) => {
                let mut slot = slot.lock();
                f(&mut *slot, &config)
            }
        };
        if let Err(err) = &result {
            debug!(chain = %self.chain.name(), op, %asset, error = %err, "lifecycle call rejected");
        }
        result
    }

    /// Writes a closed loan to the local score gate and queues it for the
    /// counterpart.
    fn publish_outcome(
        &self,
        config: &RegistryConfig,
        record: &LoanRecord,
        borrower: Address,
        outcome: LoanOutcome,
        now: Timestamp,
    ) {
        let entry = HistoryEntry {
            origin_chain: self.chain.chain_id(),
            asset: record.asset,
            lender: record.lender,
            outcome,
            at: now,
        };
        if let Err(err) = config.score_gate.record_outcome(&self.address, borrower, entry) {
            warn!(chain = %self.chain.name(), loan_id = %record.loan_id, error = %err, "local history not recorded");
        }

        let Some(link) = self.link() else {
            warn!(
                chain = %self.chain.name(),
                loan_id = %record.loan_id,
                "no cross-chain link configured, history not relayed"
            );
            return;
        };
        let sequence = self.outbox.lock().enqueue(|sequence| HistoryMessage {
            version: RELAY_MESSAGE_VERSION,
            source_chain: self.chain.chain_id(),
            source_registry: self.address,
            target_chain: link.counterpart_chain,
            target_registry: link.counterpart,
            sequence,
            borrower,
            lender: record.lender,
            asset: record.asset,
            outcome,
            closed_at: now,
        });
        info!(
            chain = %self.chain.name(),
            loan_id = %record.loan_id,
            sequence,
            repaid = outcome.is_repayment(),
            target = %link.counterpart_chain,
            "history message queued for relay"
        );
    }
}

fn locks_of(record: &LoanRecord) -> Result<(FundsLockId, FundsLockId), LoanError> {
    match (record.fee_lock, record.collateral_lock) {
        (Some(fee), Some(collateral)) => Ok((fee, collateral)),
        _ => Err(LoanError::InvalidState {
            current: record.state.to_string(),
            expected: "Borrowed with escrowed funds".into(),
        }),
    }
}

impl fmt::Debug for LoanRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoanRegistry")
            .field("address", &self.address)
            .field("chain", &self.chain.chain_id())
            .field("initialized", &self.config.read().is_some())
            .field("linked", &self.link.read().is_some())
            .finish()
    }
}
