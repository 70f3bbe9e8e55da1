//! # Score Gate
//!
//! Issues one credit credential per address in exchange for a native-currency
//! payment, and keeps the per-address credit history that lending outcomes
//! are written into. The payment goes to the treasury, which is always the
//! loan registry on the same chain; that registry is also the only address
//! allowed to append history.
//!
//! Credentials are never burned.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bridgelend_protocol::config::{
    BASE_CREDIT_SCORE, MAX_CREDIT_SCORE, SCORE_DEFAULT_PENALTY, SCORE_REPAID_BONUS,
    SCORE_REPAID_LATE_BONUS,
};
use bridgelend_protocol::relay::LoanOutcome;
use bridgelend_protocol::{Address, Amount, AssetRef, ChainId, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::chain::Chain;
use crate::funds::FundsError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the score gate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreError {
    /// The caller already holds a credential.
    #[error("{0} already holds a score credential")]
    AlreadyCredentialed(Address),

    /// The attached payment is below the mint price.
    #[error("insufficient payment: paid {paid}, price is {price}")]
    InsufficientPayment {
        /// Value attached to the mint.
        paid: Amount,
        /// Configured mint price.
        price: Amount,
    },

    /// Only the treasury registry may write history.
    #[error("{0} is not allowed to write credit history")]
    UnauthorizedHistoryWriter(Address),

    /// Charging the payment failed.
    #[error(transparent)]
    Funds(#[from] FundsError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Proof that an address has paid into the credit system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCredential {
    pub holder: Address,
    /// Registry allowed to append to this holder's history.
    pub registry: Address,
    pub minted_at: Timestamp,
    /// Value charged for the mint.
    pub paid: Amount,
}

/// One closed loan in a borrower's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Chain the loan was closed on.
    pub origin_chain: ChainId,
    pub asset: AssetRef,
    pub lender: Address,
    pub outcome: LoanOutcome,
    pub at: Timestamp,
}

/// Outcome counters plus the full entry log for one address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditHistory {
    pub repaid: u32,
    pub repaid_late: u32,
    pub defaulted: u32,
    pub entries: Vec<HistoryEntry>,
}

impl CreditHistory {
    /// Appends an entry and bumps the matching counter.
    pub fn record(&mut self, entry: HistoryEntry) {
        match entry.outcome {
            LoanOutcome::Repaid => self.repaid = self.repaid.saturating_add(1),
            LoanOutcome::RepaidLate => self.repaid_late = self.repaid_late.saturating_add(1),
            LoanOutcome::Defaulted => self.defaulted = self.defaulted.saturating_add(1),
        }
        self.entries.push(entry);
    }

    /// Credit score in `[0, MAX_CREDIT_SCORE]`.
    pub fn score(&self) -> u32 {
        let bonus = u64::from(self.repaid) * u64::from(SCORE_REPAID_BONUS)
            + u64::from(self.repaid_late) * u64::from(SCORE_REPAID_LATE_BONUS);
        let penalty = u64::from(self.defaulted) * u64::from(SCORE_DEFAULT_PENALTY);
        let raw = (u64::from(BASE_CREDIT_SCORE) + bonus).saturating_sub(penalty);
        raw.min(u64::from(MAX_CREDIT_SCORE)) as u32
    }
}

// ---------------------------------------------------------------------------
// ScoreGate
// ---------------------------------------------------------------------------

/// The credential contract for one chain.
pub struct ScoreGate {
    address: Address,
    chain: Arc<Chain>,
    treasury: Address,
    mint_price: Amount,
    min_borrower_score: u32,
    credentials: RwLock<HashMap<Address, ScoreCredential>>,
    histories: RwLock<HashMap<Address, CreditHistory>>,
}

impl ScoreGate {
    /// Deploys a score gate on `chain`. `treasury` is the loan registry that
    /// receives mint payments and writes history.
    pub fn deploy(
        chain: Arc<Chain>,
        deployer: &Address,
        treasury: Address,
        mint_price: Amount,
        min_borrower_score: u32,
    ) -> Arc<Self> {
        let address = chain.next_contract_address(deployer);
        info!(
            chain = %chain.name(),
            %address,
            %treasury,
            mint_price,
            min_borrower_score,
            "score gate deployed"
        );
        Arc::new(Self {
            address,
            chain,
            treasury,
            mint_price,
            min_borrower_score,
            credentials: RwLock::new(HashMap::new()),
            histories: RwLock::new(HashMap::new()),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    pub fn mint_price(&self) -> Amount {
        self.mint_price
    }

    pub fn min_borrower_score(&self) -> u32 {
        self.min_borrower_score
    }

    /// Mints a credential to `caller`, charging the attached `payment` in
    /// native currency to the treasury.
    ///
    /// # Errors
    ///
    /// [`ScoreError::AlreadyCredentialed`] is checked before anything is
    /// charged; [`ScoreError::InsufficientPayment`] if `payment` is below the
    /// mint price; [`ScoreError::Funds`] if the caller cannot pay.
    pub fn mint(&self, caller: Address, payment: Amount) -> Result<ScoreCredential, ScoreError> {
        let mut credentials = self.credentials.write();
        if credentials.contains_key(&caller) {
            debug!(%caller, "mint rejected: already credentialed");
            return Err(ScoreError::AlreadyCredentialed(caller));
        }
        if payment < self.mint_price {
            return Err(ScoreError::InsufficientPayment {
                paid: payment,
                price: self.mint_price,
            });
        }

        self.chain
            .funds()
            .transfer(Address::ZERO, caller, self.treasury, payment)?;

        let credential = ScoreCredential {
            holder: caller,
            registry: self.treasury,
            minted_at: self.chain.now(),
            paid: payment,
        };
        credentials.insert(caller, credential.clone());
        info!(chain = %self.chain.name(), holder = %caller, paid = payment, "score credential minted");
        Ok(credential)
    }

    pub fn has_credential(&self, holder: &Address) -> bool {
        self.credentials.read().contains_key(holder)
    }

    pub fn credential_of(&self, holder: &Address) -> Option<ScoreCredential> {
        self.credentials.read().get(holder).cloned()
    }

    /// History for `holder`; empty if nothing was ever recorded.
    pub fn history_of(&self, holder: &Address) -> CreditHistory {
        self.histories.read().get(holder).cloned().unwrap_or_default()
    }

    pub fn score_of(&self, holder: &Address) -> u32 {
        self.histories
            .read()
            .get(holder)
            .map(CreditHistory::score)
            .unwrap_or(BASE_CREDIT_SCORE)
    }

    /// A borrower must hold a credential and meet the minimum score.
    pub fn is_eligible(&self, borrower: &Address) -> bool {
        self.has_credential(borrower) && self.score_of(borrower) >= self.min_borrower_score
    }

    /// History hook. Only the treasury registry may call it; the entry is
    /// recorded whether or not `borrower` holds a credential.
    pub fn record_outcome(
        &self,
        writer: &Address,
        borrower: Address,
        entry: HistoryEntry,
    ) -> Result<u32, ScoreError> {
        if *writer != self.treasury {
            return Err(ScoreError::UnauthorizedHistoryWriter(*writer));
        }
        let mut histories = self.histories.write();
        let history = histories.entry(borrower).or_default();
        let outcome = entry.outcome;
        let origin = entry.origin_chain;
        history.record(entry);
        let score = history.score();
        info!(
            chain = %self.chain.name(),
            %borrower,
            %outcome,
            origin = %origin,
            score,
            "credit history updated"
        );
        Ok(score)
    }
}

impl fmt::Debug for ScoreGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoreGate")
            .field("address", &self.address)
            .field("chain", &self.chain.chain_id())
            .field("treasury", &self.treasury)
            .field("mint_price", &self.mint_price)
            .finish()
    }
}
