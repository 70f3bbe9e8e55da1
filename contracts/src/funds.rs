//! # Funds Ledger
//!
//! The value-transfer capability the registry and score gate consume.
//! Balances are keyed by `(token, holder)`; the zero token address is the
//! chain's native currency. All arithmetic is checked.

use std::collections::HashMap;

use bridgelend_protocol::{Address, Amount};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the funds ledger.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FundsError {
    /// The holder's balance does not cover the transfer.
    #[error("insufficient balance: {holder} holds {balance} of token {token}, needs {required}")]
    InsufficientBalance {
        /// Token being moved.
        token: Address,
        /// Account being debited.
        holder: Address,
        /// Current balance.
        balance: Amount,
        /// Amount required.
        required: Amount,
    },

    /// A credit would overflow `u128`.
    #[error("balance overflow")]
    Overflow,
}

// ---------------------------------------------------------------------------
// FundsLedger
// ---------------------------------------------------------------------------

/// Per-token balances for one chain.
#[derive(Debug, Default)]
pub struct FundsLedger {
    balances: HashMap<(Address, Address), Amount>,
}

impl FundsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, token: &Address, holder: &Address) -> Amount {
        self.balances.get(&(*token, *holder)).copied().unwrap_or(0)
    }

    /// Mints `amount` of `token` to `holder`. Used to fund demo and test
    /// accounts.
    pub fn credit(&mut self, token: Address, holder: Address, amount: Amount) -> Result<(), FundsError> {
        let balance = self.balances.entry((token, holder)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(FundsError::Overflow)?;
        Ok(())
    }

    /// Fails unless `holder` could pay `amount` of `token` right now.
    pub fn ensure_balance(&self, token: &Address, holder: &Address, amount: Amount) -> Result<(), FundsError> {
        let balance = self.balance_of(token, holder);
        if balance < amount {
            return Err(FundsError::InsufficientBalance {
                token: *token,
                holder: *holder,
                balance,
                required: amount,
            });
        }
        Ok(())
    }

    /// Fails if crediting `amount` of `token` to `holder` would overflow.
    pub fn check_credit(&self, token: &Address, holder: &Address, amount: Amount) -> Result<(), FundsError> {
        self.balance_of(token, holder)
            .checked_add(amount)
            .map(|_| ())
            .ok_or(FundsError::Overflow)
    }

    /// Moves `amount` of `token` from `from` to `to`. Either both sides
    /// change or neither does.
    pub fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), FundsError> {
        self.ensure_balance(&token, &from, amount)?;
        if from == to || amount == 0 {
            return Ok(());
        }

        let credited = self
            .balance_of(&token, &to)
            .checked_add(amount)
            .ok_or(FundsError::Overflow)?;
        let debited = self.balance_of(&token, &from) - amount;

        self.balances.insert((token, from), debited);
        self.balances.insert((token, to), credited);
        Ok(())
    }
}
