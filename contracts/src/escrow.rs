//! # Asset Escrow
//!
//! Custody for everything a loan puts at stake. While an asset is listed the
//! lender keeps ownership and the escrow holds only the operator approval;
//! once borrowed, the borrower's fee and collateral sit at the custodian
//! (registry) address as two independent fund locks.
//!
//! Each fund lock is released exactly once. A second release fails with
//! [`EscrowError::AlreadyReleased`] and moves nothing.
//!
//! The escrow owns no ledgers. Callers pass in the chain's asset book or
//! funds ledger, already locked, so a registry can validate a whole
//! transition before mutating anything.

use std::collections::HashMap;
use std::fmt;

use bridgelend_protocol::{Address, Amount, AssetRef, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::{AssetBook, AssetError};
use crate::funds::{FundsError, FundsLedger};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during escrow operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EscrowError {
    /// The custodian is not the approved operator of the asset, or the
    /// depositor does not own it.
    #[error("escrow is not approved to hold {0}")]
    NotApproved(AssetRef),

    /// The asset already has an active lock.
    #[error("{0} is already locked in escrow")]
    AlreadyLocked(AssetRef),

    /// The asset has no active lock.
    #[error("{0} is not locked in escrow")]
    NotLocked(AssetRef),

    /// No fund lock with this id exists.
    #[error("unknown funds lock {0}")]
    UnknownFundsLock(FundsLockId),

    /// The fund lock has already been paid out.
    #[error("funds lock {0} already released")]
    AlreadyReleased(FundsLockId),

    /// An asset book operation failed.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// A funds ledger operation failed.
    #[error(transparent)]
    Funds(#[from] FundsError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Handle to one fund lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FundsLockId(pub u64);

impl fmt::Display for FundsLockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An active asset lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLock {
    /// Who put the asset up (the lender).
    pub depositor: Address,
    /// When the lock was taken.
    pub locked_at: Timestamp,
}

/// Value held at the custodian address on behalf of a loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundsLock {
    pub token: Address,
    pub payer: Address,
    pub amount: Amount,
    /// Who received the funds, once released.
    pub released_to: Option<Address>,
}

/// Asset and value custody for one registry.
#[derive(Debug)]
pub struct AssetEscrow {
    custodian: Address,
    asset_locks: HashMap<AssetRef, AssetLock>,
    fund_locks: HashMap<FundsLockId, FundsLock>,
    next_lock: u64,
}

impl AssetEscrow {
    /// Creates an empty escrow whose custody address is `custodian`.
    pub fn new(custodian: Address) -> Self {
        Self {
            custodian,
            asset_locks: HashMap::new(),
            fund_locks: HashMap::new(),
            next_lock: 1,
        }
    }

    pub fn custodian(&self) -> Address {
        self.custodian
    }

    // -- assets --------------------------------------------------------------

    /// Fails unless [`lock`](Self::lock) would succeed.
    pub fn check_lock(&self, assets: &AssetBook, asset: &AssetRef, from: &Address) -> Result<(), EscrowError> {
        if self.asset_locks.contains_key(asset) {
            return Err(EscrowError::AlreadyLocked(*asset));
        }
        if assets.owner_of(asset).is_none() {
            return Err(AssetError::UnknownAsset(*asset).into());
        }
        if assets.owner_of(asset) != Some(*from) || assets.approved(asset) != Some(self.custodian) {
            return Err(EscrowError::NotApproved(*asset));
        }
        Ok(())
    }

    /// Takes custody of `asset`'s approval on behalf of its owner `from`.
    pub fn lock(
        &mut self,
        assets: &AssetBook,
        asset: AssetRef,
        from: Address,
        now: Timestamp,
    ) -> Result<(), EscrowError> {
        self.check_lock(assets, &asset, &from)?;
        self.asset_locks.insert(
            asset,
            AssetLock {
                depositor: from,
                locked_at: now,
            },
        );
        Ok(())
    }

    pub fn is_locked(&self, asset: &AssetRef) -> bool {
        self.asset_locks.contains_key(asset)
    }

    /// Fails unless [`transfer_to`](Self::transfer_to) would succeed.
    pub fn check_transfer(&self, assets: &AssetBook, asset: &AssetRef, from: &Address) -> Result<(), EscrowError> {
        if !self.asset_locks.contains_key(asset) {
            return Err(EscrowError::NotLocked(*asset));
        }
        assets.check_transfer(&self.custodian, from, asset)?;
        Ok(())
    }

    /// Moves a locked asset from `from` to `to` using the custodian's
    /// approval. The lock stays in place.
    pub fn transfer_to(
        &self,
        assets: &mut AssetBook,
        asset: &AssetRef,
        from: &Address,
        to: Address,
    ) -> Result<(), EscrowError> {
        self.check_transfer(assets, asset, from)?;
        assets.transfer_from(&self.custodian, from, to, asset)?;
        Ok(())
    }

    /// Fails unless [`unlock`](Self::unlock) would succeed.
    pub fn check_unlock(&self, asset: &AssetRef) -> Result<(), EscrowError> {
        if !self.asset_locks.contains_key(asset) {
            return Err(EscrowError::NotLocked(*asset));
        }
        Ok(())
    }

    /// Ends the lock on `asset`.
    pub fn unlock(&mut self, asset: &AssetRef) -> Result<AssetLock, EscrowError> {
        self.asset_locks
            .remove(asset)
            .ok_or(EscrowError::NotLocked(*asset))
    }

    // -- funds ---------------------------------------------------------------

    /// Moves `amount` of `token` from `payer` to the custodian and records it
    /// as a new lock.
    pub fn lock_funds(
        &mut self,
        funds: &mut FundsLedger,
        token: Address,
        payer: Address,
        amount: Amount,
    ) -> Result<FundsLockId, EscrowError> {
        funds.transfer(token, payer, self.custodian, amount)?;
        let id = FundsLockId(self.next_lock);
        self.next_lock += 1;
        self.fund_locks.insert(
            id,
            FundsLock {
                token,
                payer,
                amount,
                released_to: None,
            },
        );
        Ok(id)
    }

    /// Fails unless the lock exists and has not been released.
    pub fn check_releasable(&self, id: FundsLockId) -> Result<&FundsLock, EscrowError> {
        let lock = self
            .fund_locks
            .get(&id)
            .ok_or(EscrowError::UnknownFundsLock(id))?;
        if lock.released_to.is_some() {
            return Err(EscrowError::AlreadyReleased(id));
        }
        Ok(lock)
    }

    /// Fails unless every `(lock, recipient)` release in `payouts` would
    /// succeed when applied in order: each lock is releasable and named once,
    /// the custodian covers the total per token, and no recipient's balance
    /// overflows.
    pub fn check_payouts(&self, funds: &FundsLedger, payouts: &[(FundsLockId, Address)]) -> Result<(), EscrowError> {
        let mut debits: HashMap<Address, Amount> = HashMap::new();
        let mut credits: HashMap<(Address, Address), Amount> = HashMap::new();
        for (i, (id, recipient)) in payouts.iter().enumerate() {
            if payouts[..i].iter().any(|(seen, _)| seen == id) {
                return Err(EscrowError::AlreadyReleased(*id));
            }
            let lock = self.check_releasable(*id)?;
            if *recipient == self.custodian {
                continue;
            }
            let debit = debits.entry(lock.token).or_insert(0);
            *debit = debit.checked_add(lock.amount).ok_or(FundsError::Overflow)?;
            let credit = credits.entry((lock.token, *recipient)).or_insert(0);
            *credit = credit.checked_add(lock.amount).ok_or(FundsError::Overflow)?;
        }
        for (token, total) in &debits {
            funds.ensure_balance(token, &self.custodian, *total)?;
        }
        for ((token, recipient), total) in &credits {
            funds.check_credit(token, recipient, *total)?;
        }
        Ok(())
    }

    /// Pays a lock out to `recipient`. Returns the amount released.
    pub fn release(
        &mut self,
        funds: &mut FundsLedger,
        id: FundsLockId,
        recipient: Address,
    ) -> Result<Amount, EscrowError> {
        let (token, amount) = {
            let lock = self.check_releasable(id)?;
            (lock.token, lock.amount)
        };
        funds.transfer(token, self.custodian, recipient, amount)?;
        if let Some(lock) = self.fund_locks.get_mut(&id) {
            lock.released_to = Some(recipient);
        }
        Ok(amount)
    }

    pub fn funds_lock(&self, id: FundsLockId) -> Option<&FundsLock> {
        self.fund_locks.get(&id)
    }

    /// Total value of `token` still held across unreleased locks.
    pub fn held(&self, token: &Address) -> Amount {
        self.fund_locks
            .values()
            .filter(|l| l.token == *token && l.released_to.is_none())
            .map(|l| l.amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NATIVE: Address = Address::ZERO;

    struct Fixture {
        escrow: AssetEscrow,
        assets: AssetBook,
        funds: FundsLedger,
        asset: AssetRef,
        lender: Address,
        borrower: Address,
        custodian: Address,
    }

    fn fixture() -> Fixture {
        let custodian = Address::from_label("registry");
        let lender = Address::from_label("lender");
        let borrower = Address::from_label("borrower");
        let asset = AssetRef::new(Address::from_label("collection"), 7);

        let mut assets = AssetBook::new();
        assets.mint(asset, lender).unwrap();
        let mut funds = FundsLedger::new();
        funds.credit(NATIVE, borrower, 100).unwrap();

        Fixture {
            escrow: AssetEscrow::new(custodian),
            assets,
            funds,
            asset,
            lender,
            borrower,
            custodian,
        }
    }

    #[test]
    fn lock_requires_approval() {
        let mut f = fixture();
        assert_eq!(
            f.escrow.lock(&f.assets, f.asset, f.lender, 0),
            Err(EscrowError::NotApproved(f.asset))
        );

        f.assets.approve(&f.lender, &f.asset, f.custodian).unwrap();
        f.escrow.lock(&f.assets, f.asset, f.lender, 10).unwrap();
        assert!(f.escrow.is_locked(&f.asset));
        let lock = f.escrow.unlock(&f.asset).unwrap();
        assert_eq!((lock.depositor, lock.locked_at), (f.lender, 10));
    }

    #[test]
    fn lock_requires_ownership() {
        let mut f = fixture();
        f.assets.approve(&f.lender, &f.asset, f.custodian).unwrap();
        assert_eq!(
            f.escrow.lock(&f.assets, f.asset, f.borrower, 0),
            Err(EscrowError::NotApproved(f.asset))
        );
    }

    #[test]
    fn double_lock_rejected() {
        let mut f = fixture();
        f.assets.approve(&f.lender, &f.asset, f.custodian).unwrap();
        f.escrow.lock(&f.assets, f.asset, f.lender, 0).unwrap();
        assert_eq!(
            f.escrow.lock(&f.assets, f.asset, f.lender, 0),
            Err(EscrowError::AlreadyLocked(f.asset))
        );
    }

    #[test]
    fn transfer_requires_lock() {
        let mut f = fixture();
        f.assets.approve(&f.lender, &f.asset, f.custodian).unwrap();
        assert_eq!(
            f.escrow.transfer_to(&mut f.assets, &f.asset, &f.lender, f.borrower),
            Err(EscrowError::NotLocked(f.asset))
        );
    }

    #[test]
    fn transfer_moves_custody() {
        let mut f = fixture();
        f.assets.approve(&f.lender, &f.asset, f.custodian).unwrap();
        f.escrow.lock(&f.assets, f.asset, f.lender, 0).unwrap();
        f.escrow
            .transfer_to(&mut f.assets, &f.asset, &f.lender, f.borrower)
            .unwrap();
        assert_eq!(f.assets.owner_of(&f.asset), Some(f.borrower));

        // The way back needs the borrower's approval.
        assert!(matches!(
            f.escrow.transfer_to(&mut f.assets, &f.asset, &f.borrower, f.lender),
            Err(EscrowError::Asset(AssetError::NotApproved { .. }))
        ));
        f.assets.approve(&f.borrower, &f.asset, f.custodian).unwrap();
        f.escrow
            .transfer_to(&mut f.assets, &f.asset, &f.borrower, f.lender)
            .unwrap();
        assert_eq!(f.assets.owner_of(&f.asset), Some(f.lender));

        f.escrow.unlock(&f.asset).unwrap();
        assert!(!f.escrow.is_locked(&f.asset));
        assert_eq!(f.escrow.unlock(&f.asset), Err(EscrowError::NotLocked(f.asset)));
    }

    #[test]
    fn funds_lock_and_release_once() {
        let mut f = fixture();
        let fee = f.escrow.lock_funds(&mut f.funds, NATIVE, f.borrower, 10).unwrap();
        let collateral = f.escrow.lock_funds(&mut f.funds, NATIVE, f.borrower, 90).unwrap();
        assert_ne!(fee, collateral);
        assert_eq!(f.funds.balance_of(&NATIVE, &f.custodian), 100);
        assert_eq!(f.escrow.held(&NATIVE), 100);

        assert_eq!(f.escrow.release(&mut f.funds, fee, f.lender).unwrap(), 10);
        assert_eq!(f.funds.balance_of(&NATIVE, &f.lender), 10);
        assert_eq!(
            f.escrow.release(&mut f.funds, fee, f.lender),
            Err(EscrowError::AlreadyReleased(fee))
        );
        assert_eq!(f.funds.balance_of(&NATIVE, &f.lender), 10);

        f.escrow.release(&mut f.funds, collateral, f.borrower).unwrap();
        assert_eq!(f.funds.balance_of(&NATIVE, &f.borrower), 90);
        assert_eq!(f.funds.balance_of(&NATIVE, &f.custodian), 0);
        assert_eq!(f.escrow.held(&NATIVE), 0);
        assert_eq!(
            f.escrow.funds_lock(collateral).unwrap().released_to,
            Some(f.borrower)
        );
    }

    #[test]
    fn funds_lock_needs_balance() {
        let mut f = fixture();
        let result = f.escrow.lock_funds(&mut f.funds, NATIVE, f.borrower, 101);
        assert!(matches!(
            result,
            Err(EscrowError::Funds(FundsError::InsufficientBalance { .. }))
        ));
        assert_eq!(f.funds.balance_of(&NATIVE, &f.borrower), 100);
    }

    #[test]
    fn unknown_lock_rejected() {
        let mut f = fixture();
        assert_eq!(
            f.escrow.release(&mut f.funds, FundsLockId(42), f.lender),
            Err(EscrowError::UnknownFundsLock(FundsLockId(42)))
        );
    }

    #[test]
    fn payouts_to_one_recipient_are_checked_as_a_sum() {
        let mut f = fixture();
        let fee = f.escrow.lock_funds(&mut f.funds, NATIVE, f.borrower, 10).unwrap();
        let collateral = f.escrow.lock_funds(&mut f.funds, NATIVE, f.borrower, 90).unwrap();
        f.funds.credit(NATIVE, f.lender, Amount::MAX - 50).unwrap();

        // Each lock fits on its own; together they overflow the lender.
        assert_eq!(f.escrow.check_payouts(&f.funds, &[(fee, f.lender)]), Ok(()));
        assert_eq!(
            f.escrow.check_payouts(&f.funds, &[(fee, f.lender), (collateral, f.lender)]),
            Err(EscrowError::Funds(FundsError::Overflow))
        );
        assert_eq!(
            f.escrow.check_payouts(&f.funds, &[(fee, f.lender), (collateral, f.borrower)]),
            Ok(())
        );
        assert_eq!(f.funds.balance_of(&NATIVE, &f.lender), Amount::MAX - 50);
        assert_eq!(f.escrow.held(&NATIVE), 100);
    }

    #[test]
    fn payouts_reject_repeated_and_spent_locks() {
        let mut f = fixture();
        let fee = f.escrow.lock_funds(&mut f.funds, NATIVE, f.borrower, 10).unwrap();
        assert_eq!(
            f.escrow.check_payouts(&f.funds, &[(fee, f.lender), (fee, f.borrower)]),
            Err(EscrowError::AlreadyReleased(fee))
        );

        f.escrow.release(&mut f.funds, fee, f.lender).unwrap();
        assert_eq!(
            f.escrow.check_payouts(&f.funds, &[(fee, f.lender)]),
            Err(EscrowError::AlreadyReleased(fee))
        );
    }

    #[test]
    fn check_unlock_requires_lock() {
        let mut f = fixture();
        assert_eq!(f.escrow.check_unlock(&f.asset), Err(EscrowError::NotLocked(f.asset)));
        f.assets.approve(&f.lender, &f.asset, f.custodian).unwrap();
        f.escrow.lock(&f.assets, f.asset, f.lender, 0).unwrap();
        assert_eq!(f.escrow.check_unlock(&f.asset), Ok(()));
        assert!(f.escrow.is_locked(&f.asset));
    }
}
