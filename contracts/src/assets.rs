//! # Asset Book
//!
//! The hosting chain's NFT ledger, reduced to what the loan protocol
//! consumes: who owns a token, which single operator the owner has approved
//! to move it, and an approval-checked transfer. Approvals are cleared on
//! every transfer, so a borrower has to re-approve the registry before a
//! return.

use std::collections::HashMap;

use bridgelend_protocol::{Address, AssetRef};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the asset book.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetError {
    /// No token with this reference has been minted.
    #[error("unknown asset {0}")]
    UnknownAsset(AssetRef),

    /// The token was already minted.
    #[error("asset {0} already exists")]
    AlreadyMinted(AssetRef),

    /// The caller does not own the token.
    #[error("{caller} does not own {asset}")]
    NotOwner {
        /// The token in question.
        asset: AssetRef,
        /// Address that claimed ownership.
        caller: Address,
    },

    /// The operator is neither the owner nor the approved operator.
    #[error("{operator} is not approved to move {asset}")]
    NotApproved {
        /// The token in question.
        asset: AssetRef,
        /// Address that attempted the transfer.
        operator: Address,
    },
}

// ---------------------------------------------------------------------------
// AssetBook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TokenEntry {
    owner: Address,
    approved: Option<Address>,
}

/// Ownership and approvals for every NFT on one chain.
#[derive(Debug, Default)]
pub struct AssetBook {
    tokens: HashMap<AssetRef, TokenEntry>,
}

impl AssetBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token owned by `owner`.
    pub fn mint(&mut self, asset: AssetRef, owner: Address) -> Result<(), AssetError> {
        if self.tokens.contains_key(&asset) {
            return Err(AssetError::AlreadyMinted(asset));
        }
        self.tokens.insert(
            asset,
            TokenEntry {
                owner,
                approved: None,
            },
        );
        Ok(())
    }

    pub fn owner_of(&self, asset: &AssetRef) -> Option<Address> {
        self.tokens.get(asset).map(|t| t.owner)
    }

    pub fn approved(&self, asset: &AssetRef) -> Option<Address> {
        self.tokens.get(asset).and_then(|t| t.approved)
    }

    /// Sets the single approved operator for `asset`. Only the owner may
    /// approve; approving replaces any previous operator.
    pub fn approve(
        &mut self,
        caller: &Address,
        asset: &AssetRef,
        operator: Address,
    ) -> Result<(), AssetError> {
        let entry = self
            .tokens
            .get_mut(asset)
            .ok_or(AssetError::UnknownAsset(*asset))?;
        if entry.owner != *caller {
            return Err(AssetError::NotOwner {
                asset: *asset,
                caller: *caller,
            });
        }
        entry.approved = Some(operator);
        Ok(())
    }

    /// Checks that `operator` could move `asset` out of `from` right now,
    /// without moving it.
    pub fn check_transfer(
        &self,
        operator: &Address,
        from: &Address,
        asset: &AssetRef,
    ) -> Result<(), AssetError> {
        let entry = self
            .tokens
            .get(asset)
            .ok_or(AssetError::UnknownAsset(*asset))?;
        if entry.owner != *from {
            return Err(AssetError::NotOwner {
                asset: *asset,
                caller: *from,
            });
        }
        if operator != from && entry.approved != Some(*operator) {
            return Err(AssetError::NotApproved {
                asset: *asset,
                operator: *operator,
            });
        }
        Ok(())
    }

    /// Moves `asset` from `from` to `to` on behalf of `operator` and clears
    /// the approval.
    pub fn transfer_from(
        &mut self,
        operator: &Address,
        from: &Address,
        to: Address,
        asset: &AssetRef,
    ) -> Result<(), AssetError> {
        self.check_transfer(operator, from, asset)?;
        let entry = self
            .tokens
            .get_mut(asset)
            .ok_or(AssetError::UnknownAsset(*asset))?;
        entry.owner = to;
        entry.approved = None;
        Ok(())
    }

    /// All tokens currently owned by `owner`, sorted.
    pub fn tokens_of(&self, owner: &Address) -> Vec<AssetRef> {
        let mut owned: Vec<AssetRef> = self
            .tokens
            .iter()
            .filter(|(_, t)| t.owner == *owner)
            .map(|(a, _)| *a)
            .collect();
        owned.sort();
        owned
    }
}
