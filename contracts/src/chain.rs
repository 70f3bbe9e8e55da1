//! # Chain Host
//!
//! An in-process stand-in for one hosting chain: its relay chain id, its
//! clock, its NFT ledger and its funds ledger. Contracts deployed "on" a
//! chain share one `Arc<Chain>`.
//!
//! Lock order, everywhere: a registry's per-asset slot, then its escrow,
//! then the asset book, then the funds ledger.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bridgelend_protocol::config::chain_name;
use bridgelend_protocol::{Address, Amount, ChainId, Clock, Timestamp};
use parking_lot::{Mutex, MutexGuard};

use crate::assets::AssetBook;
use crate::funds::FundsLedger;

/// One simulated chain.
pub struct Chain {
    chain_id: ChainId,
    clock: Arc<dyn Clock>,
    assets: Mutex<AssetBook>,
    funds: Mutex<FundsLedger>,
    nonces: Mutex<HashMap<Address, u64>>,
}

impl Chain {
    pub fn new(chain_id: ChainId, clock: Arc<dyn Clock>) -> Self {
        Self {
            chain_id,
            clock,
            assets: Mutex::new(AssetBook::new()),
            funds: Mutex::new(FundsLedger::new()),
            nonces: Mutex::new(HashMap::new()),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn name(&self) -> String {
        chain_name(self.chain_id)
    }

    /// This chain's current block time.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Allocates the address of the next contract `deployer` creates.
    pub fn next_contract_address(&self, deployer: &Address) -> Address {
        let mut nonces = self.nonces.lock();
        let nonce = nonces.entry(*deployer).or_insert(0);
        let address = Address::for_contract(self.chain_id, deployer, *nonce);
        *nonce += 1;
        address
    }

    pub fn assets(&self) -> MutexGuard<'_, AssetBook> {
        self.assets.lock()
    }

    pub fn funds(&self) -> MutexGuard<'_, FundsLedger> {
        self.funds.lock()
    }

    /// Shorthand for a single balance read.
    pub fn balance_of(&self, token: &Address, holder: &Address) -> Amount {
        self.funds.lock().balance_of(token, holder)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("chain_id", &self.chain_id)
            .field("now", &self.now())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridgelend_protocol::ManualClock;

    #[test]
    fn contract_addresses_are_unique_per_deployment() {
        let chain = Chain::new(ChainId(5), Arc::new(ManualClock::new(0)));
        let deployer = Address::from_label("deployer");
        let a = chain.next_contract_address(&deployer);
        let b = chain.next_contract_address(&deployer);
        assert_ne!(a, b);
        assert_eq!(a, Address::for_contract(ChainId(5), &deployer, 0));
    }

    #[test]
    fn now_follows_the_chain_clock() {
        let clock = Arc::new(ManualClock::new(100));
        let chain = Chain::new(ChainId(4), clock.clone());
        assert_eq!(chain.now(), 100);
        clock.advance(50);
        assert_eq!(chain.now(), 150);
    }
}
