//! # BridgeLend Contracts
//!
//! The contract layer of the BridgeLend loan protocol, running against an
//! in-process chain host:
//!
//! - **Loan Registry**: the per-asset loan state machine (list, request,
//!   approve, borrow, return, default) and the relay endpoints that mirror
//!   closed loans to the counterpart registry on another chain.
//! - **Asset Escrow**: custody of the lender's asset approval and the
//!   borrower's fee and collateral for the life of a loan.
//! - **Score Gate**: paid credit credentials and the per-address credit
//!   history that gates who may borrow.
//! - **Relay endpoints**: the registry's outbox and its idempotent,
//!   per-source ordered inbox.
//! - **Chain host**: asset book, funds ledger and clock for one chain.
//!
//! ## Design Principles
//!
//! 1. All monetary operations use checked arithmetic.
//! 2. State transitions are explicit enum variants, never boolean flags.
//! 3. Every guard is validated before any asset or value moves.
//! 4. Records are serializable (serde) so the node can report them.

pub mod assets;
pub mod chain;
pub mod escrow;
pub mod funds;
pub mod registry;
pub mod relay;
pub mod score_gate;

pub use assets::{AssetBook, AssetError};
pub use chain::Chain;
pub use escrow::{AssetEscrow, EscrowError, FundsLockId};
pub use funds::{FundsError, FundsLedger};
pub use registry::{
    CrossChainLink, LoanError, LoanRecord, LoanRegistry, LoanState, ReceiveOutcome, RegistryConfig,
    RelayEntryPoint,
};
pub use relay::{Admission, Inbox, Outbox};
pub use score_gate::{CreditHistory, HistoryEntry, ScoreCredential, ScoreError, ScoreGate};
