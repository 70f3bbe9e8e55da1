//! # Cross-Chain Relay Messages
//!
//! When a loan closes, the registry that held the asset tells its counterpart
//! how it ended. The message is history only: custody and fund disposition
//! are already final on the source chain by the time it is sent.
//!
//! ```text
//!   ┌────────────────┐   enqueue    ┌────────┐  seal + deliver  ┌────────────────┐
//!   │ LoanRegistry A │ ───────────► │ outbox │ ───────────────► │ LoanRegistry B │
//!   └────────────────┘  (commit)    └────────┘  (at least once) └────────────────┘
//! ```
//!
//! Delivery is at-least-once and ordered per source, so receivers dedupe by
//! `(source chain, source registry, sequence)`. Every envelope carries a
//! BLAKE3 payload id and an Ed25519 guardian signature over that id.

mod error;
pub mod message;

pub use error::RelayError;
pub use message::{HistoryMessage, LoanOutcome, RelayEnvelope};
