// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # BridgeLend Protocol: Core Library
//!
//! Shared vocabulary for the BridgeLend cross-chain NFT loan protocol. Two
//! loan registries live on two independent chains, and everything they need
//! to agree on without sharing a clock or storage is defined here.
//!
//! ## Architecture
//!
//! - **types**: addresses, asset references, amounts, chain identifiers.
//! - **config**: protocol constants: chain ids, loan bounds, credit scoring
//!   weights, relay timing.
//! - **clock**: per-chain notion of "now". Expiry is always evaluated
//!   against the clock of the chain that holds the asset.
//! - **crypto**: BLAKE3/SHA-256 helpers and the Ed25519 relay guardian key.
//! - **relay**: the history message mirrored between a registry pair and
//!   the signed envelope it travels in.
//!
//! ## Design Philosophy
//!
//! 1. Amounts are integers in the smallest unit. Floats never touch money.
//! 2. Identifiers are newtypes, not bare strings.
//! 3. Anything that crosses a chain boundary is signed and content-addressed.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod relay;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use types::{
    format_ether, parse_ether, Address, Amount, AmountError, AssetRef, ChainId, Timestamp,
    WEI_PER_ETHER,
};
