//! # Protocol Configuration & Constants
//!
//! Every magic number in BridgeLend lives here. If you're hardcoding a
//! constant somewhere else, move it here.
//!
//! Chain identifiers follow the relay network's numbering, not EVM chain ids:
//! the relay routes by a 16-bit id and that is what `init2` receives.

use std::time::Duration;

use crate::types::{Amount, ChainId, WEI_PER_ETHER};

// ---------------------------------------------------------------------------
// Chain Identifiers
// ---------------------------------------------------------------------------

/// BSC testnet, as numbered by the relay network.
pub const CHAIN_ID_BSC_TESTNET: ChainId = ChainId(4);

/// Polygon Mumbai, as numbered by the relay network.
pub const CHAIN_ID_POLYGON_MUMBAI: ChainId = ChainId(5);

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Protocol version string reported by the node binary.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version byte carried in every relay message. Bump when the message layout
/// changes; receivers reject versions they don't know.
pub const RELAY_MESSAGE_VERSION: u8 = 1;

/// BLAKE3 `derive_key` context for relay payload ids.
pub const RELAY_PAYLOAD_CONTEXT: &str = "bridgelend 2026-01 relay history payload v1";

// ---------------------------------------------------------------------------
// Loan Parameters
// ---------------------------------------------------------------------------

/// Shortest loan period a lender may offer.
pub const MIN_LOAN_PERIOD_SECS: u64 = 1;

/// Longest loan period a lender may offer: one year.
pub const MAX_LOAN_PERIOD_SECS: u64 = 365 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Credit Scoring
// ---------------------------------------------------------------------------

/// Default price of a score credential: 0.1 of the chain's native currency.
pub const DEFAULT_SCORE_MINT_PRICE: Amount = WEI_PER_ETHER / 10;

/// Score of a fresh credential with no history.
pub const BASE_CREDIT_SCORE: u32 = 500;

/// Upper bound of the score range. The lower bound is zero.
pub const MAX_CREDIT_SCORE: u32 = 1000;

/// Points gained for a loan returned within its period.
pub const SCORE_REPAID_BONUS: u32 = 25;

/// Points gained for a loan returned after its period elapsed.
pub const SCORE_REPAID_LATE_BONUS: u32 = 5;

/// Points lost for a defaulted loan.
pub const SCORE_DEFAULT_PENALTY: u32 = 150;

// ---------------------------------------------------------------------------
// Relay Timing
// ---------------------------------------------------------------------------

/// How often the delivery worker polls outboxes when they are idle.
pub const RELAY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// First retry delay after a failed delivery. Doubles on every attempt.
pub const RELAY_BASE_BACKOFF: Duration = Duration::from_millis(100);

/// Ceiling for the exponential backoff.
pub const RELAY_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Delivery attempts per message per drain pass before the worker moves on
/// and tries again on the next pass.
pub const RELAY_MAX_ATTEMPTS: u32 = 8;

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Returns a friendly name for a relay chain id, mainly for logging.
pub fn chain_name(chain_id: ChainId) -> String {
    match chain_id {
        CHAIN_ID_BSC_TESTNET => "bsc-testnet".to_string(),
        CHAIN_ID_POLYGON_MUMBAI => "polygon-mumbai".to_string(),
        other => format!("chain-{}", other.0),
    }
}

/// Backoff delay for the given zero-based attempt number.
pub fn relay_backoff(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    RELAY_BASE_BACKOFF
        .checked_mul(factor)
        .map(|d| d.min(RELAY_MAX_BACKOFF))
        .unwrap_or(RELAY_MAX_BACKOFF)
}
