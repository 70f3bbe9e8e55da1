//! # Primitive Types
//!
//! The handful of types every other module speaks in. Addresses are 20-byte
//! account identifiers (EVM-shaped, because both demo chains are EVM chains),
//! amounts are `u128` wei, and an [`AssetRef`] is the `(contract, token id)`
//! pair that keys all loan state.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::crypto::hash::{blake3_hash_multi, sha256_array};

/// Monetary amount in the smallest unit of the token (wei for 18-decimal
/// tokens).
pub type Amount = u128;

/// Unix timestamp in seconds, as reported by a chain's clock.
pub type Timestamp = u64;

/// Number of wei in one whole token. Both demo fee currencies use 18 decimals.
pub const WEI_PER_ETHER: Amount = 1_000_000_000_000_000_000;

const ETHER_DECIMALS: usize = 18;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced when parsing addresses or decimal amounts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    /// The string is not a valid non-negative decimal number.
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),

    /// More than 18 fractional digits were supplied.
    #[error("too many decimal places in {0:?} (max 18)")]
    TooPrecise(String),

    /// The value does not fit in a `u128`.
    #[error("amount overflow: {0:?}")]
    Overflow(String),

    /// The string is not a 20-byte hex address.
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account or contract address.
///
/// Displayed and serialized as `0x`-prefixed lowercase hex. The zero address
/// doubles as the "native currency" marker wherever a token address is
/// expected.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Wraps raw address bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns `true` for the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Derives an account address from an Ed25519 public key: the last 20
    /// bytes of `SHA-256(pubkey)`.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = sha256_array(public_key);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }

    /// Derives a contract address from the deploying chain, the deployer and
    /// the deployer's nonce. Deterministic, so two deployments of the same
    /// script produce the same addresses.
    pub fn for_contract(chain_id: ChainId, deployer: &Address, nonce: u64) -> Self {
        let digest = blake3_hash_multi(&[
            b"bridgelend.contract",
            &chain_id.0.to_be_bytes(),
            deployer.as_bytes(),
            &nonce.to_be_bytes(),
        ]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Self(bytes)
    }

    /// Hashes an arbitrary label into an address. Handy for named test
    /// accounts (`Address::from_label("lender")`).
    pub fn from_label(label: &str) -> Self {
        let digest = blake3_hash_multi(&[b"bridgelend.account", label.as_bytes()]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Self(bytes)
    }

    /// Full `0x`-prefixed hex rendering.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.0);
        write!(f, "Address(0x{}..{})", &hex[..8], &hex[36..])
    }
}

impl FromStr for Address {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| AmountError::InvalidAddress(s.into()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| AmountError::InvalidAddress(s.into()))?;
        Ok(Self(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// ChainId
// ---------------------------------------------------------------------------

/// Relay-level chain identifier. Sixteen bits, matching what the relay
/// network uses to route messages.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u16);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// AssetRef
// ---------------------------------------------------------------------------

/// Identifies a unique lendable asset: the collection contract plus the
/// token id inside it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetRef {
    /// Address of the NFT collection contract.
    pub contract: Address,
    /// Token id within the collection. Collections issue 256-bit ids; this
    /// host supports the low 128 bits.
    pub token_id: u128,
}

impl AssetRef {
    pub fn new(contract: Address, token_id: u128) -> Self {
        Self { contract, token_id }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.contract, self.token_id)
    }
}

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetRef({:?}#{})", self.contract, self.token_id)
    }
}

// ---------------------------------------------------------------------------
// Decimal amounts
// ---------------------------------------------------------------------------

/// Parses a decimal token amount ("0.2", "10", "1.000000000000000001") into
/// wei.
pub fn parse_ether(s: &str) -> Result<Amount, AmountError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(AmountError::InvalidAmount(s.into()));
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    let digits_ok = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !digits_ok(whole) || !digits_ok(frac) || (whole.is_empty() && frac.is_empty()) {
        return Err(AmountError::InvalidAmount(s.into()));
    }
    if frac.len() > ETHER_DECIMALS {
        return Err(AmountError::TooPrecise(s.into()));
    }

    let whole_wei = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| AmountError::Overflow(s.into()))?
            .checked_mul(WEI_PER_ETHER)
            .ok_or_else(|| AmountError::Overflow(s.into()))?
    };

    let frac_wei = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = ETHER_DECIMALS);
        padded
            .parse::<u128>()
            .map_err(|_| AmountError::InvalidAmount(s.into()))?
    };

    whole_wei
        .checked_add(frac_wei)
        .ok_or_else(|| AmountError::Overflow(s.into()))
}

/// Formats wei as a decimal token amount, trimming trailing zeros
/// (`10^18` → `"1.0"`, `2*10^17` → `"0.2"`).
pub fn format_ether(amount: Amount) -> String {
    let whole = amount / WEI_PER_ETHER;
    let frac = amount % WEI_PER_ETHER;
    if frac == 0 {
        return format!("{}.0", whole);
    }
    let frac_str = format!("{:018}", frac);
    format!("{}.{}", whole, frac_str.trim_end_matches('0'))
}
