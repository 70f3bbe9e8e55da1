//! Error types for relay message handling.
//!
//! None of these ever reach a lifecycle caller: they surface to the delivery
//! worker, which logs and retries.

use thiserror::Error;

use crate::types::{Address, ChainId};

/// Errors that can occur while sealing, decoding or accepting a relay
/// message.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Encoding or decoding the wire format failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The message was produced by a protocol version we don't speak.
    #[error("unsupported relay message version: {0}")]
    UnsupportedVersion(u8),

    /// The envelope was signed by a guardian other than the configured one.
    #[error("envelope signed by an unknown guardian")]
    UnknownGuardian,

    /// The payload id does not match the message content.
    #[error("payload id does not match message content")]
    PayloadIdMismatch,

    /// The guardian signature did not verify.
    #[error("invalid guardian signature")]
    InvalidSignature,

    /// The caller delivering the envelope is not the configured relay entry
    /// point.
    #[error("unauthorized relayer: {caller}")]
    UnauthorizedRelayer {
        /// Address that attempted delivery.
        caller: Address,
    },

    /// The message did not come from the configured counterpart registry.
    #[error("unexpected source: chain {chain}, registry {registry}")]
    UnexpectedSource {
        /// Chain the message claims to come from.
        chain: ChainId,
        /// Registry the message claims to come from.
        registry: Address,
    },

    /// The message is addressed to a different registry or chain.
    #[error("message addressed to registry {registry} on chain {chain}")]
    WrongDestination {
        /// Target chain in the message.
        chain: ChainId,
        /// Target registry in the message.
        registry: Address,
    },

    /// The receiving registry has no cross-chain link configured yet.
    #[error("registry has no cross-chain link configured")]
    NotLinked,

    /// The receiving registry has no score gate to apply history to.
    #[error("receiving registry is not initialized")]
    Uninitialized,

    /// Sequence numbers start at 1.
    #[error("relay sequence numbers start at 1")]
    ZeroSequence,
}
