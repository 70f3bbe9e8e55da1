//! # Relay Endpoints
//!
//! The registry-side halves of the cross-chain relay.
//!
//! - [`Outbox`] holds history messages until the delivery worker
//!   acknowledges them. Sequence numbers are per source, start at 1 and never
//!   repeat.
//! - [`Inbox`] tracks, per source registry, the last sequence applied. Replays
//!   are dropped, and a message that arrives ahead of a gap waits until the
//!   gap fills.

use std::collections::{BTreeMap, HashMap, VecDeque};

use bridgelend_protocol::relay::{HistoryMessage, RelayError};
use bridgelend_protocol::{Address, ChainId};

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Unacknowledged outgoing messages, in sequence order.
#[derive(Debug, Default)]
pub struct Outbox {
    last_sequence: u64,
    pending: VecDeque<HistoryMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next sequence number and queues the message `build`
    /// produces for it.
    pub fn enqueue(&mut self, build: impl FnOnce(u64) -> HistoryMessage) -> u64 {
        self.last_sequence += 1;
        let sequence = self.last_sequence;
        let mut message = build(sequence);
        message.sequence = sequence;
        self.pending.push_back(message);
        sequence
    }

    /// Snapshot of every unacknowledged message, oldest first.
    pub fn pending(&self) -> Vec<HistoryMessage> {
        self.pending.iter().cloned().collect()
    }

    /// Drops the message with `sequence`. Returns `false` if it was not
    /// pending.
    pub fn ack(&mut self, sequence: u64) -> bool {
        match self.pending.iter().position(|m| m.sequence == sequence) {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Highest sequence number ever assigned.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

/// What the inbox decided about an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Already applied or already waiting; nothing to do.
    Duplicate,
    /// Ahead of a gap; held until the missing sequences arrive.
    Buffered,
    /// Messages to apply now, in order. Always starts with the admitted
    /// message and may carry buffered successors.
    Ready(Vec<HistoryMessage>),
}

#[derive(Debug, Default)]
struct SourceCursor {
    last_applied: u64,
    buffered: BTreeMap<u64, HistoryMessage>,
}

/// Per-source delivery tracking for a receiving registry.
#[derive(Debug, Default)]
pub struct Inbox {
    cursors: HashMap<(ChainId, Address), SourceCursor>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides what to do with `message`. A `Ready` result already counts
    /// as applied.
    pub fn admit(&mut self, message: HistoryMessage) -> Result<Admission, RelayError> {
        if message.sequence == 0 {
            return Err(RelayError::ZeroSequence);
        }
        let cursor = self
            .cursors
            .entry((message.source_chain, message.source_registry))
            .or_default();

        if message.sequence <= cursor.last_applied
            || cursor.buffered.contains_key(&message.sequence)
        {
            return Ok(Admission::Duplicate);
        }
        if message.sequence > cursor.last_applied + 1 {
            cursor.buffered.insert(message.sequence, message);
            return Ok(Admission::Buffered);
        }

        cursor.last_applied = message.sequence;
        let mut ready = vec![message];
        while let Some(next) = cursor.buffered.remove(&(cursor.last_applied + 1)) {
            cursor.last_applied = next.sequence;
            ready.push(next);
        }
        Ok(Admission::Ready(ready))
    }

    /// Highest contiguous sequence applied from this source; 0 if none.
    pub fn last_applied(&self, chain: ChainId, registry: &Address) -> u64 {
        self.cursors
            .get(&(chain, *registry))
            .map(|c| c.last_applied)
            .unwrap_or(0)
    }

    /// Number of messages from this source waiting on a gap.
    pub fn buffered(&self, chain: ChainId, registry: &Address) -> usize {
        self.cursors
            .get(&(chain, *registry))
            .map(|c| c.buffered.len())
            .unwrap_or(0)
    }
}
