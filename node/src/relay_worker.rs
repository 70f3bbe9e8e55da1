//! # Relay Delivery Worker
//!
//! Moves history messages from each registry's outbox to its counterpart.
//! One pass ([`RelayWorker::drain`]) walks every route in sequence order:
//! seal with the guardian key, push through the wire encoding, deliver via
//! the destination's relay entry point, and acknowledge on `Applied`,
//! `Duplicate` or `Buffered`. A failed delivery is retried with exponential
//! backoff; once a message exhausts its attempts the route stops for this
//! pass so later messages never overtake it.
//!
//! Lifecycle calls never wait on this worker. [`RelayWorker::run`] repeats
//! the pass on a timer until shut down.

use std::sync::Arc;
use std::time::Duration;

use bridgelend_contracts::{LoanRegistry, ReceiveOutcome};
use bridgelend_protocol::config::{relay_backoff, RELAY_MAX_ATTEMPTS, RELAY_POLL_INTERVAL};
use bridgelend_protocol::crypto::GuardianKeypair;
use bridgelend_protocol::relay::{HistoryMessage, RelayEnvelope, RelayError};
use bridgelend_protocol::Address;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::metrics::NodeMetrics;

/// One direction of the bridge.
#[derive(Debug, Clone)]
pub struct RelayRoute {
    pub source: Arc<LoanRegistry>,
    pub destination: Arc<LoanRegistry>,
    /// Relay entry point address on the destination chain.
    pub relayer: Address,
}

/// Tally of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages the destination applied (including buffered successors
    /// released by a delivery).
    pub applied: usize,
    /// Deliveries answered with `Duplicate`.
    pub duplicates: usize,
    /// Deliveries answered with `Buffered`.
    pub buffered: usize,
    /// Messages left in an outbox after exhausting their attempts.
    pub failed: usize,
}

impl DrainReport {
    fn absorb(&mut self, other: DrainReport) {
        self.applied += other.applied;
        self.duplicates += other.duplicates;
        self.buffered += other.buffered;
        self.failed += other.failed;
    }
}

/// The delivery worker.
pub struct RelayWorker {
    routes: Vec<RelayRoute>,
    guardian: GuardianKeypair,
    metrics: Arc<NodeMetrics>,
    max_attempts: u32,
    duplicate_rate: f64,
}

impl RelayWorker {
    pub fn new(routes: Vec<RelayRoute>, guardian: GuardianKeypair, metrics: Arc<NodeMetrics>) -> Self {
        Self {
            routes,
            guardian,
            metrics,
            max_attempts: RELAY_MAX_ATTEMPTS,
            duplicate_rate: 0.0,
        }
    }

    /// Caps delivery attempts per message per pass.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Probability of delivering each applied message a second time.
    pub fn with_duplicate_rate(mut self, rate: f64) -> Self {
        self.duplicate_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// One pass over every route.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        for route in &self.routes {
            report.absorb(self.drain_route(route).await);
        }
        report
    }

    /// Drains on every [`RELAY_POLL_INTERVAL`] tick until `shutdown` flips to
    /// `true`, then does one final pass.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> DrainReport {
        let mut total = DrainReport::default();
        let mut interval = tokio::time::interval(RELAY_POLL_INTERVAL);
        info!(routes = self.routes.len(), "relay worker started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    total.absorb(self.drain().await);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        total.absorb(self.drain().await);
        info!(
            applied = total.applied,
            duplicates = total.duplicates,
            failed = total.failed,
            "relay worker stopped"
        );
        total
    }

    async fn drain_route(&self, route: &RelayRoute) -> DrainReport {
        let mut report = DrainReport::default();
        let source_chain = route.source.chain().name();

        for message in route.source.pending_messages() {
            let sequence = message.sequence;
            match self.deliver(route, message).await {
                Ok(outcome) => {
                    route.source.ack_message(sequence);
                    match outcome {
                        ReceiveOutcome::Applied { applied } => {
                            report.applied += applied;
                            self.metrics.relay_delivered_total.inc_by(applied as u64);
                        }
                        ReceiveOutcome::Duplicate => {
                            report.duplicates += 1;
                            self.metrics.relay_duplicates_total.inc();
                        }
                        ReceiveOutcome::Buffered => {
                            report.buffered += 1;
                            self.metrics.relay_buffered_total.inc();
                            debug!(
                                source = %source_chain,
                                sequence,
                                waiting = route
                                    .destination
                                    .buffered_messages(route.source.chain().chain_id(), &route.source.address()),
                                "relay message buffered behind a gap"
                            );
                        }
                    }
                }
                Err(err) => {
                    error!(
                        source = %source_chain,
                        sequence,
                        error = %err,
                        "relay delivery failed, leaving message queued"
                    );
                    report.failed = route.source.outbox_len();
                    break;
                }
            }
        }

        self.metrics
            .outbox_depth
            .with_label_values(&[source_chain.as_str()])
            .set(route.source.outbox_len() as i64);
        report
    }

    /// Seals and delivers one message, retrying with backoff. Injects a
    /// duplicate delivery at the configured rate.
    async fn deliver(&self, route: &RelayRoute, message: HistoryMessage) -> Result<ReceiveOutcome, RelayError> {
        let envelope = RelayEnvelope::seal(message, &self.guardian)?;
        let wire = envelope.to_bytes()?;
        let payload_id = envelope.payload_id_hex();

        let mut attempt = 0;
        loop {
            let received = RelayEnvelope::from_bytes(&wire)?;
            match route.destination.receive_relay(&route.relayer, &received) {
                Ok(outcome) => {
                    debug!(
                        sequence = received.message.sequence,
                        %payload_id,
                        ?outcome,
                        attempt,
                        "relay message delivered"
                    );
                    let inject = self.duplicate_rate > 0.0 && rand::thread_rng().gen_bool(self.duplicate_rate);
                    if inject {
                        let replay = route.destination.receive_relay(&route.relayer, &received)?;
                        debug!(%payload_id, ?replay, "duplicate delivery injected");
                        if replay == ReceiveOutcome::Duplicate {
                            self.metrics.relay_duplicates_total.inc();
                        }
                    }
                    return Ok(outcome);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay: Duration = relay_backoff(attempt - 1);
                    warn!(
                        %payload_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "relay delivery failed, retrying"
                    );
                    self.metrics.relay_retries_total.inc();
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
