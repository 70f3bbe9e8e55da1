//! # Demo Scenario
//!
//! The end-to-end run: deploy both chains, link them, mint a test NFT to the
//! lender, credential the borrower, then list → request → approve → borrow →
//! (advance the clock) → return or default, and let the relay worker mirror
//! the outcome to the counterpart chain.
//!
//! Waiting is a clock advance, never a sleep.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use bridgelend_contracts::{CreditHistory, LoanError, LoanState};
use bridgelend_protocol::config::RELAY_POLL_INTERVAL;
use bridgelend_protocol::crypto::GuardianKeypair;
use bridgelend_protocol::relay::LoanOutcome;
use bridgelend_protocol::{format_ether, Address, Amount, AssetRef, ManualClock, Timestamp};
use chrono::DateTime;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::config::{DeploymentConfig, Ending};
use crate::deploy::{deploy_chain, link, ChainDeployment};
use crate::metrics::NodeMetrics;
use crate::relay_worker::{DrainReport, RelayRoute, RelayWorker};

/// How long to wait for the relay worker to empty the home outbox.
const RELAY_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// What the scenario observed, printed as JSON at the end of `demo`.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub home_chain: String,
    pub counterpart_chain: String,
    pub home_registry: Address,
    pub counterpart_registry: Address,
    pub asset: AssetRef,
    pub final_state: LoanState,
    pub outcome: LoanOutcome,
    pub asset_owner: Option<Address>,
    pub fee_token: Address,
    /// Lender's fee-token gain over the loan, in wei.
    pub lender_gain: Amount,
    /// Borrower's fee-token loss over the loan, in wei.
    pub borrower_cost: Amount,
    /// Fee-token value the escrow still holds after the close, in wei.
    pub escrow_held: Amount,
    pub closed_at: String,
    pub messages_applied: usize,
    pub duplicates_seen: usize,
    /// Borrower's history as the counterpart chain sees it.
    pub counterpart_history: CreditHistory,
    pub counterpart_score: u32,
}

impl ScenarioReport {
    /// One-line-per-fact summary for humans.
    pub fn summary(&self) -> String {
        format!(
            "loan on {} closed as {} ({})\n  asset {} now owned by {}\n  lender gained {}, borrower paid {}\n  {} message(s) applied on {}, borrower score there: {}",
            self.home_chain,
            self.outcome,
            self.final_state,
            self.asset,
            self.asset_owner.map(|a| a.to_string()).unwrap_or_else(|| "nobody".into()),
            format_ether(self.lender_gain),
            format_ether(self.borrower_cost),
            self.messages_applied,
            self.counterpart_chain,
            self.counterpart_score,
        )
    }
}

/// Runs the full scenario described by `config`.
pub async fn run(config: &DeploymentConfig, metrics: Arc<NodeMetrics>) -> Result<ScenarioReport> {
    config.validate()?;
    let s = &config.scenario;

    // --- Deploy ---
    let home = deploy_chain(&config.home, Arc::new(ManualClock::starting_now()))?;
    let counterpart = deploy_chain(&config.counterpart, Arc::new(ManualClock::starting_now()))?;

    let guardian = match &config.guardian_secret {
        Some(secret) => GuardianKeypair::from_hex(secret).context("invalid guardian secret")?,
        None => GuardianKeypair::generate(),
    };
    link(&home, &counterpart, guardian.public_key())?;
    info!(guardian = %guardian.public_key(), "chains linked");

    // --- Relay worker ---
    let routes = vec![
        RelayRoute {
            source: home.registry.clone(),
            destination: counterpart.registry.clone(),
            relayer: counterpart.config.relay_entry_point,
        },
        RelayRoute {
            source: counterpart.registry.clone(),
            destination: home.registry.clone(),
            relayer: home.config.relay_entry_point,
        },
    ];
    let worker = RelayWorker::new(routes, guardian, metrics.clone())
        .with_duplicate_rate(s.relay_duplicate_rate);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    // --- Accounts ---
    let asset = AssetRef::new(home.chain.next_contract_address(&s.lender), s.token_id);
    home.chain
        .assets()
        .mint(asset, s.lender)
        .context("failed to mint test asset")?;
    fund(&home, s.borrower, s.initial_balance)?;

    home.score_gate
        .mint(s.borrower, s.score_payment)
        .context("borrower failed to mint a score credential")?;
    info!(borrower = %s.borrower, score = home.score_gate.score_of(&s.borrower), "borrower credentialed");

    let lender_start = home.chain.balance_of(&home.fee_token, &s.lender);
    let borrower_start = home.chain.balance_of(&home.fee_token, &s.borrower);

    // --- Lifecycle ---
    let registry = &home.registry;
    home.chain
        .assets()
        .approve(&s.lender, &asset, registry.address())
        .context("lender failed to approve the registry")?;
    step(&metrics, "offer_for_loaning", registry.offer_for_loaning(s.lender, asset, s.loan_period_secs))?;
    step(&metrics, "request_to_borrow", registry.request_to_borrow(s.borrower, asset))?;
    step(
        &metrics,
        "approve_loan_request",
        registry.approve_loan_request(s.lender, asset, s.borrower, s.fee, s.collateral),
    )?;
    let borrowed = step(&metrics, "borrow_nft", registry.borrow_nft(s.borrower, asset, s.borrow_value))?;

    let closed = match s.ending {
        Ending::Return => {
            home.clock.advance(s.return_after_secs);
            home.chain
                .assets()
                .approve(&s.borrower, &asset, registry.address())
                .context("borrower failed to re-approve the registry")?;
            step(&metrics, "return_nft", registry.return_nft(s.borrower, asset))?
        }
        Ending::Default => {
            let expires_at = borrowed
                .expires_at
                .ok_or_else(|| anyhow!("borrowed loan has no expiry"))?;
            home.clock.advance(s.return_after_secs);
            home.clock.set(expires_at.saturating_add(1));
            step(&metrics, "claim_default", registry.claim_default(s.lender, asset))?
        }
    };
    let outcome = closed
        .outcome
        .ok_or_else(|| anyhow!("loan closed without an outcome"))?;

    // --- Relay ---
    let settled = tokio::time::timeout(RELAY_SETTLE_TIMEOUT, async {
        while home.registry.outbox_len() > 0 {
            tokio::time::sleep(RELAY_POLL_INTERVAL).await;
        }
    })
    .await;
    // The send only fails if the worker is already gone; the join reports why.
    let _ = shutdown_tx.send(true);
    let relayed: DrainReport = worker_handle.await.context("relay worker panicked")?;
    if settled.is_err() {
        bail!(
            "relay did not settle within {:?}, {} message(s) still queued",
            RELAY_SETTLE_TIMEOUT,
            home.registry.outbox_len()
        );
    }

    let escrow_held = home.registry.escrow().held(&home.fee_token);
    let report = ScenarioReport {
        home_chain: home.config.name.clone(),
        counterpart_chain: counterpart.config.name.clone(),
        home_registry: home.registry.address(),
        counterpart_registry: counterpart.registry.address(),
        asset,
        final_state: closed.state,
        outcome,
        asset_owner: home.chain.assets().owner_of(&asset),
        fee_token: home.fee_token,
        lender_gain: home
            .chain
            .balance_of(&home.fee_token, &s.lender)
            .saturating_sub(lender_start),
        borrower_cost: borrower_start.saturating_sub(home.chain.balance_of(&home.fee_token, &s.borrower)),
        escrow_held,
        closed_at: render_time(closed.closed_at.unwrap_or_default()),
        messages_applied: relayed.applied,
        duplicates_seen: relayed.duplicates,
        counterpart_history: counterpart.score_gate.history_of(&s.borrower),
        counterpart_score: counterpart.score_gate.score_of(&s.borrower),
    };
    info!(outcome = %report.outcome, applied = report.messages_applied, "scenario complete");
    Ok(report)
}

/// Credits `account` with `amount` of native currency, and of the fee token
/// when the chain has one.
fn fund(d: &ChainDeployment, account: Address, amount: Amount) -> Result<()> {
    let mut funds = d.chain.funds();
    funds
        .credit(Address::ZERO, account, amount)
        .context("failed to fund native balance")?;
    if !d.fee_token.is_zero() {
        funds
            .credit(d.fee_token, account, amount)
            .context("failed to fund fee token balance")?;
    }
    Ok(())
}

/// Records a lifecycle call in the metrics and attaches the op name to any
/// error.
fn step<T>(metrics: &NodeMetrics, op: &'static str, result: Result<T, LoanError>) -> Result<T> {
    metrics.observe_lifecycle(op, &result);
    result.with_context(|| format!("{} failed", op))
}

fn render_time(ts: Timestamp) -> String {
    DateTime::from_timestamp(ts as i64, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridgelend_protocol::parse_ether;

    #[tokio::test]
    async fn default_scenario_repays_and_relays_once() {
        let config = DeploymentConfig::default();
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let report = run(&config, metrics.clone()).await.unwrap();

        assert_eq!(report.final_state, LoanState::Closed);
        assert_eq!(report.outcome, LoanOutcome::Repaid);
        assert_eq!(report.asset_owner, Some(config.scenario.lender));
        assert_eq!(report.lender_gain, parse_ether("1").unwrap());
        // Ten went in, nine came back.
        assert_eq!(report.borrower_cost, parse_ether("1").unwrap());
        assert_eq!(report.escrow_held, 0);
        assert_eq!(report.messages_applied, 1);
        assert_eq!(report.counterpart_history.repaid, 1);
        assert_eq!(report.counterpart_history.entries[0].origin_chain, config.home.chain_id);
        assert_eq!(
            metrics.lifecycle_ops_total.with_label_values(&["return_nft"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn default_ending_seizes_collateral() {
        let mut config = DeploymentConfig::default();
        config.scenario.ending = Ending::Default;
        let report = run(&config, Arc::new(NodeMetrics::new().unwrap())).await.unwrap();

        assert_eq!(report.outcome, LoanOutcome::Defaulted);
        assert_eq!(report.asset_owner, Some(config.scenario.borrower));
        assert_eq!(report.lender_gain, parse_ether("10").unwrap());
        assert_eq!(report.counterpart_history.defaulted, 1);
    }

    #[tokio::test]
    async fn duplicate_injection_does_not_double_count() {
        let mut config = DeploymentConfig::default();
        config.scenario.relay_duplicate_rate = 1.0;
        let report = run(&config, Arc::new(NodeMetrics::new().unwrap())).await.unwrap();

        assert_eq!(report.messages_applied, 1);
        assert_eq!(report.counterpart_history.entries.len(), 1);
    }

    #[tokio::test]
    async fn rejected_step_surfaces_op_name() {
        let mut config = DeploymentConfig::default();
        config.home.min_borrower_score = 900;
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let err = run(&config, metrics.clone()).await.unwrap_err();

        assert!(err.to_string().contains("request_to_borrow"));
        assert_eq!(
            metrics
                .lifecycle_rejections_total
                .with_label_values(&["request_to_borrow"])
                .get(),
            1
        );
    }
}
