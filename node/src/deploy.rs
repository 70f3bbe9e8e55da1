//! # Deployment
//!
//! Stands up the contracts on one chain from its [`ChainClientConfig`]:
//! loan registry, score gate (treasury = registry), an optional fee token,
//! then `init`. Linking two deployments (`init2` on both sides) is a
//! separate step because it needs both addresses.

use std::sync::Arc;

use anyhow::{Context, Result};
use bridgelend_contracts::{Chain, LoanRegistry, RelayEntryPoint, ScoreGate};
use bridgelend_protocol::crypto::GuardianPublicKey;
use bridgelend_protocol::{Address, ManualClock};
use tracing::info;

use crate::config::ChainClientConfig;

/// Everything deployed on one chain.
#[derive(Debug, Clone)]
pub struct ChainDeployment {
    pub config: ChainClientConfig,
    pub clock: Arc<ManualClock>,
    pub chain: Arc<Chain>,
    pub registry: Arc<LoanRegistry>,
    pub score_gate: Arc<ScoreGate>,
    /// Token fees and collateral are paid in; zero for native currency.
    pub fee_token: Address,
}

/// Deploys and initializes the contracts for one chain.
pub fn deploy_chain(config: &ChainClientConfig, clock: Arc<ManualClock>) -> Result<ChainDeployment> {
    let chain = Arc::new(Chain::new(config.chain_id, clock.clone()));
    let deployer = config.deployer;

    let registry = LoanRegistry::deploy(chain.clone(), deployer);
    let score_gate = ScoreGate::deploy(
        chain.clone(),
        &deployer,
        registry.address(),
        config.score_mint_price,
        config.min_borrower_score,
    );
    let fee_token = if config.fee_token_native {
        Address::ZERO
    } else {
        let token = chain.next_contract_address(&deployer);
        info!(chain = %config.name, %token, "fee token deployed");
        token
    };

    registry
        .init(&deployer, score_gate.clone(), fee_token)
        .with_context(|| format!("init failed on {}", config.name))?;

    Ok(ChainDeployment {
        config: config.clone(),
        clock,
        chain,
        registry,
        score_gate,
        fee_token,
    })
}

/// Points each registry at the other. Each side accepts deliveries from its
/// own chain's relay entry point, signed by `guardian`.
pub fn link(a: &ChainDeployment, b: &ChainDeployment, guardian: GuardianPublicKey) -> Result<()> {
    for (local, remote) in [(a, b), (b, a)] {
        let entry = RelayEntryPoint {
            address: local.config.relay_entry_point,
            guardian,
        };
        local
            .registry
            .init2(
                &local.config.deployer,
                remote.registry.address(),
                entry,
                remote.config.chain_id,
            )
            .with_context(|| format!("init2 failed on {}", local.config.name))?;
    }
    Ok(())
}
