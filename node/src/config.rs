//! # Deployment Configuration
//!
//! Everything the orchestrator needs to stand up the two chains and run the
//! scenario, loaded from a JSON file or taken from [`Default`]. Each chain
//! gets its own [`ChainClientConfig`], which is handed explicitly to the
//! code acting on that chain.
//!
//! Amounts are written as decimal token strings (`"0.2"`), not wei.

use std::path::Path;

use anyhow::{bail, Context, Result};
use bridgelend_protocol::config::{
    CHAIN_ID_BSC_TESTNET, CHAIN_ID_POLYGON_MUMBAI, DEFAULT_SCORE_MINT_PRICE, MAX_LOAN_PERIOD_SECS,
    MIN_LOAN_PERIOD_SECS,
};
use bridgelend_protocol::{Address, Amount, ChainId};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Connection and deployment settings for one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainClientConfig {
    /// Human-readable name, used in logs and the report.
    pub name: String,
    pub chain_id: ChainId,
    /// Account that deploys and owns the contracts on this chain.
    pub deployer: Address,
    /// Address the relay delivers from on this chain.
    pub relay_entry_point: Address,
    /// Charge fees in native currency (`true`) or in a fee token deployed
    /// alongside the registry (`false`).
    pub fee_token_native: bool,
    #[serde(with = "ether_amount")]
    pub score_mint_price: Amount,
    pub min_borrower_score: u32,
}

/// How the scenario's loan ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Ending {
    /// The borrower returns the asset after `return_after_secs`.
    Return,
    /// The borrower keeps it past expiry and the lender claims default.
    Default,
}

/// Parameters of the demo loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub lender: Address,
    pub borrower: Address,
    /// Token id of the test NFT minted to the lender.
    pub token_id: u128,
    pub loan_period_secs: u64,
    #[serde(with = "ether_amount")]
    pub fee: Amount,
    #[serde(with = "ether_amount")]
    pub collateral: Amount,
    /// Value attached to `borrow_nft`.
    #[serde(with = "ether_amount")]
    pub borrow_value: Amount,
    /// Value attached to the score credential mint.
    #[serde(with = "ether_amount")]
    pub score_payment: Amount,
    /// Starting balance of the borrower, in native currency and in the fee
    /// token if there is one.
    #[serde(with = "ether_amount")]
    pub initial_balance: Amount,
    /// Clock advance between borrowing and the ending.
    pub return_after_secs: u64,
    pub ending: Ending,
    /// Probability that the relay worker delivers a message twice.
    pub relay_duplicate_rate: f64,
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Chain the loan happens on.
    pub home: ChainClientConfig,
    /// Chain that mirrors the home chain's loan history.
    pub counterpart: ChainClientConfig,
    /// Hex Ed25519 seed of the relay guardian. A fresh key is generated when
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_secret: Option<String>,
    pub scenario: ScenarioConfig,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        let deployer = Address::from_label("deployer");
        Self {
            home: ChainClientConfig {
                name: "polygon-mumbai".into(),
                chain_id: CHAIN_ID_POLYGON_MUMBAI,
                deployer,
                relay_entry_point: Address::from_label("relayer.polygon-mumbai"),
                fee_token_native: false,
                score_mint_price: DEFAULT_SCORE_MINT_PRICE,
                min_borrower_score: 0,
            },
            counterpart: ChainClientConfig {
                name: "bsc-testnet".into(),
                chain_id: CHAIN_ID_BSC_TESTNET,
                deployer,
                relay_entry_point: Address::from_label("relayer.bsc-testnet"),
                fee_token_native: true,
                score_mint_price: DEFAULT_SCORE_MINT_PRICE,
                min_borrower_score: 0,
            },
            guardian_secret: None,
            scenario: ScenarioConfig {
                lender: Address::from_label("lender"),
                borrower: Address::from_label("borrower"),
                token_id: 1,
                loan_period_secs: 5_000,
                fee: ether(1),
                collateral: ether(9),
                borrow_value: ether(10),
                score_payment: DEFAULT_SCORE_MINT_PRICE * 2,
                initial_balance: ether(100),
                return_after_secs: 300,
                ending: Ending::Return,
                relay_duplicate_rate: 0.0,
            },
        }
    }
}

fn ether(whole: u128) -> Amount {
    whole * bridgelend_protocol::WEI_PER_ETHER
}

impl DeploymentConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize config")
    }

    /// Rejects configurations the scenario could never complete.
    pub fn validate(&self) -> Result<()> {
        if self.home.chain_id == self.counterpart.chain_id {
            bail!("home and counterpart chains must differ (both {})", self.home.chain_id);
        }
        let s = &self.scenario;
        if !(MIN_LOAN_PERIOD_SECS..=MAX_LOAN_PERIOD_SECS).contains(&s.loan_period_secs) {
            bail!("loan period {}s is out of range", s.loan_period_secs);
        }
        let required = s
            .fee
            .checked_add(s.collateral)
            .context("fee plus collateral overflows")?;
        if s.borrow_value < required {
            bail!("borrow value {} does not cover fee plus collateral {}", s.borrow_value, required);
        }
        if s.score_payment < self.home.score_mint_price {
            bail!("score payment is below the home chain's mint price");
        }
        if !(0.0..=1.0).contains(&s.relay_duplicate_rate) {
            bail!("relay duplicate rate must be within [0, 1]");
        }
        if s.lender == s.borrower {
            bail!("lender and borrower must be different accounts");
        }
        Ok(())
    }
}

/// Serde adapter for decimal token strings.
mod ether_amount {
    use bridgelend_protocol::{format_ether, parse_ether, Amount};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_ether(*amount))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_ether(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridgelend_protocol::parse_ether;

    #[test]
    fn default_config_is_valid() {
        DeploymentConfig::default().validate().unwrap();
    }

    #[test]
    fn json_roundtrip_uses_decimal_amounts() {
        let config = DeploymentConfig::default();
        let json = config.to_json().unwrap();
        assert!(json.contains("\"fee\": \"1.0\""));
        assert!(json.contains("\"score_payment\": \"0.2\""));
        assert!(json.contains("\"ending\": \"return\""));
        let parsed: DeploymentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn underfunded_borrow_is_rejected() {
        let mut config = DeploymentConfig::default();
        config.scenario.borrow_value = parse_ether("9.5").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn same_chain_twice_is_rejected() {
        let mut config = DeploymentConfig::default();
        config.counterpart.chain_id = config.home.chain_id;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_rate_must_be_a_probability() {
        let mut config = DeploymentConfig::default();
        config.scenario.relay_duplicate_rate = 1.5;
        assert!(config.validate().is_err());
    }
}
