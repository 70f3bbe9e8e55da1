//! # CLI Interface
//!
//! Command-line structure for `bridgelend-node`, via `clap` derive.
//! Subcommands: `demo`, `config`, `keygen` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Ending;

/// BridgeLend orchestrator.
///
/// Deploys the loan registry and score gate on two simulated chains, links
/// them, drives one NFT loan through its lifecycle and relays the outcome
/// to the other chain.
#[derive(Parser, Debug)]
#[command(
    name = "bridgelend-node",
    about = "BridgeLend cross-chain NFT loan orchestrator",
    version,
    propagate_version = true
)]
pub struct BridgeLendCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the two-chain loan scenario end to end.
    Demo(DemoArgs),
    /// Print (or write) the default deployment configuration as JSON.
    Config(ConfigArgs),
    /// Generate a guardian keypair for signing relay envelopes.
    Keygen,
    /// Print version information and exit.
    Version,
}

/// Arguments for the `demo` subcommand.
#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// Path to a deployment configuration file (JSON).
    ///
    /// When omitted, the built-in defaults are used.
    #[arg(long, short = 'c', env = "BRIDGELEND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds to advance the clock between borrowing and the ending.
    #[arg(long)]
    pub return_after: Option<u64>,

    /// Probability in [0, 1] that the relay delivers a message twice.
    #[arg(long)]
    pub relay_duplicate_rate: Option<f64>,

    /// How the loan ends: the borrower returns it, or it defaults.
    #[arg(long, value_enum)]
    pub ending: Option<Ending>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "BRIDGELEND_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Serve Prometheus metrics on this port and keep running after the
    /// scenario until interrupted.
    #[arg(long, env = "BRIDGELEND_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for the `config` subcommand.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Write to this file instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        BridgeLendCli::command().debug_assert();
    }

    #[test]
    fn demo_overrides_parse() {
        let cli = BridgeLendCli::try_parse_from([
            "bridgelend-node",
            "demo",
            "--ending",
            "default",
            "--relay-duplicate-rate",
            "0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Demo(args) => {
                assert_eq!(args.ending, Some(Ending::Default));
                assert_eq!(args.relay_duplicate_rate, Some(0.5));
                assert_eq!(args.return_after, None);
            }
            other => panic!("expected demo, got {:?}", other),
        }
    }
}
