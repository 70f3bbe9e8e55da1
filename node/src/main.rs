// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # BridgeLend Orchestrator
//!
//! Entry point for the `bridgelend-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and runs the two-chain loan scenario.
//!
//! The binary supports four subcommands:
//!
//! - `demo`   : deploy, link, run one loan and relay its outcome
//! - `config` : print the default deployment configuration
//! - `keygen` : generate a relay guardian keypair
//! - `version`: print build version information

mod cli;
mod config;
mod deploy;
mod logging;
mod metrics;
mod relay_worker;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use bridgelend_protocol::crypto::GuardianKeypair;

use cli::{BridgeLendCli, Commands};
use config::DeploymentConfig;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BridgeLendCli::parse();

    match cli.command {
        Commands::Demo(args) => run_demo(args).await,
        Commands::Config(args) => write_config(args),
        Commands::Keygen => {
            generate_guardian();
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Runs the scenario, prints its report, and optionally keeps serving
/// metrics until interrupted.
async fn run_demo(args: cli::DemoArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_DIRECTIVE, LogFormat::from_str_lossy(&args.log_format));

    // --- Configuration ---
    let mut config = match &args.config {
        Some(path) => DeploymentConfig::load(path)?,
        None => DeploymentConfig::default(),
    };
    if let Some(secs) = args.return_after {
        config.scenario.return_after_secs = secs;
    }
    if let Some(rate) = args.relay_duplicate_rate {
        config.scenario.relay_duplicate_rate = rate;
    }
    if let Some(ending) = args.ending {
        config.scenario.ending = ending;
    }
    config.validate().context("invalid deployment configuration")?;

    tracing::info!(
        home = %config.home.name,
        counterpart = %config.counterpart.name,
        ending = ?config.scenario.ending,
        "starting bridgelend demo"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let metrics_server = match args.metrics_port {
        Some(port) => {
            let addr = format!("0.0.0.0:{}", port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind metrics listener on {}", addr))?;
            tracing::info!("Metrics server listening on {}", addr);
            let router = metrics::router(Arc::clone(&node_metrics));
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, router).await {
                    tracing::error!("Metrics server error: {}", e);
                }
            }))
        }
        None => None,
    };

    // --- Scenario ---
    let report = scenario::run(&config, Arc::clone(&node_metrics)).await?;
    eprintln!("{}", report.summary());
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialize report")?
    );

    if let Some(server) = metrics_server {
        tracing::info!("scenario finished, serving metrics until interrupted");
        shutdown_signal().await;
        server.abort();
    }

    tracing::info!("bridgelend-node stopped");
    Ok(())
}

/// Prints the default configuration, or writes it to `--output`.
fn write_config(args: cli::ConfigArgs) -> Result<()> {
    let json = DeploymentConfig::default().to_json()?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write config to {}", path.display()))?;
            println!("Default configuration written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Generates a fresh guardian keypair. The secret goes into
/// `guardian_secret` in the deployment config.
fn generate_guardian() {
    let keypair = GuardianKeypair::generate();
    println!("Guardian keypair generated.");
    println!("  Secret key : {}", keypair.secret_key_hex());
    println!("  Public key : {}", keypair.public_key());
    println!("  Address    : {}", keypair.address());
}

/// Prints version information to stdout.
fn print_version() {
    println!("bridgelend-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol        {}", bridgelend_protocol::config::PROTOCOL_VERSION);
    println!(
        "relay messages  v{}",
        bridgelend_protocol::config::RELAY_MESSAGE_VERSION
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. A handler that cannot
/// be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
