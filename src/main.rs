//! offline-signer
//!
//! Runs one transfer through the offline signing pipeline:
//! provision a durable nonce (with `--nonce`), draft the unsigned
//! transaction, wait `--delay-ms`, sign, and broadcast.

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use offline_signer::config::Config;
use offline_signer::offline_signer::SigningDelay;
use offline_signer::pipeline::{Pipeline, RunContext, RunMode};
use offline_signer::rpc_manager::{LedgerRpc, RpcLedger};
use offline_signer::wallet::RunWallets;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Use a durable nonce account instead of a recent blockhash
    #[arg(long)]
    nonce: bool,

    /// Offline signing delay in milliseconds [default: signing.delay_ms, 120000]
    #[arg(long, value_name = "MS", allow_negative_numbers = true)]
    delay_ms: Option<i64>,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Write Prometheus text metrics here at exit
    #[arg(long, value_name = "PATH")]
    metrics_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Unknown flags and missing values exit here, before any work
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose, args.json) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Everything that can be checked offline is checked before the ledger is touched
    let config = load_config(&args.config)?;
    let wallets = RunWallets::from_env().context("Failed to load signing keys")?;
    let mode = RunMode::from_nonce_flag(args.nonce);
    let delay = SigningDelay::from_millis(args.delay_ms.unwrap_or(config.signing.delay_ms));

    let rpc: Arc<dyn LedgerRpc> =
        Arc::new(RpcLedger::new(&config.rpc).context("Failed to create RPC client")?);
    info!(
        endpoint = %rpc.endpoint(),
        mode = %mode,
        sender = %wallets.sender.pubkey(),
        nonce_authority = %wallets.nonce_authority.pubkey(),
        delay_ms = delay.duration_ms,
        "Starting offline signing run"
    );

    let ctx = RunContext::new(rpc, wallets.sender, wallets.nonce_authority, config)?;
    let metrics = ctx.metrics.clone();

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling run");
            cancel.cancel();
        }
    });

    let result = Pipeline::new(ctx, mode, delay).run().await;

    if let Some(path) = &args.metrics_out {
        if let Err(e) = metrics.write_to(path) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics");
        }
    }

    let report = result?;
    info!(
        run_id = %report.run_id,
        signature = %report.signature,
        nonce_account = ?report.nonce_account.map(|p| p.to_string()),
        unsigned = %report.unsigned_path.display(),
        signed = %report.signed_path.display(),
        "Transaction accepted"
    );
    println!("{}", report.signature);
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "offline_signer=debug,info"
    } else {
        "offline_signer=info,warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &std::path::Path) -> Result<Config> {
    Config::load(Some(path))
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
