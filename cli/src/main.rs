//! uho CLI — run and inspect the ingestion engine.
//!
//! Usage:
//! ```bash
//! UHO_RPC_URL=https://... UHO_DATABASE_URL=postgresql://... uho run
//! uho info
//! ```

use std::env;
use std::process;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use uho_ingest::{IngestConfig, Orchestrator};
use uho_rpc::{Commitment, HttpRpcClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "run" => cmd_run().await,
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("uho {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("uho {}", env!("CARGO_PKG_VERSION"));
    println!("IDL-driven Solana event indexer\n");
    println!("USAGE:");
    println!("    uho <COMMAND>\n");
    println!("COMMANDS:");
    println!("    run      Start the ingestion engine");
    println!("    info     Show configuration defaults and builtin programs");
    println!("    version  Print version");
    println!("    help     Print this help\n");
    println!("ENVIRONMENT (run):");
    println!("    UHO_RPC_URL            Solana JSON-RPC endpoint (required)");
    println!("    UHO_DATABASE_URL       Postgres connection URL (required)");
    println!("    UHO_COMMITMENT         processed | confirmed | finalized");
    println!("    UHO_BATCH_SIZE         signature page size");
    println!("    UHO_CYCLE_INTERVAL_MS  sleep between polling cycles");
}

fn cmd_info() {
    let defaults = IngestConfig::default();
    println!("uho v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default commitment: {}", defaults.commitment.as_str());
    println!("  Default batch size: {} signatures/poll", defaults.signature_batch_size);
    println!("  Default cycle interval: {} ms", defaults.cycle_interval_ms);
    println!("  Event channel: {}", defaults.event_channel);
    println!("  Control channel: {}", defaults.control_channel);
    println!("  Builtin programs:");
    for alias in ["token", "token-2022"] {
        if let Some(builtin) = uho_idl::resolve_builtin(alias) {
            println!("    {:16} {}", builtin.name, builtin.program_id);
        }
    }
}

fn config_from_env() -> anyhow::Result<IngestConfig> {
    let mut config = IngestConfig {
        rpc_url: env::var("UHO_RPC_URL").context("UHO_RPC_URL must be set")?,
        database_url: env::var("UHO_DATABASE_URL").context("UHO_DATABASE_URL must be set")?,
        ..Default::default()
    };
    if let Ok(commitment) = env::var("UHO_COMMITMENT") {
        config.commitment = Commitment::from_str(&commitment)
            .map_err(|e| anyhow::anyhow!("UHO_COMMITMENT: {e}"))?;
    }
    if let Ok(batch) = env::var("UHO_BATCH_SIZE") {
        config.signature_batch_size = batch.parse().context("UHO_BATCH_SIZE must be a number")?;
    }
    if let Ok(interval) = env::var("UHO_CYCLE_INTERVAL_MS") {
        config.cycle_interval_ms = interval
            .parse()
            .context("UHO_CYCLE_INTERVAL_MS must be a number")?;
    }
    Ok(config)
}

async fn cmd_run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config_from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let rpc = Arc::new(
        HttpRpcClient::default_for(config.rpc_url.clone())
            .map_err(|e| anyhow::anyhow!("failed to build RPC client: {e}"))?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut orchestrator = Orchestrator::new(config, pool, rpc, shutdown_rx)
        .context("failed to build orchestrator")?;
    orchestrator.run().await.context("orchestrator exited with error")?;
    Ok(())
}
