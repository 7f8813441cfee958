//! dApps staking indexer binary
//!
//! Replays exported Astar blocks into the staking ledger: stake balances
//! on the tracked contract, the contract total, staking transactions and
//! native/EVM address mappings.

use anyhow::{Context, Result};
use clap::Parser;
use stakeledger::config::IndexerConfig;
use stakeledger::indexer::Indexer;
use stakeledger::source::JsonLinesSource;
use stakeledger::store::RocksLedgerStore;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// dApps staking ledger indexer
#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Index dApps staking events into a local ledger")]
struct Args {
    /// Path to a JSON config file (defaults to the Astar settings)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the block export (one JSON block per line)
    #[arg(short, long)]
    blocks: PathBuf,

    /// Path to RocksDB database directory
    #[arg(short, long, default_value = "./ledger_db")]
    db_path: PathBuf,

    /// Blocks per batch, overrides the config file
    #[arg(long)]
    batch_size: Option<usize>,

    /// Keep polling the block export for new lines
    #[arg(short, long)]
    follow: bool,

    /// Seconds between polls in follow mode
    #[arg(long, default_value_t = 12)]
    poll_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => IndexerConfig::load(path)?,
        None => IndexerConfig::default(),
    };
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    config.validate()?;

    info!("Starting dApps staking indexer");
    info!("Blocks: {:?}", args.blocks);
    info!("Database: {:?}", args.db_path);
    info!(
        "Target contract {:?} ({}), base contract {:?}",
        config.target_contract, config.target_contract_name, config.base_contract
    );

    let store = RocksLedgerStore::open(&args.db_path)
        .with_context(|| format!("Failed to open database at {:?}", args.db_path))?;
    let mut source = JsonLinesSource::open(&args.blocks, config.batch_size, args.follow)?;
    let mut indexer = Indexer::new(store, config).context("Failed to create indexer")?;

    tokio::select! {
        result = indexer.run(&mut source, Duration::from_secs(args.poll_secs)) => {
            result.context("Indexer error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    info!("Indexer stopped");
    Ok(())
}
