//! ledgerctl - dApps staking ledger CLI tool
//!
//! A developer-friendly command-line interface for inspecting the staking
//! ledger built by the indexer.

use stakeledger::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
