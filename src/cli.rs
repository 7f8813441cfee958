//! CLI implementation for ledgerctl
//!
//! Provides a developer-friendly command-line interface for inspecting
//! the staking ledger. All commands output pretty JSON.

use crate::config::{address_hex, parse_address, IndexerConfig};
use crate::extract::normalize_account_id;
use crate::records::{ContractRecord, StakerRecord, TransactionRecord};
use crate::store::{LedgerStore, RocksLedgerStore};
use alloy_primitives::I256;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Staking ledger CLI tool
#[derive(Parser)]
#[command(name = "ledgerctl")]
#[command(about = "dApps staking ledger CLI tool")]
pub struct Cli {
    /// Path to the RocksDB database directory
    #[arg(short, long, default_value = "./ledger_db")]
    db_path: PathBuf,

    /// Path to the indexer config file (defaults to the Astar settings)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Get the last committed block height
    GetHead,
    /// Get a staker
    GetStaker {
        /// Hex public key (0x..) or SS58 address
        account: String,
    },
    /// List stakers mapped to an EVM address
    FindByEvm {
        /// EVM address (hex, with or without 0x prefix)
        address: String,
    },
    /// Get a contract row
    GetContract {
        /// Contract address, defaults to the tracked contract
        address: Option<String>,
    },
    /// Get a staking transaction
    GetTransaction {
        /// Event id
        id: String,
    },
    /// Compare the sum of staker balances with the contract total
    Audit,
}

fn staker_json(staker: &StakerRecord) -> Value {
    json!({
        "id": staker.id,
        "native_address": staker.native_address,
        "evm_address": staker.evm_address.as_ref().map(address_hex),
        "balance": staker.balance.to_string(),
    })
}

fn contract_json(contract: &ContractRecord) -> Value {
    json!({
        "id": address_hex(&contract.id),
        "name": contract.name,
        "total_staked": contract.total_staked.to_string(),
    })
}

fn transaction_json(tx: &TransactionRecord) -> Value {
    json!({
        "id": tx.id,
        "action": tx.action.as_str(),
        "user": tx.user,
        "timestamp": tx.timestamp,
        "block": tx.block,
        "transaction_hash": tx.transaction_hash,
        "amount": tx.amount.to_string(),
    })
}

/// Resolve a staker id from a hex public key or an SS58 address.
fn resolve_account(account: &str, config: &IndexerConfig) -> Result<String> {
    if account.starts_with("0x") {
        return Ok(normalize_account_id(account)?);
    }
    let public_key = config
        .codec()?
        .decode(account)
        .with_context(|| format!("Invalid account: {}", account))?;
    Ok(format!("0x{}", hex::encode(public_key)))
}

/// Execute one command against `store`.
pub fn execute(store: &dyn LedgerStore, config: &IndexerConfig, command: &Commands) -> Result<Value> {
    let result = match command {
        Commands::GetHead => match store.get_head()? {
            Some(block) => json!({ "head_block": block }),
            None => json!({ "head_block": null }),
        },
        Commands::GetStaker { account } => {
            let id = resolve_account(account, config)?;
            match store.get_staker(&id)? {
                Some(staker) => json!({ "id": id, "staker": staker_json(&staker) }),
                None => json!({ "id": id, "staker": null }),
            }
        }
        Commands::FindByEvm { address } => {
            let evm = parse_address(address)?;
            let ids = store.stakers_by_evm(evm)?;
            let stakers = store.find_stakers(&ids)?;
            json!({
                "evm_address": address_hex(&evm),
                "stakers": stakers.iter().map(staker_json).collect::<Vec<_>>(),
            })
        }
        Commands::GetContract { address } => {
            let addr = match address {
                Some(a) => parse_address(a)?,
                None => config.target_contract,
            };
            match store.get_contract(addr)? {
                Some(contract) => json!({ "contract": contract_json(&contract) }),
                None => json!({ "id": address_hex(&addr), "contract": null }),
            }
        }
        Commands::GetTransaction { id } => match store.get_transaction(id)? {
            Some(tx) => json!({ "transaction": transaction_json(&tx) }),
            None => json!({ "id": id, "transaction": null }),
        },
        Commands::Audit => {
            let stakers = store.all_stakers()?;
            let sum = stakers
                .iter()
                .fold(I256::ZERO, |acc, s| acc.saturating_add(s.balance));
            let negative = stakers.iter().filter(|s| s.balance.is_negative()).count();
            let mapped = stakers.iter().filter(|s| s.evm_address.is_some()).count();
            let total = store
                .get_contract(config.target_contract)?
                .map_or(I256::ZERO, |c| c.total_staked);
            json!({
                "head_block": store.get_head()?,
                "stakers": stakers.len(),
                "mapped_stakers": mapped,
                "negative_balances": negative,
                "sum_of_balances": sum.to_string(),
                "contracts": store.all_contracts()?.iter().map(contract_json).collect::<Vec<_>>(),
                "total_staked": total.to_string(),
                "consistent": sum == total,
            })
        }
    };
    Ok(result)
}

/// Run the CLI command and print JSON output.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => IndexerConfig::load(path)?,
        None => IndexerConfig::default(),
    };
    let store = RocksLedgerStore::open(&cli.db_path)
        .with_context(|| format!("Failed to open database at {:?}", cli.db_path))?;

    let result = execute(&store, &config, &cli.command)?;

    // Pretty print JSON
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::StakeAction;
    use crate::store::BatchWrite;
    use alloy_primitives::{address, U256};
    use tempfile::TempDir;

    const ALICE: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const ALICE_ASTAR: &str = "ajYMsCKsEAhEvHpeA4XqsfiA9v1CdzZPrCfS6pEfeGHW9j8";

    fn seeded_store() -> (RocksLedgerStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksLedgerStore::open(temp_dir.path()).unwrap();
        let config = IndexerConfig::default();

        let mut staker = StakerRecord::new(ALICE.to_string(), ALICE_ASTAR.to_string());
        staker.balance = I256::from_raw(U256::from(500u64));
        staker.evm_address = Some(address!("abcdabcdabcdabcdabcdabcdabcdabcdabcdabcd"));
        store
            .commit_batch(&BatchWrite {
                stakers: vec![staker],
                contract: Some(ContractRecord {
                    id: config.target_contract,
                    name: config.target_contract_name.clone(),
                    total_staked: I256::from_raw(U256::from(500u64)),
                }),
                transactions: vec![TransactionRecord {
                    id: "0000900000-000001-aaaaa".to_string(),
                    action: StakeAction::BondAndStake,
                    user: ALICE.to_string(),
                    timestamp: 1_660_000_000_000,
                    block: 900_000,
                    transaction_hash: "0xfeed".to_string(),
                    amount: U256::from(500u64),
                }],
                head: 900_000,
            })
            .unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_get_staker_by_id_or_ss58() {
        let (store, _dir) = seeded_store();
        let config = IndexerConfig::default();

        for account in [ALICE, ALICE_ASTAR] {
            let out = execute(
                &store,
                &config,
                &Commands::GetStaker {
                    account: account.to_string(),
                },
            )
            .unwrap();
            assert_eq!(out["staker"]["balance"], "500");
            assert_eq!(
                out["staker"]["evm_address"],
                "0xabcdabcdabcdabcdabcdabcdabcdabcdabcdabcd"
            );
        }
    }

    #[test]
    fn test_find_by_evm_and_transaction() {
        let (store, _dir) = seeded_store();
        let config = IndexerConfig::default();

        let out = execute(
            &store,
            &config,
            &Commands::FindByEvm {
                address: "0xABCDABCDABCDABCDABCDABCDABCDABCDABCDABCD".to_string(),
            },
        )
        .unwrap();
        assert_eq!(out["stakers"][0]["id"], ALICE);

        let out = execute(
            &store,
            &config,
            &Commands::GetTransaction {
                id: "0000900000-000001-aaaaa".to_string(),
            },
        )
        .unwrap();
        assert_eq!(out["transaction"]["action"], "DappsStaking.BondAndStake");
        assert_eq!(out["transaction"]["amount"], "500");
    }

    #[test]
    fn test_audit_reports_consistency() {
        let (store, _dir) = seeded_store();
        let out = execute(&store, &IndexerConfig::default(), &Commands::Audit).unwrap();
        assert_eq!(out["consistent"], true);
        assert_eq!(out["stakers"], 1);
        assert_eq!(out["mapped_stakers"], 1);
        assert_eq!(out["head_block"], 900_000);
    }

    #[test]
    fn test_missing_rows_are_null() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksLedgerStore::open(temp_dir.path()).unwrap();
        let config = IndexerConfig::default();

        let out = execute(&store, &config, &Commands::GetHead).unwrap();
        assert!(out["head_block"].is_null());
        let out = execute(&store, &config, &Commands::GetContract { address: None }).unwrap();
        assert!(out["contract"].is_null());
        assert!(execute(
            &store,
            &config,
            &Commands::GetStaker {
                account: "not-an-address".to_string()
            }
        )
        .is_err());
    }
}
