//! stakeledger - dApps staking ledger indexer
//!
//! This library turns Astar block data into a staking ledger for one
//! dApps staking contract: per-staker balances, the contract total, an
//! append-only transaction log and native/EVM address mappings, all kept
//! in a persistent RocksDB store.

pub mod keys;
pub mod records;
pub mod store;
pub mod cli;

// Decoding and classification
pub mod abi;
pub mod classify;
pub mod era;
pub mod ss58;
pub mod types;

// Indexer modules
pub mod apply;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod source;

// Re-export the main types for convenience
pub use error::{DecodeError, ExtractError, MalformedPayloadError, PersistenceError};
pub use records::{ContractRecord, StakeAction, StakerRecord, TransactionRecord};
pub use store::{BatchWrite, LedgerStore, RocksLedgerStore};
