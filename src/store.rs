//! LedgerStore trait and RocksDB implementation
//!
//! Provides a persistent key-value store for the derived staking ledger.
//! Uses RocksDB with column families for efficient organization.
//! A batch of ledger changes is committed with a single `WriteBatch`,
//! so it lands completely or not at all.

use crate::keys::{
    decode_evm_index_key, encode_contract_key, encode_evm_index_key, encode_evm_index_prefix,
    encode_meta_key, encode_staker_key, encode_transaction_key, META_HEAD_BLOCK,
};
use crate::records::{ContractRecord, StakerRecord, TransactionRecord};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

const CF_STAKERS: &str = "stakers";
const CF_CONTRACTS: &str = "contracts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_EVM_INDEX: &str = "evm_index";
const CF_META: &str = "meta";

/// Everything one batch writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWrite {
    /// Touched stakers, full rows
    pub stakers: Vec<StakerRecord>,
    /// The tracked contract row, if any stake moved
    pub contract: Option<ContractRecord>,
    /// Newly created transactions
    pub transactions: Vec<TransactionRecord>,
    /// Height of the last block in the batch
    pub head: u64,
}

/// Trait defining the interface for ledger storage.
///
/// All methods return Results for proper error handling.
pub trait LedgerStore {
    /// Get a staker by id.
    fn get_staker(&self, id: &str) -> Result<Option<StakerRecord>>;

    /// Bulk-load the stakers that exist among `ids`.
    fn find_stakers(&self, ids: &[String]) -> Result<Vec<StakerRecord>>;

    /// Ids of stakers currently mapped to an EVM address.
    fn stakers_by_evm(&self, evm: Address) -> Result<Vec<String>>;

    /// Get a contract row by address.
    fn get_contract(&self, id: Address) -> Result<Option<ContractRecord>>;

    /// Get a transaction by event id.
    fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>>;

    /// The subset of `ids` that already have a transaction row.
    fn existing_transactions(&self, ids: &[String]) -> Result<Vec<String>>;

    /// Get the last committed block height.
    fn get_head(&self) -> Result<Option<u64>>;

    /// Upsert a batch atomically, together with the new head block.
    ///
    /// Existing transaction rows are never overwritten.
    fn commit_batch(&self, batch: &BatchWrite) -> Result<()>;

    /// Every staker row, in key order.
    fn all_stakers(&self) -> Result<Vec<StakerRecord>>;

    /// Every contract row, in key order.
    fn all_contracts(&self) -> Result<Vec<ContractRecord>>;
}

/// RocksDB-backed implementation of LedgerStore.
///
/// Uses column families to organize different types of data:
/// - stakers: staker rows
/// - contracts: contract aggregate rows
/// - transactions: immutable staking transactions
/// - evm_index: EVM address -> staker id index
/// - meta: metadata (head block)
pub struct RocksLedgerStore {
    db: DB,
}

impl RocksLedgerStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all required column families if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families = vec![
            ColumnFamilyDescriptor::new(CF_STAKERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_CONTRACTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_EVM_INDEX, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("Failed to open RocksDB database")?;

        Ok(Self { db })
    }

    /// Get a column family handle by name.
    fn get_cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("Column family '{}' not found", name))
    }

    fn scan<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.get_cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item.context("Failed to read iterator")?;
            let row = postcard::from_bytes(&value)
                .with_context(|| format!("Failed to deserialize {} row", cf_name))?;
            rows.push(row);
        }
        Ok(rows)
    }
}

impl LedgerStore for RocksLedgerStore {
    fn get_staker(&self, id: &str) -> Result<Option<StakerRecord>> {
        let cf = self.get_cf(CF_STAKERS)?;
        let key = encode_staker_key(id);
        match self.db.get_cf(cf, &key).context("Failed to get staker")? {
            Some(bytes) => {
                let record = postcard::from_bytes(&bytes)
                    .context("Failed to deserialize staker record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn find_stakers(&self, ids: &[String]) -> Result<Vec<StakerRecord>> {
        let cf = self.get_cf(CF_STAKERS)?;
        let keys: Vec<Vec<u8>> = ids.iter().map(|id| encode_staker_key(id)).collect();
        let mut stakers = Vec::new();
        for result in self.db.multi_get_cf(keys.iter().map(|k| (cf, k))) {
            if let Some(bytes) = result.context("Failed to get staker")? {
                let record: StakerRecord = postcard::from_bytes(&bytes)
                    .context("Failed to deserialize staker record")?;
                stakers.push(record);
            }
        }
        Ok(stakers)
    }

    fn stakers_by_evm(&self, evm: Address) -> Result<Vec<String>> {
        let cf = self.get_cf(CF_EVM_INDEX)?;
        let prefix = encode_evm_index_prefix(evm);
        let mut ids = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item.context("Failed to read iterator")?;
            if !key.starts_with(&prefix) {
                break;
            }
            let (_, id) = decode_evm_index_key(&key).context("Failed to decode EVM index key")?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn get_contract(&self, id: Address) -> Result<Option<ContractRecord>> {
        let cf = self.get_cf(CF_CONTRACTS)?;
        let key = encode_contract_key(id);
        match self.db.get_cf(cf, &key).context("Failed to get contract")? {
            Some(bytes) => {
                let record = postcard::from_bytes(&bytes)
                    .context("Failed to deserialize contract record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>> {
        let cf = self.get_cf(CF_TRANSACTIONS)?;
        let key = encode_transaction_key(id);
        match self.db.get_cf(cf, &key).context("Failed to get transaction")? {
            Some(bytes) => {
                let record = postcard::from_bytes(&bytes)
                    .context("Failed to deserialize transaction record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn existing_transactions(&self, ids: &[String]) -> Result<Vec<String>> {
        let cf = self.get_cf(CF_TRANSACTIONS)?;
        let keys: Vec<Vec<u8>> = ids.iter().map(|id| encode_transaction_key(id)).collect();
        let mut existing = Vec::new();
        for (id, result) in ids
            .iter()
            .zip(self.db.multi_get_cf(keys.iter().map(|k| (cf, k))))
        {
            if result.context("Failed to get transaction")?.is_some() {
                existing.push(id.clone());
            }
        }
        Ok(existing)
    }

    fn get_head(&self) -> Result<Option<u64>> {
        let cf = self.get_cf(CF_META)?;
        let key = encode_meta_key(META_HEAD_BLOCK);
        match self.db.get_cf(cf, &key).context("Failed to get head block")? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    anyhow::anyhow!("Head block must be 8 bytes (u64), got {}", bytes.len())
                })?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    fn commit_batch(&self, batch: &BatchWrite) -> Result<()> {
        let stakers_cf = self.get_cf(CF_STAKERS)?;
        let contracts_cf = self.get_cf(CF_CONTRACTS)?;
        let transactions_cf = self.get_cf(CF_TRANSACTIONS)?;
        let index_cf = self.get_cf(CF_EVM_INDEX)?;
        let meta_cf = self.get_cf(CF_META)?;

        let mut write = WriteBatch::default();

        // Keep the EVM index in step with the rows being replaced.
        let staker_ids: Vec<String> = batch.stakers.iter().map(|s| s.id.clone()).collect();
        let stored: HashMap<String, Option<Address>> = self
            .find_stakers(&staker_ids)?
            .into_iter()
            .map(|row| (row.id, row.evm_address))
            .collect();

        for staker in &batch.stakers {
            let previous = stored.get(&staker.id).copied().flatten();
            if previous != staker.evm_address {
                if let Some(old) = previous {
                    write.delete_cf(index_cf, encode_evm_index_key(old, &staker.id));
                }
                if let Some(new) = staker.evm_address {
                    write.put_cf(index_cf, encode_evm_index_key(new, &staker.id), b"");
                }
            }
            let value = postcard::to_allocvec(staker).context("Failed to serialize staker record")?;
            write.put_cf(stakers_cf, encode_staker_key(&staker.id), value);
        }

        if let Some(contract) = &batch.contract {
            let value =
                postcard::to_allocvec(contract).context("Failed to serialize contract record")?;
            write.put_cf(contracts_cf, encode_contract_key(contract.id), value);
        }

        let tx_ids: Vec<String> = batch.transactions.iter().map(|t| t.id.clone()).collect();
        let existing: BTreeSet<String> = self.existing_transactions(&tx_ids)?.into_iter().collect();
        for tx in &batch.transactions {
            if existing.contains(&tx.id) {
                continue;
            }
            let value = postcard::to_allocvec(tx).context("Failed to serialize transaction record")?;
            write.put_cf(transactions_cf, encode_transaction_key(&tx.id), value);
        }

        write.put_cf(meta_cf, encode_meta_key(META_HEAD_BLOCK), batch.head.to_be_bytes());

        self.db.write(write).context("Failed to write batch")?;
        Ok(())
    }

    fn all_stakers(&self) -> Result<Vec<StakerRecord>> {
        self.scan(CF_STAKERS)
    }

    fn all_contracts(&self) -> Result<Vec<ContractRecord>> {
        self.scan(CF_CONTRACTS)
    }
}
