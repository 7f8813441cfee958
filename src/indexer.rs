//! Main indexer loop
//!
//! Orchestrates pulling block batches, classifying and extracting their
//! items, aggregating the resulting operations and committing each batch
//! to the ledger store in one atomic write.

use crate::apply::Aggregator;
use crate::classify::{Candidate, Classifier};
use crate::config::IndexerConfig;
use crate::error::{ExtractError, PersistenceError};
use crate::extract::{Extractor, MappingView, Operation};
use crate::source::BlockSource;
use crate::store::{LedgerStore, RocksLedgerStore};
use crate::types::Block;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Summary of one processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Blocks processed
    pub blocks: usize,
    /// Blocks ignored as below the start height or already committed
    pub skipped_blocks: usize,
    pub operations: usize,
    /// Items dropped on decode or payload errors
    pub dropped_items: usize,
    pub transactions: usize,
    pub stakers: usize,
    /// Committed head after the batch
    pub head: Option<u64>,
    pub already_applied: bool,
}

/// Indexer that turns block batches into ledger rows.
pub struct Indexer<S = RocksLedgerStore> {
    store: S,
    config: IndexerConfig,
    classifier: Classifier,
    extractor: Extractor,
    aggregator: Aggregator,
}

impl<S: LedgerStore> Indexer<S> {
    /// Create a new indexer over `store`.
    pub fn new(store: S, config: IndexerConfig) -> Result<Self> {
        config.validate().context("Invalid indexer configuration")?;
        Ok(Self {
            classifier: Classifier::new(&config)?,
            extractor: Extractor::new(&config)?,
            aggregator: Aggregator::new(&config)?,
            store,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Process one batch of blocks, given in height order.
    ///
    /// Blocks at or below the committed head are skipped. A failed commit
    /// is returned as a `PersistenceError`; nothing of the batch is stored.
    pub fn process_batch(&mut self, blocks: &[Block]) -> Result<BatchOutcome> {
        let head = self.store.get_head().context("Failed to get head block")?;
        let mut outcome = BatchOutcome {
            head,
            ..BatchOutcome::default()
        };

        let fresh: Vec<&Block> = blocks
            .iter()
            .filter(|b| {
                if b.height < self.config.start_block {
                    return false;
                }
                match head {
                    Some(h) if b.height <= h => {
                        warn!("Block {} already committed (head {}), skipping", b.height, h);
                        false
                    }
                    _ => true,
                }
            })
            .collect();
        outcome.skipped_blocks = blocks.len() - fresh.len();
        let Some(last) = fresh.last().map(|b| b.height) else {
            return Ok(outcome);
        };

        let mut view = MappingView::new();
        let mut ops: Vec<Operation> = Vec::new();
        for block in &fresh {
            debug!("Processing block {} ({} items)", block.height, block.items.len());
            for item in &block.items {
                let candidate = self.classifier.classify(block.height, item);
                if candidate == Candidate::Irrelevant {
                    continue;
                }
                debug!("Block {}: {:?}", block.height, candidate);
                match self.extractor.extract(block, &candidate, &self.store, &mut view) {
                    Ok(extracted) => ops.extend(extracted),
                    Err(ExtractError::Lookup(e)) => {
                        return Err(e.context(format!(
                            "Failed to resolve mappings in block {}",
                            block.height
                        )));
                    }
                    Err(e) => {
                        warn!("Dropping item in block {}: {}", block.height, e);
                        outcome.dropped_items += 1;
                    }
                }
            }
        }

        let update = self
            .aggregator
            .aggregate(&self.store, &ops)
            .with_context(|| format!("Failed to aggregate batch ending at block {}", last))?;

        outcome.blocks = fresh.len();
        outcome.operations = ops.len();
        outcome.transactions = update.transactions.len();
        outcome.stakers = update.stakers.len();
        outcome.already_applied = update.already_applied;

        let total = update.contract.as_ref().map(|c| c.total_staked);
        self.store
            .commit_batch(&update.into_batch(last))
            .map_err(|cause| {
                error!("Failed to commit batch ending at block {}: {:#}", last, cause);
                PersistenceError { head: last, cause }
            })?;
        outcome.head = Some(last);

        match total {
            Some(total) => info!(
                "Committed blocks up to {}: {} transactions, {} stakers, total staked {}",
                last, outcome.transactions, outcome.stakers, total
            ),
            None => info!(
                "Committed blocks up to {}: {} stakers touched",
                last, outcome.stakers
            ),
        }
        Ok(outcome)
    }

    /// Run the main indexer loop.
    ///
    /// Pulls batches until the source is exhausted, sleeping `poll`
    /// whenever it has nothing new.
    pub async fn run(&mut self, source: &mut dyn BlockSource, poll: Duration) -> Result<()> {
        info!(
            "Starting indexer at head {:?} for contract {:?}",
            self.store.get_head()?,
            self.config.target_contract
        );

        loop {
            let Some(blocks) = source.next_batch().context("Failed to read block batch")? else {
                info!("Block source exhausted");
                return Ok(());
            };

            if blocks.is_empty() {
                debug!("No new blocks, waiting {:?}", poll);
                tokio::time::sleep(poll).await;
                continue;
            }

            self.process_batch(&blocks)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ContractRecord, StakeAction, StakerRecord, TransactionRecord};
    use crate::source::MemorySource;
    use crate::store::BatchWrite;
    use crate::types::{BlockItem, ChainEvent, ExtrinsicRef};
    use alloy_primitives::{Address, I256, U256};
    use anyhow::anyhow;
    use serde_json::json;
    use tempfile::TempDir;

    const TARGET: &str = "0xd59fc6bfd9732ab19b03664a45dc29b8421bda9a";
    const OTHER: &str = "0x1111111111111111111111111111111111111111";
    const USER: &str = "0x0101010101010101010101010101010101010101010101010101010101010101";

    fn create_test_indexer() -> (Indexer, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksLedgerStore::open(temp_dir.path()).unwrap();
        let indexer = Indexer::new(store, IndexerConfig::default()).unwrap();
        (indexer, temp_dir)
    }

    /// Delegates reads to RocksDB but refuses every batch write.
    struct FailingStore {
        inner: RocksLedgerStore,
    }

    impl LedgerStore for FailingStore {
        fn get_staker(&self, id: &str) -> Result<Option<StakerRecord>> {
            self.inner.get_staker(id)
        }

        fn find_stakers(&self, ids: &[String]) -> Result<Vec<StakerRecord>> {
            self.inner.find_stakers(ids)
        }

        fn stakers_by_evm(&self, evm: Address) -> Result<Vec<String>> {
            self.inner.stakers_by_evm(evm)
        }

        fn get_contract(&self, id: Address) -> Result<Option<ContractRecord>> {
            self.inner.get_contract(id)
        }

        fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>> {
            self.inner.get_transaction(id)
        }

        fn existing_transactions(&self, ids: &[String]) -> Result<Vec<String>> {
            self.inner.existing_transactions(ids)
        }

        fn get_head(&self) -> Result<Option<u64>> {
            self.inner.get_head()
        }

        fn commit_batch(&self, _batch: &BatchWrite) -> Result<()> {
            Err(anyhow!("disk full"))
        }

        fn all_stakers(&self) -> Result<Vec<StakerRecord>> {
            self.inner.all_stakers()
        }

        fn all_contracts(&self) -> Result<Vec<ContractRecord>> {
            self.inner.all_contracts()
        }
    }

    fn amount(v: u64) -> I256 {
        I256::from_raw(U256::from(v))
    }

    fn stake(height: u64, index: u32, name: &str, contract: &str, value: u64) -> BlockItem {
        BlockItem::Event(ChainEvent {
            id: format!("{:010}-{:06}-abcde", height, index),
            name: name.to_string(),
            args: json!([USER, {"__kind": "Evm", "value": contract}, value.to_string()]),
            call: None,
            extrinsic: Some(ExtrinsicRef {
                hash: format!("0x{:064x}", height),
                index_in_block: index,
            }),
        })
    }

    fn block(height: u64, items: Vec<BlockItem>) -> Block {
        Block {
            height,
            timestamp: 1_660_000_000_000 + height,
            hash: None,
            items,
        }
    }

    #[test]
    fn test_bond_then_unbond() {
        let (mut indexer, _dir) = create_test_indexer();
        let outcome = indexer
            .process_batch(&[
                block(900_000, vec![stake(900_000, 1, "DappsStaking.BondAndStake", TARGET, 100)]),
                block(900_001, vec![stake(900_001, 1, "DappsStaking.UnbondAndUnstake", TARGET, 30)]),
            ])
            .unwrap();

        assert_eq!(outcome.blocks, 2);
        assert_eq!(outcome.transactions, 2);
        assert_eq!(outcome.head, Some(900_001));

        let staker = indexer.store().get_staker(USER).unwrap().unwrap();
        assert_eq!(staker.balance, amount(70));
        let tx = indexer
            .store()
            .get_transaction("0000900001-000001-abcde")
            .unwrap()
            .unwrap();
        assert_eq!(tx.action, StakeAction::UnbondAndUnstake);
        assert_eq!(tx.amount, U256::from(30u64));
    }

    #[test]
    fn test_irrelevant_and_malformed_items_are_dropped() {
        let (mut indexer, _dir) = create_test_indexer();
        let mut broken = stake(900_000, 2, "DappsStaking.BondAndStake", TARGET, 5);
        if let BlockItem::Event(ev) = &mut broken {
            ev.args[2] = json!("not a number");
        }
        let outcome = indexer
            .process_batch(&[block(
                900_000,
                vec![
                    stake(900_000, 1, "DappsStaking.BondAndStake", OTHER, 100),
                    broken,
                    stake(900_000, 3, "DappsStaking.BondAndStake", TARGET, 7),
                ],
            )])
            .unwrap();

        assert_eq!(outcome.dropped_items, 1);
        assert_eq!(outcome.operations, 1);
        let contract = indexer
            .store()
            .get_contract(indexer.config().target_contract)
            .unwrap()
            .unwrap();
        assert_eq!(contract.total_staked, amount(7));
    }

    #[test]
    fn test_redelivered_blocks_are_skipped() {
        let (mut indexer, _dir) = create_test_indexer();
        let batch = vec![block(
            900_000,
            vec![stake(900_000, 1, "DappsStaking.BondAndStake", TARGET, 500)],
        )];
        indexer.process_batch(&batch).unwrap();
        let again = indexer.process_batch(&batch).unwrap();

        assert_eq!(again.skipped_blocks, 1);
        assert_eq!(again.blocks, 0);
        let staker = indexer.store().get_staker(USER).unwrap().unwrap();
        assert_eq!(staker.balance, amount(500));
    }

    #[test]
    fn test_blocks_below_start_are_ignored() {
        let (mut indexer, _dir) = create_test_indexer();
        let outcome = indexer
            .process_batch(&[block(
                10,
                vec![stake(10, 1, "DappsStaking.BondAndStake", TARGET, 500)],
            )])
            .unwrap();
        assert_eq!(outcome.skipped_blocks, 1);
        assert_eq!(indexer.store().get_head().unwrap(), None);
    }

    #[test]
    fn test_empty_blocks_advance_head() {
        let (mut indexer, _dir) = create_test_indexer();
        indexer.process_batch(&[block(900_005, vec![])]).unwrap();
        assert_eq!(indexer.store().get_head().unwrap(), Some(900_005));
    }

    #[test]
    fn test_failed_commit_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let inner = RocksLedgerStore::open(temp_dir.path()).unwrap();
        let mut indexer = Indexer::new(FailingStore { inner }, IndexerConfig::default()).unwrap();

        let err = indexer
            .process_batch(&[block(
                900_000,
                vec![stake(900_000, 1, "DappsStaking.BondAndStake", TARGET, 100)],
            )])
            .unwrap_err();
        let persistence = err.downcast_ref::<PersistenceError>().unwrap();
        assert_eq!(persistence.head, 900_000);
        assert!(persistence.to_string().contains("disk full"));

        let store = indexer.store();
        assert_eq!(store.get_head().unwrap(), None);
        assert!(store.get_staker(USER).unwrap().is_none());
        assert!(store
            .get_contract(indexer.config().target_contract)
            .unwrap()
            .is_none());
        assert!(store
            .get_transaction("0000900000-000001-abcde")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_run_drains_source() {
        let (mut indexer, _dir) = create_test_indexer();
        let mut source = MemorySource::new(vec![
            vec![block(900_000, vec![stake(900_000, 1, "DappsStaking.BondAndStake", TARGET, 2)])],
            vec![],
            vec![block(900_001, vec![stake(900_001, 1, "DappsStaking.BondAndStake", TARGET, 3)])],
        ]);
        indexer
            .run(&mut source, Duration::from_millis(1))
            .await
            .unwrap();

        let staker = indexer.store().get_staker(USER).unwrap().unwrap();
        assert_eq!(staker.balance, amount(5));
        assert_eq!(indexer.store().get_head().unwrap(), Some(900_001));
    }
}
