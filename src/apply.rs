//! Ledger aggregation
//!
//! Replays one batch of extracted operations against the stored ledger:
//! stake deltas first, in chain order, then address mapping changes.
//! The result is the set of rows the batch touches, ready to be committed
//! in a single write.

use crate::cache::BatchCache;
use crate::config::IndexerConfig;
use crate::extract::{MappingAction, MappingOp, Operation, StakeOp};
use crate::records::{ContractRecord, StakerRecord, TransactionRecord};
use crate::ss58::Ss58Codec;
use crate::store::{BatchWrite, LedgerStore};
use alloy_primitives::{Address, I256};
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Rows produced by aggregating one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub stakers: Vec<StakerRecord>,
    pub contract: Option<ContractRecord>,
    pub transactions: Vec<TransactionRecord>,
    /// Sum of the stake deltas applied to the contract
    pub applied_delta: I256,
    /// The batch's transactions were found in the store already
    pub already_applied: bool,
}

impl LedgerUpdate {
    pub fn is_empty(&self) -> bool {
        self.stakers.is_empty() && self.contract.is_none() && self.transactions.is_empty()
    }

    /// Store write for this update, ending at block `head`.
    pub fn into_batch(self, head: u64) -> BatchWrite {
        BatchWrite {
            stakers: self.stakers,
            contract: self.contract,
            transactions: self.transactions,
            head,
        }
    }
}

/// Applies batches of operations to the target contract's ledger.
#[derive(Debug, Clone)]
pub struct Aggregator {
    target: Address,
    target_name: String,
    codec: Ss58Codec,
}

impl Aggregator {
    pub fn new(config: &IndexerConfig) -> Result<Self> {
        Ok(Self {
            target: config.target_contract,
            target_name: config.target_contract_name.clone(),
            codec: config.codec()?,
        })
    }

    /// Aggregate `ops`, given in chain order.
    ///
    /// If any stake operation's transaction is already stored the whole
    /// batch is treated as applied and an empty update is returned.
    pub fn aggregate(&self, store: &dyn LedgerStore, ops: &[Operation]) -> Result<LedgerUpdate> {
        let mut stakes = Vec::new();
        let mut mappings = Vec::new();
        for op in ops {
            match op {
                Operation::Stake(s) => stakes.push(s),
                Operation::Mapping(m) => mappings.push(m),
            }
        }

        let tx_ids: Vec<String> = stakes.iter().map(|s| s.id.clone()).collect();
        let existing = store
            .existing_transactions(&tx_ids)
            .context("Failed to check for applied transactions")?;
        if let Some(first) = existing.first() {
            warn!(
                "Batch already applied ({} of {} transactions stored, first {}), skipping",
                existing.len(),
                tx_ids.len(),
                first
            );
            return Ok(LedgerUpdate {
                already_applied: true,
                ..LedgerUpdate::default()
            });
        }

        let ids: Vec<String> = stakes
            .iter()
            .map(|s| s.user.clone())
            .chain(mappings.iter().map(|m| m.id.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut cache = BatchCache::load(store, &ids, self.target)?;
        let total_before = cache.contract().map_or(I256::ZERO, |c| c.total_staked);

        let mut transactions = Vec::with_capacity(stakes.len());
        let mut seen = HashSet::new();
        let mut applied_delta = I256::ZERO;
        for op in stakes {
            if !seen.insert(op.id.as_str()) {
                warn!("Duplicate staking event {} in batch, ignoring", op.id);
                continue;
            }
            self.apply_stake(&mut cache, op)?;
            applied_delta = applied_delta.saturating_add(op.amount_delta);
            transactions.push(TransactionRecord {
                id: op.id.clone(),
                action: op.action,
                user: op.user.clone(),
                timestamp: op.timestamp,
                block: op.block,
                transaction_hash: op.tx_hash.clone(),
                amount: op.amount,
            });
        }

        for op in mappings {
            self.apply_mapping(&mut cache, op)?;
        }

        let total_after = cache.contract().map_or(I256::ZERO, |c| c.total_staked);
        if total_after.saturating_sub(total_before) != applied_delta {
            warn!(
                "Contract total moved {} -> {} but batch deltas sum to {}",
                total_before, total_after, applied_delta
            );
        }

        let (stakers, contract) = cache.into_touched();
        Ok(LedgerUpdate {
            stakers,
            contract,
            transactions,
            applied_delta,
            already_applied: false,
        })
    }

    fn apply_stake(&self, cache: &mut BatchCache, op: &StakeOp) -> Result<()> {
        let native = match cache.staker(&op.user) {
            Some(_) => None,
            None => Some(self.native_address(&op.user)?),
        };
        let staker = cache.staker_mut_or_insert_with(&op.user, || {
            StakerRecord::new(op.user.clone(), native.unwrap_or_default())
        });
        let before = staker.balance;
        staker.balance = staker.balance.saturating_add(op.amount_delta);
        if staker.balance.is_negative() {
            warn!("Staker {} balance went negative ({})", staker.id, staker.balance);
        }
        debug!(
            "{} {}: staker {} balance {} -> {}",
            op.action.as_str(),
            op.id,
            staker.id,
            before,
            staker.balance
        );

        let contract = cache.contract_mut_or_insert_with(|| ContractRecord {
            id: self.target,
            name: self.target_name.clone(),
            total_staked: I256::ZERO,
        });
        contract.total_staked = contract.total_staked.saturating_add(op.amount_delta);
        Ok(())
    }

    fn apply_mapping(&self, cache: &mut BatchCache, op: &MappingOp) -> Result<()> {
        match op.action {
            MappingAction::Map => {
                let native = match (&op.native_address, cache.staker(&op.id)) {
                    (Some(native), None) => native.clone(),
                    (None, None) => self.native_address(&op.id)?,
                    (_, Some(_)) => String::new(),
                };
                let staker = cache
                    .staker_mut_or_insert_with(&op.id, || StakerRecord::new(op.id.clone(), native));
                debug!("Map {} -> {:?}", staker.id, op.evm_address);
                staker.evm_address = Some(op.evm_address);
            }
            MappingAction::Unmap => match cache.staker_mut(&op.id) {
                Some(staker) => {
                    debug!("Unmap {} (was {:?})", staker.id, staker.evm_address);
                    staker.evm_address = None;
                }
                None => debug!("Unmap of unknown staker {}, ignoring", op.id),
            },
        }
        Ok(())
    }

    /// SS58 address of a hex staker id.
    fn native_address(&self, id: &str) -> Result<String> {
        let digits = id.strip_prefix("0x").unwrap_or(id);
        let public_key =
            hex::decode(digits).with_context(|| format!("Invalid staker id: {}", id))?;
        Ok(self.codec.encode(&public_key))
    }
}
