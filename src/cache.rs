//! Per-batch lookup tables
//!
//! Holds the staker and contract rows loaded for one batch together with
//! the rows the batch creates. A fresh cache is built for every batch and
//! dropped once its rows are handed to the persister.

use crate::records::{ContractRecord, StakerRecord};
use crate::store::LedgerStore;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};

/// Rows of one batch, keyed by id.
pub struct BatchCache {
    stakers: HashMap<String, StakerRecord>,
    /// Ids in order of first modification
    touched: Vec<String>,
    touched_ids: HashSet<String>,
    contract: Option<ContractRecord>,
    contract_touched: bool,
}

impl BatchCache {
    /// Load the rows a batch refers to: one staker lookup for all `ids`
    /// and one contract lookup.
    pub fn load(store: &dyn LedgerStore, ids: &[String], contract: Address) -> Result<Self> {
        let stakers = store
            .find_stakers(ids)
            .context("Failed to load batch stakers")?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        let contract = store
            .get_contract(contract)
            .context("Failed to load target contract")?;
        Ok(Self {
            stakers,
            touched: Vec::new(),
            touched_ids: HashSet::new(),
            contract,
            contract_touched: false,
        })
    }

    pub fn staker(&self, id: &str) -> Option<&StakerRecord> {
        self.stakers.get(id)
    }

    pub fn contract(&self) -> Option<&ContractRecord> {
        self.contract.as_ref()
    }

    fn touch(&mut self, id: &str) {
        if self.touched_ids.insert(id.to_string()) {
            self.touched.push(id.to_string());
        }
    }

    /// Existing staker row for modification.
    pub fn staker_mut(&mut self, id: &str) -> Option<&mut StakerRecord> {
        if !self.stakers.contains_key(id) {
            return None;
        }
        self.touch(id);
        self.stakers.get_mut(id)
    }

    /// Staker row for modification, created with `make` if absent.
    pub fn staker_mut_or_insert_with(
        &mut self,
        id: &str,
        make: impl FnOnce() -> StakerRecord,
    ) -> &mut StakerRecord {
        self.touch(id);
        self.stakers.entry(id.to_string()).or_insert_with(make)
    }

    /// Contract row for modification, created with `make` if absent.
    pub fn contract_mut_or_insert_with(
        &mut self,
        make: impl FnOnce() -> ContractRecord,
    ) -> &mut ContractRecord {
        self.contract_touched = true;
        self.contract.get_or_insert_with(make)
    }

    /// Modified rows: stakers in order of first touch, then the contract.
    pub fn into_touched(mut self) -> (Vec<StakerRecord>, Option<ContractRecord>) {
        let stakers = self
            .touched
            .iter()
            .filter_map(|id| self.stakers.remove(id))
            .collect();
        let contract = if self.contract_touched {
            self.contract
        } else {
            None
        };
        (stakers, contract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BatchWrite, RocksLedgerStore};
    use alloy_primitives::{address, I256, U256};
    use tempfile::TempDir;

    #[test]
    fn test_cache_tracks_touched_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksLedgerStore::open(temp_dir.path()).unwrap();
        let target = address!("d59fc6bfd9732ab19b03664a45dc29b8421bda9a");

        let mut existing = StakerRecord::new("0x01".to_string(), "a".to_string());
        existing.balance = I256::from_raw(U256::from(7u64));
        let untouched = StakerRecord::new("0x02".to_string(), "b".to_string());
        store
            .commit_batch(&BatchWrite {
                stakers: vec![existing.clone(), untouched],
                head: 1,
                ..BatchWrite::default()
            })
            .unwrap();

        let ids = vec!["0x01".to_string(), "0x02".to_string(), "0x03".to_string()];
        let mut cache = BatchCache::load(&store, &ids, target).unwrap();
        assert_eq!(cache.staker("0x01"), Some(&existing));
        assert!(cache.staker("0x03").is_none());
        assert!(cache.contract().is_none());

        cache
            .staker_mut_or_insert_with("0x03", || StakerRecord::new("0x03".to_string(), "c".to_string()))
            .balance = I256::from_raw(U256::from(1u64));
        cache.staker_mut_or_insert_with("0x01", || unreachable!());
        cache.staker_mut_or_insert_with("0x03", || unreachable!());

        let (stakers, contract) = cache.into_touched();
        let ids: Vec<_> = stakers.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["0x03", "0x01"]);
        assert!(contract.is_none());
    }

    #[test]
    fn test_repeated_touches_keep_first_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksLedgerStore::open(temp_dir.path()).unwrap();
        let target = address!("d59fc6bfd9732ab19b03664a45dc29b8421bda9a");

        let mut cache = BatchCache::load(&store, &[], target).unwrap();
        let ids: Vec<String> = (0..500).map(|i| format!("0x{:04x}", i)).collect();
        for round in 0..3u64 {
            for id in ids.iter().rev() {
                cache
                    .staker_mut_or_insert_with(id, || StakerRecord::new(id.clone(), "n".to_string()))
                    .balance = I256::from_raw(U256::from(round));
            }
        }
        assert!(cache.staker_mut("0xffff").is_none());
        cache.staker_mut("0x0000").unwrap().balance = I256::from_raw(U256::from(9u64));

        let (stakers, _) = cache.into_touched();
        assert_eq!(stakers.len(), 500);
        assert_eq!(stakers[0].id, "0x01f3");
        assert_eq!(stakers[499].id, "0x0000");
        assert_eq!(stakers[499].balance, I256::from_raw(U256::from(9u64)));
        assert_eq!(stakers[0].balance, I256::from_raw(U256::from(2u64)));
    }

    #[test]
    fn test_contract_created_on_demand() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksLedgerStore::open(temp_dir.path()).unwrap();
        let target = address!("d59fc6bfd9732ab19b03664a45dc29b8421bda9a");

        let mut cache = BatchCache::load(&store, &[], target).unwrap();
        cache
            .contract_mut_or_insert_with(|| ContractRecord {
                id: target,
                name: "Astar Degens".to_string(),
                total_staked: I256::ZERO,
            })
            .total_staked = I256::from_raw(U256::from(3u64));

        let (_, contract) = cache.into_touched();
        assert_eq!(contract.unwrap().total_staked, I256::from_raw(U256::from(3u64)));
    }
}
