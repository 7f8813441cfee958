//! Ledger record types
//!
//! These structs represent the rows persisted in the ledger store.
//! They use postcard for binary serialization, which is compact and deterministic.

use alloy_primitives::{Address, I256, U256};
use serde::{Deserialize, Serialize};

/// Kind of a recorded staking operation.
///
/// Nomination transfers are split by direction relative to the tracked
/// contract so they can be applied with opposite signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakeAction {
    BondAndStake,
    UnbondAndUnstake,
    NominationTransferToTarget,
    NominationTransferFromTarget,
}

impl StakeAction {
    /// Stable label stored with each transaction.
    pub fn as_str(&self) -> &'static str {
        match self {
            StakeAction::BondAndStake => "DappsStaking.BondAndStake",
            StakeAction::UnbondAndUnstake => "DappsStaking.UnbondAndUnstake",
            StakeAction::NominationTransferToTarget => "DappsStaking.NominationTransfer_toTarget",
            StakeAction::NominationTransferFromTarget => {
                "DappsStaking.NominationTransfer_fromTarget"
            }
        }
    }

    /// Whether the operation adds stake to the tracked contract.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            StakeAction::BondAndStake | StakeAction::NominationTransferToTarget
        )
    }
}

/// A staking participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerRecord {
    /// Hex public key of the native account
    pub id: String,
    /// SS58 form of the account
    pub native_address: String,
    /// Linked EVM address while a mapping is active
    pub evm_address: Option<Address>,
    /// Current stake on the tracked contract
    #[serde(with = "signed")]
    pub balance: I256,
}

impl StakerRecord {
    pub fn new(id: String, native_address: String) -> Self {
        Self {
            id,
            native_address,
            evm_address: None,
            balance: I256::ZERO,
        }
    }
}

/// Aggregate row for the tracked staking contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: Address,
    pub name: String,
    /// Sum of all staker balances on this contract
    #[serde(with = "signed")]
    pub total_staked: I256,
}

/// Immutable audit row for one staking event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Id of the originating event
    pub id: String,
    pub action: StakeAction,
    /// Staker id
    pub user: String,
    /// Block timestamp (Unix epoch milliseconds)
    pub timestamp: u64,
    pub block: u64,
    pub transaction_hash: String,
    /// Unsigned magnitude of the balance change
    pub amount: U256,
}

/// Serde adapter storing an `I256` as its two's-complement raw value.
pub mod signed {
    use alloy_primitives::{I256, U256};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &I256, serializer: S) -> Result<S::Ok, S::Error> {
        value.into_raw().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<I256, D::Error> {
        U256::deserialize(deserializer).map(I256::from_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_balance_survives_encoding() {
        let mut staker = StakerRecord::new("0x01".to_string(), "addr".to_string());
        staker.balance = I256::ZERO - I256::from_raw(U256::from(30u64));

        let bytes = postcard::to_allocvec(&staker).unwrap();
        let decoded: StakerRecord = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, staker);
        assert!(decoded.balance.is_negative());
    }

    #[test]
    fn test_action_direction() {
        assert!(StakeAction::BondAndStake.is_credit());
        assert!(StakeAction::NominationTransferToTarget.is_credit());
        assert!(!StakeAction::UnbondAndUnstake.is_credit());
        assert!(!StakeAction::NominationTransferFromTarget.is_credit());
        assert_eq!(
            StakeAction::NominationTransferFromTarget.as_str(),
            "DappsStaking.NominationTransfer_fromTarget"
        );
    }
}
