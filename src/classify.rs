//! Block item classification
//!
//! Decides whether a block item concerns the tracked staking contract or
//! the address registration contract. Anything else is `Irrelevant` and
//! silently dropped.

use crate::abi::{has_selector, REGISTER_SELECTOR, SUDO_UNREGISTER_SELECTOR, UNREGISTER_SELECTOR};
use crate::config::{parse_address, IndexerConfig};
use crate::era::{EraSchedule, FormatEra};
use crate::types::{str_at, BlockItem, ChainCall, ChainEvent};
use alloy_primitives::Address;
use anyhow::Result;
use serde_json::Value;

pub const BOND_AND_STAKE: &str = "DappsStaking.BondAndStake";
pub const UNBOND_AND_UNSTAKE: &str = "DappsStaking.UnbondAndUnstake";
pub const NOMINATION_TRANSFER: &str = "DappsStaking.NominationTransfer";
pub const EVM_LOG: &str = "EVM.Log";
pub const ETHEREUM_TRANSACT: &str = "Ethereum.transact";

/// Staking event kinds before direction is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeKind {
    BondAndStake,
    UnbondAndUnstake,
    NominationTransfer,
}

/// Which unregister entry point a transaction called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnregisterKind {
    UnRegister,
    SudoUnRegister,
}

/// Classification of one block item.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate<'a> {
    Irrelevant,
    Stake {
        kind: StakeKind,
        event: &'a ChainEvent,
    },
    Register {
        event: &'a ChainEvent,
        /// Input of the `register` call that emitted the log
        call_input: &'a str,
        /// Data of the registration log
        log_data: Option<&'a str>,
    },
    Unregister {
        kind: UnregisterKind,
        call: &'a ChainCall,
        input: &'a str,
    },
}

/// Classifies block items against the configured contracts.
#[derive(Debug, Clone)]
pub struct Classifier {
    target: Address,
    base: Address,
    eras: EraSchedule,
}

impl Classifier {
    pub fn new(config: &IndexerConfig) -> Result<Self> {
        Ok(Self {
            target: config.target_contract,
            base: config.base_contract,
            eras: config.eras()?,
        })
    }

    pub fn target(&self) -> Address {
        self.target
    }

    /// Classify one item of the block at `height`.
    pub fn classify<'a>(&self, height: u64, item: &'a BlockItem) -> Candidate<'a> {
        let era = self.eras.resolve(height);
        match item {
            BlockItem::Event(event) => match event.name.as_str() {
                BOND_AND_STAKE => self.direct_stake(StakeKind::BondAndStake, event),
                UNBOND_AND_UNSTAKE => self.direct_stake(StakeKind::UnbondAndUnstake, event),
                NOMINATION_TRANSFER => self.nomination_transfer(event),
                EVM_LOG => self.registration(era, event),
                _ => Candidate::Irrelevant,
            },
            BlockItem::Call(call) if call.name == ETHEREUM_TRANSACT => self.unregistration(era, call),
            BlockItem::Call(_) => Candidate::Irrelevant,
        }
    }

    fn direct_stake<'a>(&self, kind: StakeKind, event: &'a ChainEvent) -> Candidate<'a> {
        if contract_arg(&event.args, 1) == Some(self.target) {
            Candidate::Stake { kind, event }
        } else {
            Candidate::Irrelevant
        }
    }

    fn nomination_transfer<'a>(&self, event: &'a ChainEvent) -> Candidate<'a> {
        let (Some(from), Some(to)) = (contract_arg(&event.args, 1), contract_arg(&event.args, 3))
        else {
            return Candidate::Irrelevant;
        };
        if from != to && (from == self.target || to == self.target) {
            Candidate::Stake {
                kind: StakeKind::NominationTransfer,
                event,
            }
        } else {
            Candidate::Irrelevant
        }
    }

    fn registration<'a>(&self, era: FormatEra, event: &'a ChainEvent) -> Candidate<'a> {
        let emitter = str_at(&event.args, era.log_address_path()).and_then(|s| parse_address(s).ok());
        if emitter != Some(self.base) {
            return Candidate::Irrelevant;
        }
        let Some(call_input) = event
            .call
            .as_ref()
            .and_then(|call| str_at(&call.args, era.tx_input_path()))
        else {
            return Candidate::Irrelevant;
        };
        if !has_selector(call_input, &REGISTER_SELECTOR) {
            return Candidate::Irrelevant;
        }
        Candidate::Register {
            event,
            call_input,
            log_data: str_at(&event.args, era.log_data_path()),
        }
    }

    fn unregistration<'a>(&self, era: FormatEra, call: &'a ChainCall) -> Candidate<'a> {
        // Source filters may already restrict calls to the base contract.
        if let Some(to) = str_at(&call.args, era.tx_target_path()) {
            if parse_address(to).ok() != Some(self.base) {
                return Candidate::Irrelevant;
            }
        }
        let Some(input) = str_at(&call.args, era.tx_input_path()) else {
            return Candidate::Irrelevant;
        };
        let kind = if has_selector(input, &UNREGISTER_SELECTOR) {
            UnregisterKind::UnRegister
        } else if has_selector(input, &SUDO_UNREGISTER_SELECTOR) {
            UnregisterKind::SudoUnRegister
        } else {
            return Candidate::Irrelevant;
        };
        Candidate::Unregister { kind, call, input }
    }
}

/// Read a smart-contract argument, either `{"__kind": "Evm", "value": ..}`
/// or a bare address string.
pub fn contract_arg(args: &Value, index: usize) -> Option<Address> {
    let arg = args.get(index)?;
    let raw = match arg {
        Value::String(s) => s.as_str(),
        Value::Object(_) => arg.get("value")?.as_str()?,
        _ => return None,
    };
    parse_address(raw).ok()
}
