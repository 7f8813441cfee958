//! Operation extraction
//!
//! Turns classified block items into normalized ledger operations:
//! signed stake deltas and native/EVM address mapping changes.

use crate::abi::{AstarBaseCalls, ContractInterface};
use crate::classify::{contract_arg, Candidate, StakeKind};
use crate::config::{parse_address, IndexerConfig};
use crate::error::{ExtractError, MalformedPayloadError};
use crate::records::StakeAction;
use crate::ss58::Ss58Codec;
use crate::store::LedgerStore;
use crate::types::{Block, ChainEvent};
use alloy_primitives::{Address, I256, U256};
use anyhow::Result;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Hex offset of the registered address in `0x`-prefixed log data.
const LOG_EVM_OFFSET: usize = 26;

/// Hex offset of the address argument in `0x`-prefixed call input.
const INPUT_EVM_OFFSET: usize = 34;

const ADDRESS_HEX_LEN: usize = 40;

/// One staking balance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeOp {
    /// Id of the originating event
    pub id: String,
    pub action: StakeAction,
    /// Staker id (hex public key)
    pub user: String,
    /// Unsigned amount moved
    pub amount: U256,
    /// Signed change applied to the staker and the contract
    pub amount_delta: I256,
    pub timestamp: u64,
    pub block: u64,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingAction {
    Map,
    Unmap,
}

/// One native/EVM address mapping change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOp {
    pub action: MappingAction,
    /// Staker id (hex public key)
    pub id: String,
    /// SS58 address, known for registrations
    pub native_address: Option<String>,
    pub evm_address: Address,
}

/// A normalized ledger operation, in chain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Stake(StakeOp),
    Mapping(MappingOp),
}

/// Mapping state as seen partway through a batch.
///
/// Overlays mapping changes already extracted from this batch on top of
/// the committed EVM index, so later unregisters in the same batch
/// resolve against them.
#[derive(Debug, Default)]
pub struct MappingView {
    pending: HashMap<String, Option<Address>>,
}

impl MappingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: &str, evm: Option<Address>) {
        self.pending.insert(id.to_string(), evm);
    }

    /// Stakers mapped to `evm`, sorted by id.
    pub fn stakers_by_evm(&self, store: &dyn LedgerStore, evm: Address) -> Result<Vec<String>> {
        let mut ids: BTreeSet<String> = store
            .stakers_by_evm(evm)?
            .into_iter()
            .filter(|id| match self.pending.get(id) {
                Some(current) => *current == Some(evm),
                None => true,
            })
            .collect();
        ids.extend(
            self.pending
                .iter()
                .filter(|(_, current)| **current == Some(evm))
                .map(|(id, _)| id.clone()),
        );
        Ok(ids.into_iter().collect())
    }
}

/// Converts candidates into operations.
#[derive(Debug, Clone)]
pub struct Extractor {
    target: Address,
    codec: Ss58Codec,
    interface: ContractInterface,
}

impl Extractor {
    pub fn new(config: &IndexerConfig) -> Result<Self> {
        Ok(Self {
            target: config.target_contract,
            codec: config.codec()?,
            interface: ContractInterface::astar_base(),
        })
    }

    /// Extract the operations of one candidate from `block`.
    ///
    /// `Irrelevant` yields nothing. Unregisters may yield one operation per
    /// staker mapped to the address, or none.
    pub fn extract(
        &self,
        block: &Block,
        candidate: &Candidate<'_>,
        store: &dyn LedgerStore,
        view: &mut MappingView,
    ) -> Result<Vec<Operation>, ExtractError> {
        match candidate {
            Candidate::Irrelevant => Ok(Vec::new()),
            Candidate::Stake { kind, event } => {
                Ok(vec![Operation::Stake(self.stake_op(block, *kind, event)?)])
            }
            Candidate::Register {
                call_input,
                log_data,
                ..
            } => {
                let op = self.register_op(call_input, *log_data)?;
                view.record(&op.id, Some(op.evm_address));
                Ok(vec![Operation::Mapping(op)])
            }
            Candidate::Unregister { input, .. } => {
                let evm = hex_address_at(input, INPUT_EVM_OFFSET)?;
                let ids = view
                    .stakers_by_evm(store, evm)
                    .map_err(ExtractError::Lookup)?;
                if ids.is_empty() {
                    debug!("Unregister of {:?} matches no mapped staker", evm);
                }
                let ops = ids
                    .into_iter()
                    .map(|id| {
                        view.record(&id, None);
                        Operation::Mapping(MappingOp {
                            action: MappingAction::Unmap,
                            id,
                            native_address: None,
                            evm_address: evm,
                        })
                    })
                    .collect();
                Ok(ops)
            }
        }
    }

    fn stake_op(
        &self,
        block: &Block,
        kind: StakeKind,
        event: &ChainEvent,
    ) -> Result<StakeOp, MalformedPayloadError> {
        let action = match kind {
            StakeKind::BondAndStake => StakeAction::BondAndStake,
            StakeKind::UnbondAndUnstake => StakeAction::UnbondAndUnstake,
            StakeKind::NominationTransfer => {
                if contract_arg(&event.args, 1) == Some(self.target) {
                    StakeAction::NominationTransferFromTarget
                } else {
                    StakeAction::NominationTransferToTarget
                }
            }
        };

        let user = event
            .args
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| MalformedPayloadError::MissingField(format!("{}/args/0", event.id)))?;
        let user = normalize_account_id(user)?;

        let amount = event
            .args
            .get(2)
            .ok_or_else(|| MalformedPayloadError::MissingField(format!("{}/args/2", event.id)))
            .and_then(parse_amount)?;
        let magnitude = signed_magnitude(amount)
            .ok_or_else(|| MalformedPayloadError::InvalidAmount(amount.to_string()))?;
        let amount_delta = if action.is_credit() {
            magnitude
        } else {
            -magnitude
        };

        let tx_hash = event
            .extrinsic
            .as_ref()
            .map(|e| e.hash.clone())
            .ok_or_else(|| MalformedPayloadError::MissingExtrinsic(event.id.clone()))?;

        Ok(StakeOp {
            id: event.id.clone(),
            action,
            user,
            amount,
            amount_delta,
            timestamp: block.timestamp,
            block: block.height,
            tx_hash,
        })
    }

    fn register_op(
        &self,
        call_input: &str,
        log_data: Option<&str>,
    ) -> Result<MappingOp, ExtractError> {
        let public_key = match self.interface.decode_function_call(call_input)? {
            AstarBaseCalls::register(call) => call.ss58PublicKey,
            _ => return Err(MalformedPayloadError::MissingField("ss58PublicKey".to_string()).into()),
        };
        let log_data =
            log_data.ok_or_else(|| MalformedPayloadError::MissingField("log data".to_string()))?;
        let evm_address = hex_address_at(log_data, LOG_EVM_OFFSET)?;

        Ok(MappingOp {
            action: MappingAction::Map,
            id: format!("0x{}", hex::encode(&public_key)),
            native_address: Some(self.codec.encode(&public_key)),
            evm_address,
        })
    }
}

/// Read a 40-hex-char address at `offset` of a `0x`-prefixed payload.
pub fn hex_address_at(payload: &str, offset: usize) -> Result<Address, MalformedPayloadError> {
    let digits = payload.strip_prefix("0x").unwrap_or(payload);
    let start = offset.saturating_sub(2);
    let slice = digits
        .get(start..start + ADDRESS_HEX_LEN)
        .ok_or(MalformedPayloadError::TooShort {
            offset,
            needed: ADDRESS_HEX_LEN,
            len: payload.len(),
        })?;
    parse_address(slice).map_err(|_| MalformedPayloadError::InvalidAddress(slice.to_string()))
}

/// Lowercase `0x` hex form of an account public key.
pub fn normalize_account_id(raw: &str) -> Result<String, MalformedPayloadError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(digits).map_err(|_| MalformedPayloadError::InvalidHex(raw.to_string()))?;
    if bytes.is_empty() {
        return Err(MalformedPayloadError::InvalidHex(raw.to_string()));
    }
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Parse an amount given as a decimal string, a 0x hex string or a number.
fn parse_amount(value: &Value) -> Result<U256, MalformedPayloadError> {
    let invalid = || MalformedPayloadError::InvalidAmount(value.to_string());
    match value {
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).map_err(|_| invalid()),
            None => U256::from_str_radix(s, 10).map_err(|_| invalid()),
        },
        Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn signed_magnitude(amount: U256) -> Option<I256> {
    (amount <= I256::MAX.into_raw()).then(|| I256::from_raw(amount))
}
