//! Contract payload decoding
//!
//! The registration contract's interface is declared with `sol!`; call
//! inputs and logs are decoded through the generated types in validating
//! mode, so non-canonical words (dirty address padding, bools other than
//! 0/1) are rejected.

use crate::error::DecodeError;
use alloy_primitives::B256;
use alloy_sol_types::{sol, SolCall, SolEvent, SolEventInterface, SolInterface};
use std::collections::HashMap;

sol! {
    /// Native/EVM address registration contract.
    #[derive(Debug, PartialEq, Eq)]
    interface AstarBase {
        event AstarBaseRegistered(address newEntry);
        event ContractVersion(uint256 newValue);
        event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);

        function getVersion() external;
        function initialize() external;
        function pause(bool _state) external;
        function register(bytes ss58PublicKey, bytes signedMsg) external;
        function renounceOwnership() external;
        function setBeneficiary(address _newBeneficiary) external;
        function setPrecompileAddresses(address dapps, address sr25529, address ecdsa) external;
        function setUnregisterFee(uint256 _newCost) external;
        function sudoUnRegister(address evmAddress) external;
        function transferOwnership(address newOwner) external;
        function unRegister() external payable;
        function withdraw() external payable;
    }
}

pub use AstarBase::{AstarBaseCalls, AstarBaseEvents};

pub const REGISTER_SELECTOR: [u8; 4] = AstarBase::registerCall::SELECTOR;
pub const UNREGISTER_SELECTOR: [u8; 4] = AstarBase::unRegisterCall::SELECTOR;
pub const SUDO_UNREGISTER_SELECTOR: [u8; 4] = AstarBase::sudoUnRegisterCall::SELECTOR;

/// Selector and topic lookup over the generated `AstarBase` types.
#[derive(Debug, Clone)]
pub struct ContractInterface {
    functions: HashMap<[u8; 4], &'static str>,
    events: HashMap<B256, &'static str>,
}

fn function<C: SolCall>() -> ([u8; 4], &'static str) {
    (C::SELECTOR, C::SIGNATURE)
}

fn event<E: SolEvent>() -> (B256, &'static str) {
    (E::SIGNATURE_HASH, E::SIGNATURE)
}

impl ContractInterface {
    /// Interface of the base (address registration) contract.
    pub fn astar_base() -> Self {
        use AstarBase::*;
        let functions = [
            function::<getVersionCall>(),
            function::<initializeCall>(),
            function::<pauseCall>(),
            function::<registerCall>(),
            function::<renounceOwnershipCall>(),
            function::<setBeneficiaryCall>(),
            function::<setPrecompileAddressesCall>(),
            function::<setUnregisterFeeCall>(),
            function::<sudoUnRegisterCall>(),
            function::<transferOwnershipCall>(),
            function::<unRegisterCall>(),
            function::<withdrawCall>(),
        ];
        let events = [
            event::<AstarBaseRegistered>(),
            event::<ContractVersion>(),
            event::<OwnershipTransferred>(),
        ];
        Self {
            functions: functions.into_iter().collect(),
            events: events.into_iter().collect(),
        }
    }

    /// Canonical signature of the function behind `selector`.
    pub fn function_signature(&self, selector: &[u8; 4]) -> Option<&'static str> {
        self.functions.get(selector).copied()
    }

    /// Canonical signature of the event behind `topic`.
    pub fn event_signature(&self, topic: &B256) -> Option<&'static str> {
        self.events.get(topic).copied()
    }

    /// Decode a selector-prefixed hex call input.
    pub fn decode_function_call(&self, input: &str) -> Result<AstarBaseCalls, DecodeError> {
        let bytes = decode_hex(input)?;
        let selector: [u8; 4] = bytes
            .get(..4)
            .and_then(|prefix| prefix.try_into().ok())
            .ok_or(DecodeError::Truncated {
                offset: 0,
                needed: 4,
                available: bytes.len(),
            })?;
        if self.function_signature(&selector).is_none() {
            return Err(DecodeError::UnknownSelector(hex::encode(selector)));
        }
        AstarBaseCalls::abi_decode(&bytes, true).map_err(layout_error)
    }

    /// Decode an event log from its topics and data.
    pub fn decode_event_log(&self, topics: &[B256], data: &[u8]) -> Result<AstarBaseEvents, DecodeError> {
        let topic0 = topics
            .first()
            .ok_or_else(|| DecodeError::UnknownTopic("<none>".to_string()))?;
        if self.event_signature(topic0).is_none() {
            return Err(DecodeError::UnknownTopic(format!("{:?}", topic0)));
        }
        AstarBaseEvents::decode_raw_log(topics, data, true).map_err(layout_error)
    }
}

fn layout_error(err: alloy_sol_types::Error) -> DecodeError {
    DecodeError::Layout(err.to_string())
}

/// Whether a hex call input starts with exactly this 4-byte selector.
pub fn has_selector(input: &str, selector: &[u8; 4]) -> bool {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    match digits.get(..8).map(hex::decode) {
        Some(Ok(prefix)) => prefix.as_slice() == selector,
        _ => false,
    }
}

/// Decode a 0x-prefixed (or bare) hex string.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, DecodeError> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(digits).map_err(|e| DecodeError::InvalidHex(e.to_string()))
}
