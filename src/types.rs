//! Block data delivered by the chain data source
//!
//! Blocks arrive already decoded down to pallet events and calls, with
//! their arguments left as JSON. Argument layouts differ between format
//! eras, so they are resolved by the classifier rather than here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A block with its ordered items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block height
    pub height: u64,
    /// Block timestamp (Unix epoch milliseconds)
    pub timestamp: u64,
    /// Block hash, if the source provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Events and calls in block order
    #[serde(default)]
    pub items: Vec<BlockItem>,
}

/// One item of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BlockItem {
    Event(ChainEvent),
    Call(ChainCall),
}

/// A pallet event, e.g. `DappsStaking.BondAndStake` or `EVM.Log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    /// Globally unique event id
    pub id: String,
    /// `Pallet.Event` name
    pub name: String,
    #[serde(default)]
    pub args: Value,
    /// The call that emitted the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<ChainCall>,
    /// The extrinsic that contains the emitting call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrinsic: Option<ExtrinsicRef>,
}

/// A pallet call, e.g. `Ethereum.transact`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `Pallet.call` name
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrinsic: Option<ExtrinsicRef>,
}

/// Extrinsic that carried an event or call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtrinsicRef {
    pub hash: String,
    #[serde(default)]
    pub index_in_block: u32,
}

/// Read a string at a JSON pointer.
pub fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_block() {
        let raw = json!({
            "height": 900000,
            "timestamp": 1660000000000u64,
            "items": [
                {
                    "kind": "event",
                    "id": "0000900000-000001-aaaaa",
                    "name": "DappsStaking.BondAndStake",
                    "args": ["0x01", {"__kind": "Evm", "value": "0xd59f"}, "500"],
                    "extrinsic": {"hash": "0xabc", "indexInBlock": 2}
                },
                {
                    "kind": "call",
                    "name": "Ethereum.transact",
                    "args": {"transaction": {"input": "0x"}}
                }
            ]
        });

        let block: Block = serde_json::from_value(raw).unwrap();
        assert_eq!(block.height, 900000);
        assert_eq!(block.items.len(), 2);
        match &block.items[0] {
            BlockItem::Event(ev) => {
                assert_eq!(ev.name, "DappsStaking.BondAndStake");
                assert_eq!(str_at(&ev.args, "/1/value"), Some("0xd59f"));
                assert_eq!(ev.extrinsic.as_ref().unwrap().index_in_block, 2);
            }
            other => panic!("expected event, got {:?}", other),
        }
        match &block.items[1] {
            BlockItem::Call(call) => {
                assert_eq!(str_at(&call.args, "/transaction/input"), Some("0x"))
            }
            other => panic!("expected call, got {:?}", other),
        }
    }
}
