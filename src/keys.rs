//! Key encoding and decoding utilities
//!
//! All keys use a single-byte prefix followed by binary data.
//! This ensures deterministic, lexicographically ordered keys in RocksDB.

use alloy_primitives::Address;

/// Meta id of the last committed block height.
pub const META_HEAD_BLOCK: u8 = 0x01;

/// Encode a staker key.
///
/// Format: byte 'S' (0x53) + staker id (UTF-8)
pub fn encode_staker_key(id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + id.len());
    key.push(b'S');
    key.extend_from_slice(id.as_bytes());
    key
}

/// Encode a contract key.
///
/// Format: byte 'C' (0x43) + contract address (20 bytes)
/// Total length: 21 bytes
pub fn encode_contract_key(addr: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'C');
    key.extend_from_slice(addr.as_slice());
    key
}

/// Encode a transaction key.
///
/// Format: byte 'T' (0x54) + event id (UTF-8)
pub fn encode_transaction_key(event_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + event_id.len());
    key.push(b'T');
    key.extend_from_slice(event_id.as_bytes());
    key
}

/// Encode an EVM mapping index key.
///
/// Format: byte 'E' (0x45) + evm address (20 bytes) + staker id (UTF-8)
///
/// All stakers mapped to one EVM address share the 21-byte prefix.
pub fn encode_evm_index_key(evm: Address, staker_id: &str) -> Vec<u8> {
    let mut key = encode_evm_index_prefix(evm);
    key.extend_from_slice(staker_id.as_bytes());
    key
}

/// Prefix shared by all index entries of one EVM address.
pub fn encode_evm_index_prefix(evm: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'E');
    key.extend_from_slice(evm.as_slice());
    key
}

/// Decode an EVM mapping index key into (evm address, staker id).
pub fn decode_evm_index_key(key: &[u8]) -> Result<(Address, String), anyhow::Error> {
    if key.len() < 21 || key[0] != b'E' {
        anyhow::bail!("Invalid EVM index key");
    }
    let evm = Address::from_slice(&key[1..21]);
    let id = String::from_utf8(key[21..].to_vec())?;
    Ok((evm, id))
}

/// Encode a meta key.
///
/// Format: byte 'M' (0x4D) + meta_id (1 byte)
/// Total length: 2 bytes
///
/// Meta IDs:
/// - 0x01: head_block
pub fn encode_meta_key(meta_id: u8) -> Vec<u8> {
    vec![b'M', meta_id]
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_staker_key_encoding() {
        let key = encode_staker_key("0xabcd");
        assert_eq!(key[0], b'S');
        assert_eq!(&key[1..], b"0xabcd");
    }

    #[test]
    fn test_contract_key_encoding() {
        let addr = address!("d59fc6bfd9732ab19b03664a45dc29b8421bda9a");
        let key = encode_contract_key(addr);
        assert_eq!(key.len(), 21);
        assert_eq!(key[0], b'C');
        assert_eq!(&key[1..], addr.as_slice());
    }

    #[test]
    fn test_transaction_key_encoding() {
        let key = encode_transaction_key("0000900000-000001-aaaaa");
        assert_eq!(key[0], b'T');
        assert_eq!(&key[1..], b"0000900000-000001-aaaaa");
    }

    #[test]
    fn test_evm_index_key_roundtrip() {
        let evm = address!("00112233445566778899aabbccddeeff00112233");
        let key = encode_evm_index_key(evm, "0x11");
        assert!(key.starts_with(&encode_evm_index_prefix(evm)));

        let (decoded_evm, id) = decode_evm_index_key(&key).unwrap();
        assert_eq!(decoded_evm, evm);
        assert_eq!(id, "0x11");
        assert!(decode_evm_index_key(b"E12").is_err());
    }

    #[test]
    fn test_meta_key_encoding() {
        let key = encode_meta_key(META_HEAD_BLOCK);
        assert_eq!(key.len(), 2);
        assert_eq!(key[0], b'M');
        assert_eq!(key[1], 0x01);
    }
}
