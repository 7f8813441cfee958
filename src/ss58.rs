//! SS58 native address codec
//!
//! Format: base58(prefix ++ public key ++ checksum), where the checksum is
//! the first two bytes of blake2b-512("SS58PRE" ++ prefix ++ public key).

use anyhow::{Context, Result};
use blake2::{Blake2b512, Digest};

const CHECKSUM_PREAMBLE: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;

/// Address codec for one network prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ss58Codec {
    prefix: u16,
}

impl Ss58Codec {
    /// Create a codec for a raw network prefix (0..16384).
    pub fn new(prefix: u16) -> Result<Self> {
        if prefix >= 16384 {
            anyhow::bail!("SS58 prefix must be below 16384, got {}", prefix);
        }
        Ok(Self { prefix })
    }

    /// Resolve a codec from a network name or a numeric prefix.
    pub fn from_network(network: &str) -> Result<Self> {
        let prefix = match network.to_ascii_lowercase().as_str() {
            "polkadot" => 0,
            "kusama" => 2,
            "astar" | "shiden" | "shibuya" => 5,
            "substrate" | "generic" => 42,
            other => other
                .parse::<u16>()
                .with_context(|| format!("Unknown SS58 network: {}", network))?,
        };
        Self::new(prefix)
    }

    pub fn prefix(&self) -> u16 {
        self.prefix
    }

    fn prefix_bytes(&self) -> Vec<u8> {
        if self.prefix < 64 {
            vec![self.prefix as u8]
        } else {
            let p = self.prefix;
            vec![
                (((p & 0b0000_0000_1111_1100) >> 2) as u8) | 0b0100_0000,
                ((p >> 8) as u8) | (((p & 0b11) as u8) << 6),
            ]
        }
    }

    /// Encode a public key as an SS58 address.
    pub fn encode(&self, public_key: &[u8]) -> String {
        let mut body = self.prefix_bytes();
        body.extend_from_slice(public_key);
        let hash = checksum(&body);
        body.extend_from_slice(&hash[..CHECKSUM_LEN]);
        bs58::encode(body).into_string()
    }

    /// Decode an SS58 address back to its 32-byte public key.
    ///
    /// Fails on a bad checksum or a different network prefix.
    pub fn decode(&self, address: &str) -> Result<Vec<u8>> {
        let raw = bs58::decode(address)
            .into_vec()
            .with_context(|| format!("Invalid base58 address: {}", address))?;
        let prefix = self.prefix_bytes();
        if raw.len() != prefix.len() + 32 + CHECKSUM_LEN {
            anyhow::bail!("Unexpected SS58 address length {} for {}", raw.len(), address);
        }
        if raw[..prefix.len()] != prefix[..] {
            anyhow::bail!("Address {} is not for network prefix {}", address, self.prefix);
        }
        let (body, check) = raw.split_at(raw.len() - CHECKSUM_LEN);
        if checksum(body)[..CHECKSUM_LEN] != check[..] {
            anyhow::bail!("Bad SS58 checksum for {}", address);
        }
        Ok(body[prefix.len()..].to_vec())
    }
}

fn checksum(body: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREAMBLE);
    hasher.update(body);
    hasher.finalize().to_vec()
}
