//! Indexer configuration
//!
//! Start-up constants: which contracts to follow, the heights at which
//! payload layouts change, and the native address network. Values can be
//! loaded from a JSON file; missing fields fall back to the Astar defaults.

use crate::era::EraSchedule;
use crate::ss58::Ss58Codec;
use alloy_primitives::{address, Address};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Indexer start-up configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Staking contract whose stakers are tracked
    pub target_contract: Address,
    /// Label stored on the contract row
    pub target_contract_name: String,
    /// Contract that maps native accounts to EVM addresses
    pub base_contract: Address,
    /// First height where EVM logs are nested under `log`
    pub log_layout_cutover: u64,
    /// First height where transaction fields are nested under `value`
    pub tx_layout_cutover: u64,
    /// SS58 network name or numeric prefix
    pub ss58_network: String,
    /// Blocks below this height are ignored
    pub start_block: u64,
    /// Number of blocks per batch
    pub batch_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            target_contract: address!("d59fc6bfd9732ab19b03664a45dc29b8421bda9a"),
            target_contract_name: "Astar Degens".to_string(),
            base_contract: address!("8e2fa5a4d4e4f0581b69af2f8f2ef2cf205ae8f0"),
            log_layout_cutover: 1_844_803,
            tx_layout_cutover: 525_050,
            ss58_network: "astar".to_string(),
            start_block: 800_000,
            batch_size: 100,
        }
    }
}

impl IndexerConfig {
    /// Load a configuration file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: IndexerConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings are usable together.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        self.eras()?;
        self.codec()?;
        Ok(())
    }

    /// Native address codec for the configured network.
    pub fn codec(&self) -> Result<Ss58Codec> {
        Ss58Codec::from_network(&self.ss58_network)
    }

    /// Format era schedule from the two cut-over heights.
    pub fn eras(&self) -> Result<EraSchedule> {
        EraSchedule::new(self.tx_layout_cutover, self.log_layout_cutover)
    }
}

/// Pad an odd-length hex string with a leading zero.
fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix, in any case.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }

    Ok(Address::from_slice(&bytes))
}

/// Lowercase 0x-prefixed hex form of an address.
pub fn address_hex(addr: &Address) -> String {
    format!("0x{}", hex::encode(addr.as_slice()))
}
