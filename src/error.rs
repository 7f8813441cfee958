//! Error taxonomy for the indexing pipeline
//!
//! Decode and payload errors are recoverable: the offending item is
//! dropped and the batch continues. Persistence errors are fatal to the
//! batch and stop the run.

use thiserror::Error;

/// Raw bytes did not match the contract interface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),

    #[error("unknown function selector 0x{0}")]
    UnknownSelector(String),

    #[error("unknown event topic {0}")]
    UnknownTopic(String),

    #[error("payload truncated: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("argument layout mismatch: {0}")]
    Layout(String),
}

/// A classified item whose payload lacks the fields or bytes we need.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedPayloadError {
    #[error("missing field {0}")]
    MissingField(String),

    #[error("payload too short: need {needed} hex chars from offset {offset}, got {len}")]
    TooShort {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("invalid amount {0}")]
    InvalidAmount(String),

    #[error("invalid hex in {0}")]
    InvalidHex(String),

    #[error("event {0} has no extrinsic hash")]
    MissingExtrinsic(String),
}

/// Anything that can make the extractor drop an item.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Malformed(#[from] MalformedPayloadError),

    #[error("mapping lookup failed: {0:#}")]
    Lookup(anyhow::Error),
}

/// The atomic batch write failed. The batch is not processed.
#[derive(Debug, Error)]
#[error("failed to persist batch ending at block {head}: {cause:#}")]
pub struct PersistenceError {
    pub head: u64,
    pub cause: anyhow::Error,
}
