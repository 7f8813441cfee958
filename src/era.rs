//! Payload format eras
//!
//! The same logical fields move at two cut-over heights: transaction
//! payloads gain a `value` wrapper at the transaction cut-over, and EVM
//! logs gain a `log` wrapper at the log cut-over. The transaction
//! cut-over comes first, which gives three eras.

use anyhow::Result;

/// Field layout in force at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatEra {
    /// Flat transaction and flat log fields.
    Legacy,
    /// Transaction nested under `value`, log still flat.
    NestedTransaction,
    /// Transaction nested under `value`, log nested under `log`.
    NestedLog,
}

impl FormatEra {
    /// JSON pointer of the emitting contract in `EVM.Log` args.
    pub fn log_address_path(self) -> &'static str {
        match self {
            FormatEra::Legacy | FormatEra::NestedTransaction => "/address",
            FormatEra::NestedLog => "/log/address",
        }
    }

    /// JSON pointer of the log data in `EVM.Log` args.
    pub fn log_data_path(self) -> &'static str {
        match self {
            FormatEra::Legacy | FormatEra::NestedTransaction => "/data",
            FormatEra::NestedLog => "/log/data",
        }
    }

    /// JSON pointer of the call input in `Ethereum.transact` args.
    pub fn tx_input_path(self) -> &'static str {
        match self {
            FormatEra::Legacy => "/transaction/input",
            FormatEra::NestedTransaction | FormatEra::NestedLog => "/transaction/value/input",
        }
    }

    /// JSON pointer of the call target in `Ethereum.transact` args.
    pub fn tx_target_path(self) -> &'static str {
        match self {
            FormatEra::Legacy => "/transaction/action/value",
            FormatEra::NestedTransaction | FormatEra::NestedLog => {
                "/transaction/value/action/value"
            }
        }
    }
}

/// Maps heights to format eras.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraSchedule {
    tx_cutover: u64,
    log_cutover: u64,
}

impl EraSchedule {
    pub fn new(tx_cutover: u64, log_cutover: u64) -> Result<Self> {
        if tx_cutover > log_cutover {
            anyhow::bail!(
                "transaction layout cut-over ({}) must not be after the log layout cut-over ({})",
                tx_cutover,
                log_cutover
            );
        }
        Ok(Self {
            tx_cutover,
            log_cutover,
        })
    }

    pub fn resolve(&self, height: u64) -> FormatEra {
        if height >= self.log_cutover {
            FormatEra::NestedLog
        } else if height >= self.tx_cutover {
            FormatEra::NestedTransaction
        } else {
            FormatEra::Legacy
        }
    }
}
