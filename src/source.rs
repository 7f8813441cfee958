//! Block batch delivery
//!
//! The indexer pulls ordered batches of blocks from a `BlockSource`.
//! `JsonLinesSource` reads an archive export with one JSON block per line
//! and can keep following the file while it grows.

use crate::types::Block;
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// An ordered, pull-based sequence of block batches.
pub trait BlockSource {
    /// Next batch of blocks in height order.
    ///
    /// `None` means the source is exhausted. An empty batch means nothing
    /// is available yet and the caller should poll again later.
    fn next_batch(&mut self) -> Result<Option<Vec<Block>>>;
}

/// Reads blocks from a JSON-lines file.
pub struct JsonLinesSource {
    path: PathBuf,
    reader: BufReader<File>,
    batch_size: usize,
    follow: bool,
    line_no: usize,
    last_height: Option<u64>,
    /// Unterminated tail of the file while following
    pending: String,
}

impl JsonLinesSource {
    pub fn open(path: &Path, batch_size: usize, follow: bool) -> Result<Self> {
        if batch_size == 0 {
            anyhow::bail!("batch size must be at least 1");
        }
        let file =
            File::open(path).with_context(|| format!("Failed to open block file: {:?}", path))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            batch_size,
            follow,
            line_no: 0,
            last_height: None,
            pending: String::new(),
        })
    }

    /// Next complete line, or `None` at the current end of file.
    fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            let read = self
                .reader
                .read_line(&mut self.pending)
                .with_context(|| format!("Failed to read {:?}", self.path))?;
            if read == 0 && (self.follow || self.pending.is_empty()) {
                return Ok(None);
            }
            if read > 0 && !self.pending.ends_with('\n') && self.follow {
                // Writer has not finished this line yet
                continue;
            }
            self.line_no += 1;
            let line = std::mem::take(&mut self.pending);
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(line));
        }
    }

    fn parse_block(&mut self, line: &str) -> Result<Block> {
        let block: Block = serde_json::from_str(line)
            .with_context(|| format!("Invalid block at {:?} line {}", self.path, self.line_no))?;
        if let Some(last) = self.last_height {
            if block.height <= last {
                anyhow::bail!(
                    "Block heights must increase: {} follows {} at {:?} line {}",
                    block.height,
                    last,
                    self.path,
                    self.line_no
                );
            }
        }
        self.last_height = Some(block.height);
        Ok(block)
    }
}

impl BlockSource for JsonLinesSource {
    fn next_batch(&mut self) -> Result<Option<Vec<Block>>> {
        let mut blocks = Vec::with_capacity(self.batch_size);
        while blocks.len() < self.batch_size {
            let Some(line) = self.next_line()? else {
                break;
            };
            blocks.push(self.parse_block(&line)?);
        }
        if blocks.is_empty() && !self.follow {
            return Ok(None);
        }
        Ok(Some(blocks))
    }
}

/// Pre-built batches held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    batches: VecDeque<Vec<Block>>,
}

impl MemorySource {
    pub fn new(batches: Vec<Vec<Block>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }
}

impl BlockSource for MemorySource {
    fn next_batch(&mut self) -> Result<Option<Vec<Block>>> {
        Ok(self.batches.pop_front())
    }
}
