//! Result store: a write-once slot per block index.
//!
//! Each worker owns exactly one slot (its block index), so workers never
//! race each other on a write. The aggregator only reads after the
//! completion barrier, so reads never race writes either. A `OnceLock` per
//! slot enforces "exactly one entry per block" at runtime: a second write to
//! the same index is rejected instead of overwriting.

use crate::error::BlockError;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// What a worker produced for one block.
pub type BlockOutcome = Result<Arc<[String]>, BlockError>;

/// Misuse of the store; never expected in a healthy run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("slot {index} was already recorded")]
    AlreadyRecorded { index: usize },

    #[error("slot {index} is out of range (store has {len} slots)")]
    OutOfRange { index: usize, len: usize },
}

/// Thread-safe `block index → pages` mapping for one pagination run.
#[derive(Debug)]
pub struct ResultStore {
    slots: Vec<OnceLock<BlockOutcome>>,
}

impl ResultStore {
    pub fn new(block_count: usize) -> Self {
        Self {
            slots: (0..block_count).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Write the outcome for `index`. The first write wins.
    pub fn record(&self, index: usize, outcome: BlockOutcome) -> Result<(), StoreError> {
        let slot = self.slots.get(index).ok_or(StoreError::OutOfRange {
            index,
            len: self.slots.len(),
        })?;
        slot.set(outcome)
            .map_err(|_| StoreError::AlreadyRecorded { index })
    }

    /// Number of slots written so far, successes and failures alike.
    pub fn completed(&self) -> usize {
        self.slots.iter().filter(|s| s.get().is_some()).count()
    }

    /// Concatenate every successful slot's pages in ascending index order.
    ///
    /// Failed and unwritten slots contribute no pages; they are listed in
    /// the returned [`Aggregate`] so the caller can decide what to report.
    pub fn aggregate(&self) -> Aggregate {
        let total_pages = self
            .slots
            .iter()
            .filter_map(|s| s.get())
            .filter_map(|o| o.as_ref().ok())
            .map(|p| p.len())
            .sum();

        let mut aggregate = Aggregate {
            pages: Vec::with_capacity(total_pages),
            failures: Vec::new(),
            missing: Vec::new(),
            block_count: self.slots.len(),
        };
        for (index, slot) in self.slots.iter().enumerate() {
            match slot.get() {
                Some(Ok(pages)) => aggregate.pages.extend(pages.iter().cloned()),
                Some(Err(e)) => aggregate.failures.push(e.clone()),
                None => aggregate.missing.push(index),
            }
        }
        aggregate
    }
}

/// Result of reading the store in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    /// Pages of every successful block, in document order.
    pub pages: Vec<String>,
    /// Failed blocks, in index order.
    pub failures: Vec<BlockError>,
    /// Indices whose slot was never written.
    pub missing: Vec<usize>,
    pub block_count: usize,
}

impl Aggregate {
    /// True when every block recorded a success.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.missing.is_empty()
    }
}
