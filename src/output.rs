//! Output types delivered to the consumer.
//!
//! [`BlockPages`] is the payload of a per-block notification;
//! [`PagedDocument`] is the fully ordered aggregate delivered once per
//! successful run. Both are immutable snapshots: nothing a consumer holds
//! is ever mutated by a worker afterwards.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pages of one block, delivered as soon as that block finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPages {
    /// Index of the block in document order.
    pub block_index: usize,
    /// The block's pages in order. Shared with the result store.
    pub pages: Arc<[String]>,
    /// Whether this was the priority block of the run.
    pub is_priority: bool,
}

/// Statistics for one pagination run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Sequence number of the run within its paginator, starting at 1.
    pub run_id: u64,
    /// Number of blocks the text was split into.
    pub total_blocks: usize,
    /// Pages in the aggregate.
    pub total_pages: usize,
    /// Priority block actually used (in range), if any.
    pub priority_block: Option<usize>,
    /// Wall-clock time from `start_paging` to aggregation.
    pub duration_ms: u64,
}

/// The fully ordered page sequence of a successful run.
///
/// Serialisable so a persistence layer can store it, together with its own
/// current-page metadata, and resume without re-paginating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedDocument {
    pub pages: Vec<String>,
    pub stats: RunStats,
}

impl PagedDocument {
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page `n` (0-indexed), if it exists.
    pub fn page(&self, n: usize) -> Option<&str> {
        self.pages.get(n).map(String::as_str)
    }

    /// Index of the page containing character `offset` of the source text.
    ///
    /// Walks actual page lengths, so it stays correct when block edges
    /// produced short pages. `None` when the offset is past the end.
    pub fn page_index_for_offset(&self, offset: usize) -> Option<usize> {
        let mut start = 0usize;
        for (i, page) in self.pages.iter().enumerate() {
            let end = start + page.chars().count();
            if offset < end {
                return Some(i);
            }
            start = end;
        }
        None
    }

    /// Character offset at which page `n` begins.
    pub fn offset_of_page(&self, n: usize) -> Option<usize> {
        (n < self.pages.len()).then(|| {
            self.pages[..n]
                .iter()
                .map(|p| p.chars().count())
                .sum()
        })
    }
}
