//! Consumer interface: the events a run produces and the trait that
//! receives them.
//!
//! Every event is delivered by the dispatcher thread
//! ([`crate::dispatch`]), one at a time and in the order it was posted, so
//! implementations need no locking of their own for state they only touch
//! from these callbacks.
//!
//! # Example
//!
//! ```rust
//! use block_paginator::{BlockPages, PagedDocument, PagingListener};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl PagingListener for PageCounter {
//!     fn on_block_ready(&self, block: &BlockPages) {
//!         self.pages.fetch_add(block.pages.len(), Ordering::SeqCst);
//!     }
//!
//!     fn on_all_blocks_ready(&self, doc: &PagedDocument) {
//!         assert_eq!(doc.total_pages(), self.pages.load(Ordering::SeqCst));
//!     }
//! }
//! ```

use crate::error::PagingError;
use crate::output::{BlockPages, PagedDocument};

/// A notification produced by a pagination run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingEvent {
    /// One block finished; zero or more per run, in completion order.
    BlockReady(BlockPages),
    /// Every block finished; exactly once per successful run, always last.
    AllBlocksReady(PagedDocument),
    /// The run failed; replaces `AllBlocksReady` and is always last.
    RunFailed(PagingError),
}

impl PagingEvent {
    /// `AllBlocksReady` and `RunFailed` end a run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PagingEvent::BlockReady(_))
    }
}

/// Receives the events of a run on the dispatcher thread.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Override [`on_event`](Self::on_event) instead to
/// take ownership of each event.
pub trait PagingListener: Send + Sync {
    /// Called for every event; routes to the typed callbacks by default.
    fn on_event(&self, event: PagingEvent) {
        match event {
            PagingEvent::BlockReady(block) => self.on_block_ready(&block),
            PagingEvent::AllBlocksReady(doc) => self.on_all_blocks_ready(&doc),
            PagingEvent::RunFailed(err) => self.on_run_failed(&err),
        }
    }

    /// One block's pages are ready.
    fn on_block_ready(&self, block: &BlockPages) {
        let _ = block;
    }

    /// The whole document is paged, in document order.
    fn on_all_blocks_ready(&self, doc: &PagedDocument) {
        let _ = doc;
    }

    /// The run could not produce a complete page sequence.
    fn on_run_failed(&self, error: &PagingError) {
        let _ = error;
    }

    /// The paginator is shutting down. Called once, after the last
    /// delivery and before `shutdown` returns.
    fn on_shutdown(&self) {}
}

/// A listener that ignores everything.
pub struct NoopListener;

impl PagingListener for NoopListener {}
