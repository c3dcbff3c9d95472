//! # block-paginator
//!
//! Split a large body of text into fixed-size blocks, paginate the blocks in
//! parallel on a bounded worker pool, and deliver the pages to a
//! single-threaded consumer, with one block (typically the one under the
//! reader's current position) jumping the queue.
//!
//! ## Pipeline Overview
//!
//! ```text
//! text
//!  │
//!  ├─ 1. Split      fixed-size blocks, indexed in document order
//!  ├─ 2. Schedule   priority block first, then the rest, N workers
//!  ├─ 3. Slice      each worker cuts its block into fixed-length pages
//!  ├─ 4. Store      write-once slot per block index
//!  ├─ 5. Barrier    wait for every worker, aggregate in index order
//!  └─ 6. Dispatch   BlockReady… then AllBlocksReady, on one thread, FIFO
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use block_paginator::{event_channel, Paginator, PaginatorConfig, PagingEvent};
//! use std::sync::Arc;
//!
//! let text = std::fs::read_to_string("book.txt").unwrap();
//! let config = PaginatorConfig::builder()
//!     .chars_per_page(800)
//!     .block_size(8000)
//!     .worker_count(4)
//!     .priority_block(3)
//!     .build()
//!     .unwrap();
//!
//! let (listener, mut events) = event_channel();
//! let paginator = Paginator::new(text, config, Arc::new(listener)).unwrap();
//! paginator.start_paging().unwrap();
//!
//! while let Some(event) = events.recv_blocking() {
//!     match event {
//!         PagingEvent::BlockReady(b) => eprintln!("block {} ready", b.block_index),
//!         PagingEvent::AllBlocksReady(doc) => {
//!             println!("{} pages", doc.total_pages());
//!             break;
//!         }
//!         PagingEvent::RunFailed(e) => panic!("{e}"),
//!     }
//! }
//! ```
//!
//! ## Boundary policy
//!
//! Blocks are cut before pages, so a block edge that is not a multiple of
//! `chars_per_page` ends its block with a short page. Block-wise and
//! whole-text pagination agree exactly when `block_size` is a multiple of
//! `chars_per_page`.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paginate` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod output;
pub mod paginator;
pub mod pipeline;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancelToken;
pub use config::{PaginatorConfig, PaginatorConfigBuilder};
pub use error::{BlockError, PagingError};
pub use listener::{NoopListener, PagingEvent, PagingListener};
pub use output::{BlockPages, PagedDocument, RunStats};
pub use paginator::{paginate_text, Paginator, RunState};
pub use pipeline::slice::{paginate, CharWindowSlicer, PageSlicer};
pub use pipeline::split::{block_index_for_offset, split_blocks, Block};
pub use pipeline::store::{Aggregate, ResultStore, StoreError};
pub use stream::{event_channel, ChannelListener, EventReceiver, EventStream};
