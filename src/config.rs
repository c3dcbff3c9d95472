//! Configuration types for a pagination run.
//!
//! Every knob lives in [`PaginatorConfig`], built via its
//! [`PaginatorConfigBuilder`]. The config is plain data (`Clone`, serde)
//! so it can be logged, shared with the worker tasks and diffed between runs.
//!
//! Validation happens in [`PaginatorConfigBuilder::build`] and again in
//! [`crate::Paginator::new`], so an unusable configuration is always reported
//! synchronously, before any worker exists.

use crate::error::PagingError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`crate::Paginator`].
///
/// # Example
/// ```rust
/// use block_paginator::PaginatorConfig;
///
/// let config = PaginatorConfig::builder()
///     .chars_per_page(100)
///     .block_size(1000)
///     .worker_count(2)
///     .priority_block(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.priority_block, Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatorConfig {
    /// Maximum characters per page. Default: 1000.
    pub chars_per_page: usize,

    /// Maximum characters per block, the unit of parallel work. Default: 10 000.
    ///
    /// Make this an exact multiple of `chars_per_page` when the aggregated
    /// pages must match whole-text pagination: blocks are cut first and paged
    /// independently, so a block edge that falls mid-page yields a short page
    /// at the end of that block.
    pub block_size: usize,

    /// Number of worker threads in the paging pool. Default: available
    /// parallelism, capped at 4.
    pub worker_count: usize,

    /// Block submitted to the pool before all others. `None`, or an index
    /// past the last block, means no priority.
    pub priority_block: Option<usize>,

    /// Upper bound on the completion barrier wait, in milliseconds.
    /// `None` (default) waits for every worker indefinitely.
    pub barrier_timeout_ms: Option<u64>,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            chars_per_page: 1000,
            block_size: 10_000,
            worker_count: default_worker_count(),
            priority_block: None,
            barrier_timeout_ms: None,
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(2)
}

impl PaginatorConfig {
    /// Create a new builder for `PaginatorConfig`.
    pub fn builder() -> PaginatorConfigBuilder {
        PaginatorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check every constraint; used by the builder and by `Paginator::new`.
    pub fn validate(&self) -> Result<(), PagingError> {
        if self.chars_per_page == 0 {
            return Err(PagingError::InvalidArgument(
                "chars_per_page must be ≥ 1".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(PagingError::InvalidArgument("block_size must be ≥ 1".into()));
        }
        if self.worker_count == 0 {
            return Err(PagingError::InvalidArgument(
                "worker_count must be ≥ 1".into(),
            ));
        }
        if self.barrier_timeout_ms == Some(0) {
            return Err(PagingError::InvalidArgument(
                "barrier_timeout_ms must be ≥ 1 when set".into(),
            ));
        }
        Ok(())
    }

    /// The barrier timeout as a `Duration`.
    pub fn barrier_timeout(&self) -> Option<Duration> {
        self.barrier_timeout_ms.map(Duration::from_millis)
    }

    /// Resolve the priority index against the actual block count.
    pub(crate) fn effective_priority(&self, block_count: usize) -> Option<usize> {
        self.priority_block.filter(|&i| i < block_count)
    }
}

/// Builder for [`PaginatorConfig`].
#[derive(Debug)]
pub struct PaginatorConfigBuilder {
    config: PaginatorConfig,
}

impl PaginatorConfigBuilder {
    pub fn chars_per_page(mut self, n: usize) -> Self {
        self.config.chars_per_page = n;
        self
    }

    pub fn block_size(mut self, n: usize) -> Self {
        self.config.block_size = n;
        self
    }

    pub fn worker_count(mut self, n: usize) -> Self {
        self.config.worker_count = n;
        self
    }

    pub fn priority_block(mut self, index: usize) -> Self {
        self.config.priority_block = Some(index);
        self
    }

    /// Accepts a signed index as hosts often track one; negative means none.
    pub fn priority_block_signed(mut self, index: i64) -> Self {
        self.config.priority_block = usize::try_from(index).ok();
        self
    }

    pub fn no_priority(mut self) -> Self {
        self.config.priority_block = None;
        self
    }

    /// Bound the completion barrier. Stored in whole milliseconds; anything
    /// shorter than 1 ms is raised to 1 ms.
    pub fn barrier_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.config.barrier_timeout_ms = Some(millis.max(1));
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PaginatorConfig, PagingError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
