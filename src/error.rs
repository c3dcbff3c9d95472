//! Error types for the block-paginator library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PagingError`]: **Fatal** for a run or a call: bad configuration,
//!   a second run requested while one is active, a paginator that was shut
//!   down, or a run whose blocks did not all page cleanly. Returned as
//!   `Err(PagingError)` from [`crate::Paginator`] methods and carried by
//!   [`crate::PagingEvent::RunFailed`].
//!
//! * [`BlockError`]: **Non-fatal**: a single block failed (slicer error,
//!   worker panic, cancellation). Recorded in that block's slot of the
//!   [`crate::pipeline::store::ResultStore`] so sibling blocks are never
//!   aborted and the aggregator can see exactly which slot went wrong.

use thiserror::Error;

/// All fatal errors returned by the block-paginator library.
///
/// Block-level failures use [`BlockError`] and are folded into
/// [`PagingError::WorkerFailure`] once the completion barrier is passed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PagingError {
    // ── Argument errors ───────────────────────────────────────────────────
    /// A size or count was zero, or otherwise unusable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ── Lifecycle errors ──────────────────────────────────────────────────
    /// `start_paging` was called while a run is still in flight.
    #[error("Pagination run {run_id} is still in progress")]
    AlreadyRunning { run_id: u64 },

    /// The paginator was shut down; no further runs are accepted.
    #[error("Paginator has been shut down")]
    ShutDown,

    /// `wait` was called before any run was started.
    #[error("No pagination run has been started")]
    NotStarted,

    // ── Run errors ────────────────────────────────────────────────────────
    /// At least one block could not be paged.
    ///
    /// The run produced no `AllBlocksReady`; callers never see a silently
    /// truncated page sequence.
    #[error("{failed}/{total} blocks failed to paginate\nFirst error: {first_error}")]
    WorkerFailure {
        failed: usize,
        total: usize,
        first_error: String,
    },

    /// The completion barrier did not clear within the configured timeout.
    #[error("Pagination did not complete within {elapsed_ms}ms ({completed}/{total} blocks done)")]
    BarrierTimeout {
        elapsed_ms: u64,
        completed: usize,
        total: usize,
    },

    /// A caller-side wait gave up before the run finished.
    #[error("Timed out after {elapsed_ms}ms waiting for run {run_id}")]
    WaitTimeout { run_id: u64, elapsed_ms: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// The worker runtime or dispatcher thread could not be created.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// A non-fatal error for a single block.
///
/// Stored in the block's slot of the result store; the other blocks of the
/// run keep going.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum BlockError {
    /// The run was shut down before this block finished.
    #[error("Block {block}: cancelled")]
    Cancelled { block: usize },

    /// The page slicer reported an error.
    #[error("Block {block}: slicing failed: {detail}")]
    SliceFailed { block: usize, detail: String },

    /// The worker panicked while paging this block.
    #[error("Block {block}: worker panicked: {detail}")]
    Panicked { block: usize, detail: String },
}

impl BlockError {
    /// Index of the block this error belongs to.
    pub fn block(&self) -> usize {
        match self {
            BlockError::Cancelled { block }
            | BlockError::SliceFailed { block, .. }
            | BlockError::Panicked { block, .. } => *block,
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
