//! Worker pool scheduler, completion barrier and aggregator.
//!
//! ## Execution contexts
//!
//! Each [`Paginator`] owns a small tokio runtime:
//!
//! * one core thread runs the orchestration task of a run (split, submit,
//!   await the barrier, aggregate); the caller of
//!   [`Paginator::start_paging`] never blocks on it;
//! * the blocking pool, capped at `worker_count` threads, is the bounded
//!   worker pool. Each block is paged in its own `spawn_blocking` task.
//!
//! Events leave through the [`Dispatcher`] thread, which is the third,
//! disjoint context.
//!
//! ## Submission and overflow policy
//!
//! Blocks are fed through `buffer_unordered(worker_count)`, which spawns a
//! block's task only when fewer than `worker_count` are in flight. The
//! priority block is first in the submission order, so it is always spawned
//! first; with a single worker it also finishes before any other block
//! starts. When the pool is saturated the orchestrator simply holds back
//! further submissions: the queue never grows past the pool and never
//! rejects.
//!
//! ## Ordering
//!
//! A worker records its slot and posts `BlockReady` before its task
//! completes, and the terminal event is posted only after every task has
//! completed, so it is always the last event of a run on the FIFO
//! dispatcher queue.

use crate::cancel::CancelToken;
use crate::config::PaginatorConfig;
use crate::dispatch::Dispatcher;
use crate::error::{panic_message, BlockError, PagingError};
use crate::listener::{PagingEvent, PagingListener};
use crate::output::{BlockPages, PagedDocument, RunStats};
use crate::pipeline::slice::{CharWindowSlicer, PageSlicer};
use crate::pipeline::split::{split_blocks, Block};
use crate::pipeline::store::{BlockOutcome, ResultStore};
use crate::stream::event_channel;
use futures::future::{self, Future};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::task;
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`Paginator`], as observed by [`Paginator::state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// No run has been started yet.
    Idle,
    /// A run is in flight; its terminal event has not been delivered.
    Running { run_id: u64 },
    /// The last run delivered `AllBlocksReady`.
    Completed(RunStats),
    /// The last run delivered `RunFailed`.
    Failed { run_id: u64, error: PagingError },
    /// `shutdown` was called; no further runs or events.
    ShutDown,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running { .. })
    }
}

/// Paginates one body of text on a bounded worker pool.
///
/// # Example
/// ```rust
/// use block_paginator::{event_channel, Paginator, PaginatorConfig, PagingEvent};
/// use std::sync::Arc;
///
/// let config = PaginatorConfig::builder()
///     .chars_per_page(100)
///     .block_size(1000)
///     .worker_count(2)
///     .priority_block(2)
///     .build()
///     .unwrap();
/// let (listener, mut events) = event_channel();
/// let paginator = Paginator::new("x".repeat(3500), config, Arc::new(listener)).unwrap();
///
/// paginator.start_paging().unwrap();
/// let stats = paginator.wait(None).unwrap();
/// assert_eq!(stats.total_pages, 35);
///
/// let last = events.drain_ready().pop().unwrap();
/// assert!(matches!(last, PagingEvent::AllBlocksReady(doc) if doc.total_pages() == 35));
/// ```
pub struct Paginator {
    text: Arc<str>,
    config: PaginatorConfig,
    slicer: Arc<dyn PageSlicer>,
    runtime: Mutex<Option<Runtime>>,
    /// Drives `wait` on the caller's thread; built once, never spawns tasks.
    waiter: Option<Runtime>,
    listener: Arc<dyn PagingListener>,
    dispatcher: Dispatcher,
    cancel: CancelToken,
    active_run: Mutex<Option<CancelToken>>,
    state: Arc<watch::Sender<RunState>>,
    next_run_id: AtomicU64,
}

impl Paginator {
    /// Create a paginator for `text`, delivering events to `listener`.
    ///
    /// Validates `config` and starts the dispatcher thread; no worker runs
    /// until [`start_paging`](Self::start_paging).
    ///
    /// # Errors
    /// [`PagingError::InvalidArgument`] for a zero size or count,
    /// [`PagingError::Runtime`] if threads cannot be created.
    pub fn new(
        text: impl Into<String>,
        config: PaginatorConfig,
        listener: Arc<dyn PagingListener>,
    ) -> Result<Self, PagingError> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_count)
            .thread_name("paginator-worker")
            .enable_time()
            .build()
            .map_err(|e| PagingError::Runtime(format!("Failed to create worker pool: {e}")))?;

        let waiter = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| PagingError::Runtime(format!("Failed to create wait runtime: {e}")))?;

        let cancel = CancelToken::new();
        let state = Arc::new(watch::channel(RunState::Idle).0);
        let dispatcher = Dispatcher::spawn(Arc::clone(&listener), cancel.clone(), Arc::clone(&state))
            .map_err(|e| PagingError::Runtime(format!("Failed to start dispatcher: {e}")))?;

        let text: String = text.into();
        debug!(
            chars = text.chars().count(),
            workers = config.worker_count,
            "Paginator created"
        );

        Ok(Self {
            text: Arc::from(text),
            config,
            slicer: Arc::new(CharWindowSlicer),
            runtime: Mutex::new(Some(runtime)),
            waiter: Some(waiter),
            listener,
            dispatcher,
            cancel,
            active_run: Mutex::new(None),
            state,
            next_run_id: AtomicU64::new(0),
        })
    }

    /// Replace the default [`CharWindowSlicer`].
    pub fn with_slicer(mut self, slicer: Arc<dyn PageSlicer>) -> Self {
        self.slicer = slicer;
        self
    }

    pub fn config(&self) -> &PaginatorConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Start a pagination run and return its id without waiting for it.
    ///
    /// A finished run may be followed by another; each run gets a fresh
    /// result store.
    ///
    /// # Errors
    /// [`PagingError::AlreadyRunning`] while a run is in flight (the
    /// in-flight run is untouched), [`PagingError::ShutDown`] after
    /// [`shutdown`](Self::shutdown).
    pub fn start_paging(&self) -> Result<u64, PagingError> {
        if self.cancel.is_cancelled() {
            return Err(PagingError::ShutDown);
        }

        let mut admitted: Result<u64, PagingError> = Err(PagingError::ShutDown);
        self.state.send_if_modified(|state| match state {
            RunState::Running { run_id } => {
                admitted = Err(PagingError::AlreadyRunning { run_id: *run_id });
                false
            }
            RunState::ShutDown => false,
            _ => {
                let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst) + 1;
                *state = RunState::Running { run_id };
                admitted = Ok(run_id);
                true
            }
        });
        let run_id = admitted?;

        let run_cancel = CancelToken::new();
        *self.active_run.lock().unwrap_or_else(PoisonError::into_inner) = Some(run_cancel.clone());

        let job = PagingJob {
            run_id,
            text: Arc::clone(&self.text),
            config: self.config.clone(),
            slicer: Arc::clone(&self.slicer),
            dispatcher: self.dispatcher.clone(),
            cancel: run_cancel,
            started: Instant::now(),
        };

        let guard = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(runtime) = guard.as_ref() else {
            return Err(PagingError::ShutDown);
        };
        info!(
            run_id,
            workers = self.config.worker_count,
            block_size = self.config.block_size,
            chars_per_page = self.config.chars_per_page,
            "Starting pagination run"
        );
        runtime.spawn(run_job(job));
        Ok(run_id)
    }

    /// Block until the current run's terminal event has been delivered.
    ///
    /// Must be called from a plain thread, not from inside an async
    /// context or a listener callback.
    ///
    /// # Errors
    /// The run's own failure, [`PagingError::NotStarted`],
    /// [`PagingError::ShutDown`], or [`PagingError::WaitTimeout`].
    pub fn wait(&self, timeout: Option<Duration>) -> Result<RunStats, PagingError> {
        if self.dispatcher.is_dispatch_thread() {
            return Err(PagingError::Runtime(
                "wait() cannot be called from a listener callback".into(),
            ));
        }

        let Some(waiter) = self.waiter.as_ref() else {
            return Err(PagingError::ShutDown);
        };
        let mut rx = self.state.subscribe();
        let started = Instant::now();

        let settled = waiter.block_on(async {
            let settle = rx.wait_for(|s| !s.is_running());
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, settle).await {
                    Ok(r) => r.map(|s| Some(s.clone())),
                    Err(_) => Ok(None),
                },
                None => settle.await.map(|s| Some(s.clone())),
            };
            result.unwrap_or(Some(RunState::ShutDown))
        });

        match settled {
            None => Err(PagingError::WaitTimeout {
                run_id: self.next_run_id.load(Ordering::SeqCst),
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
            Some(RunState::Completed(stats)) => Ok(stats),
            Some(RunState::Failed { error, .. }) => Err(error),
            Some(RunState::Idle) => Err(PagingError::NotStarted),
            Some(RunState::ShutDown) | Some(RunState::Running { .. }) => Err(PagingError::ShutDown),
        }
    }

    /// Stop accepting runs, interrupt in-flight workers and stop delivery.
    ///
    /// Once this returns the listener receives no further events; its
    /// `on_shutdown` hook has run, which closes an [`event_channel`]. Does not
    /// wait for workers to notice the cancellation. Safe to call more than
    /// once, and from inside a listener callback.
    pub fn shutdown(&self) {
        let first = !self.cancel.is_cancelled();
        self.cancel.cancel();
        if let Some(run) = self
            .active_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            run.cancel();
        }

        self.dispatcher.with_delivery_paused(|| {
            self.state.send_replace(RunState::ShutDown);
            if first {
                self.listener.on_shutdown();
            }
        });

        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
        if first {
            info!("Paginator shut down");
        }
    }
}

impl Drop for Paginator {
    fn drop(&mut self) {
        self.shutdown();
        // Dropping a runtime inside an async context panics.
        if let Some(waiter) = self.waiter.take() {
            waiter.shutdown_background();
        }
    }
}

/// Paginate `text` and block until the aggregate is ready.
///
/// Convenience wrapper over [`Paginator`] for callers that do not need the
/// per-block events. Must not be called from inside an async context.
pub fn paginate_text(
    text: impl Into<String>,
    config: PaginatorConfig,
) -> Result<PagedDocument, PagingError> {
    let (listener, mut events) = event_channel();
    let paginator = Paginator::new(text, config, Arc::new(listener))?;
    paginator.start_paging()?;
    paginator.wait(None)?;

    events
        .drain_ready()
        .into_iter()
        .find_map(|event| match event {
            PagingEvent::AllBlocksReady(doc) => Some(doc),
            _ => None,
        })
        .ok_or_else(|| PagingError::Runtime("run finished without an aggregate".into()))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Everything one run needs; moved into its orchestration task.
struct PagingJob {
    run_id: u64,
    text: Arc<str>,
    config: PaginatorConfig,
    slicer: Arc<dyn PageSlicer>,
    dispatcher: Dispatcher,
    cancel: CancelToken,
    started: Instant,
}

/// State shared between the orchestrator and the workers of one run.
struct RunShared {
    run_id: u64,
    chars_per_page: usize,
    slicer: Arc<dyn PageSlicer>,
    dispatcher: Dispatcher,
    store: ResultStore,
    cancel: CancelToken,
    /// Set once the terminal event is posted; later block events are dropped.
    closed: Mutex<bool>,
}

impl RunShared {
    fn post_block(&self, block: BlockPages) {
        let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed || self.cancel.is_cancelled() {
            debug!(run_id = self.run_id, block = block.block_index, "Run over; block event dropped");
            return;
        }
        self.dispatcher
            .post(self.run_id, PagingEvent::BlockReady(block));
    }

    fn finish(&self, event: PagingEvent) {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if !*closed {
            *closed = true;
            self.dispatcher.post(self.run_id, event);
        }
    }
}

async fn run_job(job: PagingJob) {
    let PagingJob {
        run_id,
        text,
        config,
        slicer,
        dispatcher,
        cancel,
        started,
    } = job;

    // ── Step 1: Split ─────────────────────────────────────────────────────
    let blocks = match split_blocks(&text, config.block_size) {
        Ok(blocks) => blocks,
        Err(e) => {
            dispatcher.post(run_id, PagingEvent::RunFailed(e));
            return;
        }
    };
    drop(text);
    let total = blocks.len();
    let priority = config.effective_priority(total);

    let shared = Arc::new(RunShared {
        run_id,
        chars_per_page: config.chars_per_page,
        slicer,
        dispatcher,
        store: ResultStore::new(total),
        cancel,
        closed: Mutex::new(false),
    });

    if total == 0 {
        info!(run_id, "Empty text; no workers spawned");
        shared.finish(PagingEvent::AllBlocksReady(PagedDocument {
            pages: Vec::new(),
            stats: RunStats {
                run_id,
                duration_ms: started.elapsed().as_millis() as u64,
                ..RunStats::default()
            },
        }));
        return;
    }
    debug!(run_id, blocks = total, ?priority, "Text split into blocks");

    // ── Step 2: Submit (priority first) and await the barrier ────────────
    let order = submission_order(blocks, priority);
    let barrier = stream::iter(order.into_iter().map(|block| {
        let index = block.index();
        let is_priority = priority == Some(index);
        let worker = Arc::clone(&shared);
        let handle = task::spawn_blocking(move || page_block(&worker, block, is_priority));
        async move { (index, handle.await) }
    }))
    .buffer_unordered(config.worker_count)
    .for_each(|(index, joined)| {
        if let Err(e) = joined {
            let detail = if e.is_panic() {
                panic_message(e.into_panic().as_ref())
            } else {
                e.to_string()
            };
            error!(run_id, block = index, "Worker failed: {detail}");
            // A panicking worker never reached its own write.
            if let Err(e) = shared
                .store
                .record(index, Err(BlockError::Panicked { block: index, detail }))
            {
                error!(run_id, "Result store rejected write: {e}");
            }
        }
        future::ready(())
    });

    let barrier_cleared = tokio::select! {
        _ = shared.cancel.cancelled() => {
            debug!(run_id, "Run cancelled before the barrier cleared");
            return;
        }
        cleared = bounded(barrier, config.barrier_timeout()) => cleared,
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if !barrier_cleared {
        shared.cancel.cancel();
        let completed = shared.store.completed();
        warn!(run_id, completed, total, "Barrier timed out after {elapsed_ms}ms");
        shared.finish(PagingEvent::RunFailed(PagingError::BarrierTimeout {
            elapsed_ms,
            completed,
            total,
        }));
        return;
    }

    // ── Step 3: Aggregate in index order ─────────────────────────────────
    let aggregate = shared.store.aggregate();
    let failed = aggregate.failures.len() + aggregate.missing.len();

    if aggregate.is_complete() {
        let stats = RunStats {
            run_id,
            total_blocks: total,
            total_pages: aggregate.pages.len(),
            priority_block: priority,
            duration_ms: elapsed_ms,
        };
        info!(
            run_id,
            "Pagination complete: {} pages from {} blocks in {}ms",
            stats.total_pages,
            total,
            elapsed_ms
        );
        shared.finish(PagingEvent::AllBlocksReady(PagedDocument {
            pages: aggregate.pages,
            stats,
        }));
    } else {
        let first_error = aggregate
            .failures
            .first()
            .map(|e| e.to_string())
            .or_else(|| {
                aggregate
                    .missing
                    .first()
                    .map(|i| format!("Block {i}: never completed"))
            })
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(run_id, failed, total, "Pagination failed: {first_error}");
        shared.finish(PagingEvent::RunFailed(PagingError::WorkerFailure {
            failed,
            total,
            first_error,
        }));
    }
}

/// Move the priority block (if any) to the front; the rest keep index order.
fn submission_order(mut blocks: Vec<Block>, priority: Option<usize>) -> Vec<Block> {
    if let Some(p) = priority {
        blocks[..=p].rotate_right(1);
    }
    blocks
}

/// Await `fut`, giving up after `limit`. Returns whether it completed.
async fn bounded(fut: impl Future<Output = ()>, limit: Option<Duration>) -> bool {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.is_ok(),
        None => {
            fut.await;
            true
        }
    }
}

/// Worker body: slice one block, record it, then announce it.
fn page_block(shared: &RunShared, block: Block, is_priority: bool) {
    let index = block.index();
    let run_id = shared.run_id;

    let outcome: BlockOutcome = if shared.cancel.is_cancelled() {
        Err(BlockError::Cancelled { block: index })
    } else {
        shared
            .slicer
            .slice(&block, shared.chars_per_page, &shared.cancel)
            .map(Arc::from)
    };
    drop(block);

    let ready = match &outcome {
        Ok(pages) => {
            debug!(run_id, block = index, pages = pages.len(), is_priority, "Block paged");
            Some(BlockPages {
                block_index: index,
                pages: Arc::clone(pages),
                is_priority,
            })
        }
        Err(BlockError::Cancelled { .. }) => {
            debug!(run_id, block = index, "Block cancelled");
            None
        }
        Err(e) => {
            warn!(run_id, block = index, "Block failed: {e}");
            None
        }
    };

    if let Err(e) = shared.store.record(index, outcome) {
        error!(run_id, "Result store rejected write: {e}");
        return;
    }
    if let Some(ready) = ready {
        shared.post_block(ready);
    }
}
