//! Callback dispatcher: one dedicated thread that delivers every event.
//!
//! Workers and the orchestrator only ever `post` into an unbounded FIFO
//! channel; the `paginator-dispatch` thread drains it and calls the
//! listener, one event at a time, in enqueue order. The consumer therefore
//! never runs concurrently with itself or on a worker thread.
//!
//! ## Shutdown gate
//!
//! Delivery happens while holding a gate mutex, after re-checking the
//! cancel token. `Paginator::shutdown` cancels first and then takes the
//! gate, so by the time it returns any in-progress delivery has finished
//! and every later one sees the cancellation and is dropped. A listener
//! may call `shutdown` from inside a callback: on the dispatcher thread the
//! gate is already held, so it is skipped.

use crate::cancel::CancelToken;
use crate::error::panic_message;
use crate::listener::{PagingEvent, PagingListener};
use crate::paginator::RunState;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

/// An event tagged with the run that produced it.
#[derive(Debug)]
struct Envelope {
    run_id: u64,
    event: PagingEvent,
}

/// Handle to the dispatcher thread. Cheap to clone; every clone posts into
/// the same queue.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
    gate: Arc<Mutex<()>>,
    thread_id: ThreadId,
}

impl Dispatcher {
    /// Spawn the dispatcher thread.
    ///
    /// After a run's terminal event has been delivered, its final
    /// [`RunState`] is published on `state`.
    pub(crate) fn spawn(
        listener: Arc<dyn PagingListener>,
        cancel: CancelToken,
        state: Arc<watch::Sender<RunState>>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Mutex::new(()));

        let handle = thread::Builder::new()
            .name("paginator-dispatch".into())
            .spawn({
                let gate = Arc::clone(&gate);
                move || drain(rx, listener, gate, cancel, state)
            })?;

        Ok(Self {
            tx,
            gate,
            thread_id: handle.thread().id(),
        })
    }

    /// Enqueue an event. Never blocks.
    pub fn post(&self, run_id: u64, event: PagingEvent) {
        if self.tx.send(Envelope { run_id, event }).is_err() {
            warn!(run_id, "Dispatcher has stopped; event dropped");
        }
    }

    /// Whether the caller is running on the dispatcher thread.
    pub fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Run `f` while no event is being delivered.
    ///
    /// Blocks until the current delivery (if any) returns. On the
    /// dispatcher thread itself `f` runs immediately.
    pub(crate) fn with_delivery_paused<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.is_dispatch_thread() {
            return f();
        }
        let _guard = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

fn drain(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    listener: Arc<dyn PagingListener>,
    gate: Arc<Mutex<()>>,
    cancel: CancelToken,
    state: Arc<watch::Sender<RunState>>,
) {
    debug!("Dispatcher started");
    while let Some(Envelope { run_id, event }) = rx.blocking_recv() {
        let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
        if cancel.is_cancelled() {
            debug!(run_id, "Shut down; dropping event");
            continue;
        }

        let terminal = match &event {
            PagingEvent::BlockReady(_) => None,
            PagingEvent::AllBlocksReady(doc) => Some(RunState::Completed(doc.stats.clone())),
            PagingEvent::RunFailed(err) => Some(RunState::Failed {
                run_id,
                error: err.clone(),
            }),
        };

        let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
        if let Err(payload) = delivered {
            error!(
                run_id,
                "Listener panicked: {}",
                panic_message(payload.as_ref())
            );
        }

        if let Some(final_state) = terminal {
            state.send_replace(final_state);
        }
    }
    debug!("Dispatcher stopped");
}
