//! Host-drained event channel.
//!
//! ## Why a channel?
//!
//! A UI or CLI usually wants events on its own main loop, not on the
//! dispatcher thread. [`event_channel`] returns a [`ChannelListener`] that
//! forwards each owned [`PagingEvent`] into an unbounded FIFO channel, and
//! an [`EventReceiver`] the host drains wherever it likes: blocking, polled,
//! or as a `futures::Stream` from async code.
//!
//! Order is the dispatcher's order: every `BlockReady` of a run precedes its
//! `AllBlocksReady` / `RunFailed`.
//!
//! ## Shutdown
//!
//! When the paginator shuts down (explicitly or by being dropped) the
//! channel is closed: events still buffered are discarded and every
//! receive method returns `None` from then on, including a
//! `recv_blocking` that is already parked.

use crate::cancel::CancelToken;
use crate::listener::{PagingEvent, PagingListener};
use futures::StreamExt;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

/// A boxed stream of paging events.
pub type EventStream = Pin<Box<dyn Stream<Item = PagingEvent> + Send>>;

/// Create a listener/receiver pair.
pub fn event_channel() -> (ChannelListener, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = CancelToken::new();
    (
        ChannelListener {
            tx: Mutex::new(Some(tx)),
            closed: closed.clone(),
        },
        EventReceiver { rx, closed },
    )
}

/// Forwards every event into the paired [`EventReceiver`].
#[derive(Debug)]
pub struct ChannelListener {
    tx: Mutex<Option<mpsc::UnboundedSender<PagingEvent>>>,
    closed: CancelToken,
}

impl PagingListener for ChannelListener {
    fn on_event(&self, event: PagingEvent) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) if !self.closed.is_cancelled() => {
                if tx.send(event).is_err() {
                    debug!("Event receiver dropped; event discarded");
                }
            }
            _ => debug!("Channel closed; event discarded"),
        }
    }

    fn on_shutdown(&self) {
        self.closed.cancel();
        // Dropping the only sender wakes a parked receiver.
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// The host side of [`event_channel`].
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<PagingEvent>,
    closed: CancelToken,
}

impl EventReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` once the paginator has shut down or gone away.
    pub async fn recv(&mut self) -> Option<PagingEvent> {
        if self.is_closed() {
            return None;
        }
        let event = self.rx.recv().await;
        self.admit(event)
    }

    /// Blocking variant of [`recv`](Self::recv) for plain threads.
    ///
    /// Panics if called from inside an async context.
    pub fn recv_blocking(&mut self) -> Option<PagingEvent> {
        if self.is_closed() {
            return None;
        }
        let event = self.rx.blocking_recv();
        self.admit(event)
    }

    /// The next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<PagingEvent> {
        let event = self.rx.try_recv().ok();
        self.admit(event)
    }

    /// Every event queued right now, in order.
    pub fn drain_ready(&mut self) -> Vec<PagingEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Block until the current run's terminal event and return all events
    /// up to and including it.
    ///
    /// Returns early (without a terminal event) if the paginator shuts down.
    pub fn collect_run_blocking(&mut self) -> Vec<PagingEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv_blocking() {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    /// Whether the paginator has shut down; nothing more will be received.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Consume the receiver as a `Stream`. The stream ends at shutdown
    /// without yielding anything still buffered.
    pub fn into_stream(self) -> EventStream {
        let closed = self.closed;
        Box::pin(
            UnboundedReceiverStream::new(self.rx)
                .take_until(async move { closed.cancelled().await }),
        )
    }

    /// Pass `event` through unless the channel is closed, in which case
    /// the backlog is discarded.
    fn admit(&mut self, event: Option<PagingEvent>) -> Option<PagingEvent> {
        if !self.is_closed() {
            return event;
        }
        self.rx.close();
        let dropped = usize::from(event.is_some())
            + std::iter::from_fn(|| self.rx.try_recv().ok()).count();
        if dropped > 0 {
            debug!(dropped, "Channel closed; buffered events discarded");
        }
        None
    }
}
