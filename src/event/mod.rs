//! Cross-thread event delivery.
//!
//! Connection workers never touch pool or registry state directly: they
//! describe each transition as an immutable event and enqueue it here. The
//! dispatch tick is the single consumer; it drains both channels once per
//! tick and applies the transitions, which is what keeps all pool mutation
//! on one logical execution path.

use crate::base::error::NetError;
use crate::pool::connection::ConnectionId;
use crate::pool::{Request, RequestId};
use tokio::sync::mpsc;

/// A connection worker's state transition report.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Handshake succeeded; `protocol` is the negotiated application
    /// protocol name.
    Opened { id: ConnectionId, protocol: String },
    /// Handshake failed. A transient failure has already requeued the
    /// held request via [`RequestEvent::Resend`].
    OpenFailed { id: ConnectionId, error: NetError },
    /// The current exchange finished; `reusable` says whether the
    /// connection protocol permits another request on this transport.
    RequestFinished { id: ConnectionId, reusable: bool },
    /// Terminal: the worker is gone. `error` is `None` for a clean close.
    Closed { id: ConnectionId, error: Option<NetError> },
}

/// Request-level completion and resend signals.
pub enum RequestEvent {
    /// The exchange completed and the request's callback has fired.
    Completed { id: RequestId },
    /// The connection died while holding this request; requeue it.
    /// Emitted exactly once per closure.
    Resend { request: Box<dyn Request> },
    /// The request failed fatally and its callback has fired.
    Failed { id: RequestId, error: NetError },
}

impl std::fmt::Debug for RequestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestEvent::Completed { id } => f.debug_struct("Completed").field("id", id).finish(),
            RequestEvent::Resend { request } => {
                f.debug_struct("Resend").field("id", &request.id()).finish()
            }
            RequestEvent::Failed { id, error } => {
                f.debug_struct("Failed").field("id", id).field("error", error).finish()
            }
        }
    }
}

/// Producer half of an [`EventChannel`]; cheap to clone into workers.
pub struct EventSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T> EventSender<T> {
    /// Enqueue without blocking. A send after the consumer is gone only
    /// happens during teardown and is dropped quietly.
    pub fn send(&self, event: T) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event dropped: channel consumer has shut down");
        }
    }
}

/// Multi-producer/single-consumer unbounded event queue.
///
/// Exactly one consumer — the dispatch tick — drains it. Events enqueued
/// while a drained batch is being applied become visible on the next tick.
pub struct EventChannel<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventChannel<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// New producer handle for a worker.
    pub fn sender(&self) -> EventSender<T> {
        EventSender { tx: self.tx.clone() }
    }

    /// Take everything currently enqueued, in FIFO order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Discard all unprocessed events. Used on full shutdown.
    pub fn clear(&mut self) {
        let discarded = self.drain().len();
        if discarded > 0 {
            tracing::debug!(discarded, "event channel cleared");
        }
    }
}
