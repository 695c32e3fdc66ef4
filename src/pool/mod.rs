//! Connection pooling and host management.
//!
//! The per-host pool engine: admission, recycling, the connection lifecycle
//! state machine, and the persisted host registry.
//! - [`address`]: variant identity (host, port, security, proxy)
//! - [`connection`]: connection state machine and its worker task
//! - [`variant`]: per-variant pool (cap enforcement, request queue)
//! - [`host`]: per-host record with one-way protocol-support upgrade
//! - [`registry`]: hostname map with binary snapshot persistence
//! - [`store`]: injected file-system capability

pub mod address;
pub mod connection;
pub mod host;
pub mod registry;
pub mod store;
pub mod variant;

use crate::base::error::NetError;
use crate::buffer::BufferPool;
use crate::event::{ConnectionEvent, EventSender, RequestEvent};
use crate::pool::address::HostAddress;
use crate::pool::connection::{Connection, ConnectionId};
use crate::transport::{Connector, TransportStream};
use futures::future::BoxFuture;
use std::sync::Arc;
use url::Url;

pub type RequestId = u64;

/// What a finished exchange tells the pool about the transport.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeOutcome {
    /// Whether the connection protocol permits reuse (persistent
    /// connection). `false` tears the connection down after completion.
    pub reusable: bool,
}

/// The opaque unit of work the pool routes.
///
/// The pool never inspects wire semantics: the request carries its own
/// transcoder in [`Request::exchange`], its own retry budget, and its own
/// completion callback. The pool only needs identity, a target, and the
/// ability to requeue for resend.
pub trait Request: Send + 'static {
    fn id(&self) -> RequestId;

    /// Current target URI (mutable routing metadata, updated across
    /// redirects by the exchange itself).
    fn uri(&self) -> &Url;

    fn set_uri(&mut self, uri: Url);

    /// Drive the request/response exchange over an established transport,
    /// drawing scratch buffers from `buffers`. An `Err` terminates the
    /// connection; the pool requeues the request once per closure.
    fn exchange<'a>(
        &'a mut self,
        stream: &'a mut dyn TransportStream,
        buffers: &'a BufferPool,
    ) -> BoxFuture<'a, Result<ExchangeOutcome, NetError>>;

    /// Consume one unit of the caller-supplied retry budget; `false` when
    /// the budget is exhausted.
    fn take_retry(&mut self) -> bool;

    /// Completion/error callback. Invoked exactly once per request.
    fn complete(&mut self, result: Result<(), NetError>);
}

/// Spawns connections on behalf of variant pools: allocates ids and wires
/// each worker to the shared connector, buffer pool, and event channels.
pub(crate) struct ConnectionFactory {
    next_id: ConnectionId,
    connector: Arc<dyn Connector>,
    protocols: Vec<String>,
    buffers: Arc<BufferPool>,
    connection_events: EventSender<ConnectionEvent>,
    request_events: EventSender<RequestEvent>,
}

impl ConnectionFactory {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        protocols: Vec<String>,
        buffers: Arc<BufferPool>,
        connection_events: EventSender<ConnectionEvent>,
        request_events: EventSender<RequestEvent>,
    ) -> Self {
        Self { next_id: 1, connector, protocols, buffers, connection_events, request_events }
    }

    pub(crate) fn open(&mut self, address: &HostAddress, request: Box<dyn Request>) -> Connection {
        let id = self.next_id;
        self.next_id += 1;
        tracing::debug!(connection = id, host = %address.host, "opening connection");
        Connection::spawn(
            id,
            address.clone(),
            Arc::clone(&self.connector),
            self.protocols.clone(),
            Arc::clone(&self.buffers),
            self.connection_events.clone(),
            self.request_events.clone(),
            request,
        )
    }
}
