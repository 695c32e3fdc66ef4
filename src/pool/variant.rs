use crate::base::error::NetError;
use crate::pool::address::HostAddress;
use crate::pool::connection::{Connection, ConnectionId, ConnectionState};
use crate::pool::{ConnectionFactory, Request};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Connection caps applied when a variant pool is created.
#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    pub per_variant: usize,
    pub multiplexed: usize,
}

/// The connection pool for one (host, port, security, proxy) variant.
///
/// Enforces the per-variant concurrency cap and performs admission:
/// reuse an idle connection, open a new one under the cap, or queue.
/// The pending queue is strictly FIFO — no priority reordering, so no
/// head-of-line starvation surprises. Invariants after any dispatch tick:
/// `connections.len() <= max_connections`, and the queue is non-empty only
/// while the pool is at its cap with no idle connection.
pub struct VariantPool {
    address: HostAddress,
    connections: Vec<Connection>,
    pending: VecDeque<Box<dyn Request>>,
    max_connections: usize,
}

impl std::fmt::Debug for VariantPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantPool")
            .field("address", &self.address)
            .field("connections", &self.connections.len())
            .field("pending", &self.pending.len())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl VariantPool {
    pub(crate) fn new(address: HostAddress, max_connections: usize) -> Self {
        Self { address, connections: Vec::new(), pending: VecDeque::new(), max_connections }
    }

    pub fn address(&self) -> &HostAddress {
        &self.address
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn idle_count(&self) -> usize {
        self.connections.iter().filter(|c| c.state() == ConnectionState::Idle).count()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub(crate) fn has_connection(&self, id: ConnectionId) -> bool {
        self.connections.iter().any(|c| c.id() == id)
    }

    fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.id() == id)
    }

    /// Admission: idle connection first, then a new connection under the
    /// cap, else the FIFO queue.
    pub(crate) fn submit(&mut self, request: Box<dyn Request>, factory: &mut ConnectionFactory) {
        if let Some(request) = self.try_dispatch(request, factory) {
            tracing::debug!(
                host = %self.address.host,
                queued = self.pending.len() + 1,
                "all connections busy; request queued"
            );
            self.pending.push_back(request);
        }
    }

    /// Returns the request back when the pool is at its cap with nothing
    /// idle.
    fn try_dispatch(
        &mut self,
        request: Box<dyn Request>,
        factory: &mut ConnectionFactory,
    ) -> Option<Box<dyn Request>> {
        let mut request = request;
        loop {
            if let Some(pos) =
                self.connections.iter().position(|c| c.state() == ConnectionState::Idle)
            {
                match self.connections[pos].recycle(request) {
                    Ok(()) => return None,
                    Err(returned) => {
                        // Worker is gone; drop the dead record and retry.
                        self.connections.remove(pos);
                        request = returned;
                        continue;
                    }
                }
            }

            if self.connections.len() < self.max_connections {
                self.connections.push(factory.open(&self.address, request));
                return None;
            }

            return Some(request);
        }
    }

    /// Serve queued requests oldest-first against whatever capacity is now
    /// available.
    pub(crate) fn flush(&mut self, factory: &mut ConnectionFactory) {
        while let Some(request) = self.pending.pop_front() {
            if let Some(request) = self.try_dispatch(request, factory) {
                self.pending.push_front(request);
                break;
            }
        }
    }

    pub(crate) fn on_opened(&mut self, id: ConnectionId, protocol: &str, now: Instant) {
        if let Some(conn) = self.connection_mut(id) {
            // A close requested mid-handshake leaves the state at Closing.
            if conn.state() == ConnectionState::Opening {
                conn.set_state(ConnectionState::Active);
            }
            conn.set_negotiated_protocol(protocol);
            conn.touch(now);
        }
    }

    pub(crate) fn on_request_finished(
        &mut self,
        id: ConnectionId,
        reusable: bool,
        now: Instant,
        factory: &mut ConnectionFactory,
    ) {
        if let Some(conn) = self.connection_mut(id) {
            conn.touch(now);
            match conn.state() {
                // Close was requested while Active; the worker performs
                // the protocol goodbye next.
                ConnectionState::Closing => {
                    conn.set_state(ConnectionState::WaitingForProtocolShutdown)
                }
                _ if reusable => conn.set_state(ConnectionState::Idle),
                _ => conn.set_state(ConnectionState::Closing),
            }
        }
        // The freed connection serves the oldest pending request first.
        self.flush(factory);
    }

    pub(crate) fn on_open_failed(&mut self, id: ConnectionId, factory: &mut ConnectionFactory) {
        if let Some(pos) = self.connections.iter().position(|c| c.id() == id) {
            let mut conn = self.connections.remove(pos);
            conn.set_state(ConnectionState::ClosedForResend);
        }
        self.flush(factory);
    }

    pub(crate) fn on_closed(&mut self, id: ConnectionId, factory: &mut ConnectionFactory) {
        if let Some(pos) = self.connections.iter().position(|c| c.id() == id) {
            let mut conn = self.connections.remove(pos);
            conn.set_state(ConnectionState::Closed);
        }
        self.flush(factory);
    }

    /// Administrative sweep: gracefully close every currently idle
    /// connection. Active connections are never touched.
    pub(crate) fn remove_all_idle(&mut self) {
        for conn in &mut self.connections {
            if conn.state() == ConnectionState::Idle {
                conn.request_close(true);
            }
        }
    }

    /// Timeout sweep: close idle connections whose last activity exceeds
    /// `max_idle`.
    pub(crate) fn close_idle_older_than(&mut self, max_idle: Duration, now: Instant) {
        for conn in &mut self.connections {
            if conn.state() == ConnectionState::Idle && conn.idle_for(now) > max_idle {
                tracing::debug!(connection = conn.id(), "closing idle connection past timeout");
                conn.request_close(true);
            }
        }
    }

    /// Fail queued requests and signal graceful close to every connection.
    /// Active workers finish their current request first because the close
    /// command queues behind it.
    pub(crate) fn shutdown(&mut self) {
        while let Some(mut request) = self.pending.pop_front() {
            request.complete(Err(NetError::PoolShuttingDown));
        }
        for conn in &mut self.connections {
            match conn.state() {
                ConnectionState::Closing
                | ConnectionState::WaitingForProtocolShutdown
                | ConnectionState::Closed => {}
                _ => conn.request_close(true),
            }
        }
    }

    /// True when nothing references this pool anymore and it can be pruned.
    pub(crate) fn is_drained(&self) -> bool {
        self.connections.is_empty() && self.pending.is_empty()
    }
}
