use crate::base::error::NetError;
use crate::buffer::BufferPool;
use crate::event::{ConnectionEvent, EventSender, RequestEvent};
use crate::pool::address::HostAddress;
use crate::pool::Request;
use crate::transport::{Connector, TransportStream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use url::Url;

pub type ConnectionId = u64;

/// Lifecycle of one physical transport.
///
/// ```text
/// Initial -> Opening -> Active -> (Idle | Closing)
///     -> { Recycled | ClosedForResend | WaitingForProtocolShutdown | Closed }
/// ```
///
/// `Recycled` is the momentary hop an idle connection takes when the pool
/// hands it its next request; `ClosedForResend` marks teardown after a
/// transient handshake failure whose request was requeued. `Closed` is
/// terminal and removes the connection from its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initial,
    Opening,
    Active,
    Idle,
    Closing,
    Recycled,
    ClosedForResend,
    WaitingForProtocolShutdown,
    Closed,
}

/// Dispatch -> worker signalling. Commands queue behind the exchange in
/// progress, so a close request is observed at the next I/O boundary
/// rather than interrupting in-flight work.
pub(crate) enum WorkerCommand {
    Assign(Box<dyn Request>),
    Close { graceful: bool },
}

/// Dispatch-side record of one connection.
///
/// The transport stream itself lives on the worker task; this record holds
/// the state machine, timing metadata, and the command channel into the
/// worker. It is owned by exactly one variant pool and only mutated from
/// the dispatch context.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    address: HostAddress,
    created_at: Instant,
    last_activity_at: Instant,
    negotiated_protocol: Option<String>,
    last_processed_uri: Option<Url>,
    commands: mpsc::UnboundedSender<WorkerCommand>,
}

impl Connection {
    /// Admit a request: create the record and start the worker, which
    /// performs resolution and transport setup before running the request.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        id: ConnectionId,
        address: HostAddress,
        connector: Arc<dyn Connector>,
        protocols: Vec<String>,
        buffers: Arc<BufferPool>,
        events: EventSender<ConnectionEvent>,
        requests: EventSender<RequestEvent>,
        request: Box<dyn Request>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let now = Instant::now();
        let mut connection = Self {
            id,
            state: ConnectionState::Initial,
            address: address.clone(),
            created_at: now,
            last_activity_at: now,
            negotiated_protocol: None,
            last_processed_uri: Some(request.uri().clone()),
            commands,
        };

        let worker = ConnectionWorker {
            id,
            address,
            connector,
            protocols,
            buffers,
            commands: command_rx,
            events,
            requests,
        };
        tokio::spawn(worker.run(request));

        connection.state = ConnectionState::Opening;
        connection
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn address(&self) -> &HostAddress {
        &self.address
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// Negotiated application protocol, once `Opened` has been applied.
    pub fn negotiated_protocol(&self) -> Option<&str> {
        self.negotiated_protocol.as_deref()
    }

    /// Target of the most recently assigned request.
    pub fn last_processed_uri(&self) -> Option<&Url> {
        self.last_processed_uri.as_ref()
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub(crate) fn set_negotiated_protocol(&mut self, protocol: &str) {
        self.negotiated_protocol = Some(protocol.to_string());
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_activity_at = now;
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity_at)
    }

    /// Hand the worker its next request. On success the connection is
    /// Active; on failure (worker already gone) the request is returned to
    /// the caller for re-dispatch.
    pub(crate) fn assign(&mut self, request: Box<dyn Request>) -> Result<(), Box<dyn Request>> {
        self.last_processed_uri = Some(request.uri().clone());
        match self.commands.send(WorkerCommand::Assign(request)) {
            Ok(()) => {
                self.state = ConnectionState::Active;
                self.touch(Instant::now());
                Ok(())
            }
            Err(mpsc::error::SendError(command)) => match command {
                WorkerCommand::Assign(request) => Err(request),
                WorkerCommand::Close { .. } => unreachable!("assign sent a close command"),
            },
        }
    }

    /// Reclaim an idle connection for the next request.
    pub(crate) fn recycle(&mut self, request: Box<dyn Request>) -> Result<(), Box<dyn Request>> {
        self.state = ConnectionState::Recycled;
        self.assign(request)
    }

    /// Signal the worker to close. Cooperative: the worker observes the
    /// command at its next I/O boundary, after any exchange in progress.
    pub(crate) fn request_close(&mut self, graceful: bool) {
        let _ = self.commands.send(WorkerCommand::Close { graceful });
        self.state = ConnectionState::Closing;
    }
}

/// The worker half: owns the transport stream and blocks only on socket
/// I/O. All pool state it affects is reported as events, never mutated
/// directly.
struct ConnectionWorker {
    id: ConnectionId,
    address: HostAddress,
    connector: Arc<dyn Connector>,
    protocols: Vec<String>,
    buffers: Arc<BufferPool>,
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: EventSender<ConnectionEvent>,
    requests: EventSender<RequestEvent>,
}

impl ConnectionWorker {
    async fn run(mut self, first: Box<dyn Request>) {
        let mut pending = Some(first);

        let mut stream = match self
            .connector
            .establish(self.address.clone(), self.protocols.clone())
            .await
        {
            Ok(transport) => {
                self.events.send(ConnectionEvent::Opened {
                    id: self.id,
                    protocol: transport.protocol,
                });
                transport.stream
            }
            Err(error) => {
                if let Some(mut request) = pending.take() {
                    if error.is_transient() {
                        self.requests.send(RequestEvent::Resend { request });
                    } else {
                        request.complete(Err(error));
                        self.requests.send(RequestEvent::Failed { id: request.id(), error });
                    }
                }
                self.events.send(ConnectionEvent::OpenFailed { id: self.id, error });
                return;
            }
        };

        loop {
            if let Some(mut request) = pending.take() {
                match request.exchange(stream.as_mut(), &self.buffers).await {
                    Ok(outcome) => {
                        let id = request.id();
                        request.complete(Ok(()));
                        self.requests.send(RequestEvent::Completed { id });
                        self.events.send(ConnectionEvent::RequestFinished {
                            id: self.id,
                            reusable: outcome.reusable,
                        });
                        if !outcome.reusable {
                            let _ = stream.shutdown().await;
                            self.events.send(ConnectionEvent::Closed { id: self.id, error: None });
                            return;
                        }
                    }
                    Err(error) => {
                        // The held request is requeued exactly once for
                        // this closure; retry policy is applied upstream.
                        self.requests.send(RequestEvent::Resend { request });
                        self.events.send(ConnectionEvent::Closed {
                            id: self.id,
                            error: Some(error),
                        });
                        return;
                    }
                }
            }

            match self.commands.recv().await {
                Some(WorkerCommand::Assign(request)) => pending = Some(request),
                Some(WorkerCommand::Close { graceful }) => {
                    if graceful {
                        let _ = stream.shutdown().await;
                    }
                    self.events.send(ConnectionEvent::Closed { id: self.id, error: None });
                    return;
                }
                None => {
                    // Dispatch side dropped; nothing left to serve.
                    self.events.send(ConnectionEvent::Closed { id: self.id, error: None });
                    return;
                }
            }
        }
    }
}
