//! Network session: the constructed, owned top level of the transport core.
//!
//! Bundles the host registry, both event channels, the timer service, and
//! the pooled buffer allocator into one object with explicit init and
//! teardown — there is no ambient global state. The host application drives
//! [`NetworkSession::tick`] from its update loop; that tick is the single
//! logical execution path that mutates pool and registry state.

use crate::base::error::NetError;
use crate::base::ring::RingBuffer;
use crate::base::timer::TimerService;
use crate::buffer::BufferPool;
use crate::event::{ConnectionEvent, EventChannel, RequestEvent};
use crate::pool::address::{HostAddress, ProxySettings};
use crate::pool::registry::HostRegistry;
use crate::pool::store::{DiskStore, FileStore};
use crate::pool::variant::{PoolLimits, VariantPool};
use crate::pool::{ConnectionFactory, Request};
use crate::transport::tcp::TcpConnector;
use crate::transport::Connector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// How many applied transitions the diagnostic trace remembers.
const EVENT_TRACE_CAPACITY: usize = 64;

/// Tunables for a [`NetworkSession`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Connection cap per (host, port, security, proxy) variant.
    pub max_connections_per_variant: usize,
    /// Cap for variant pools of hosts known to multiplex.
    pub max_connections_multiplexed: usize,
    /// Idle connections older than this are closed by the sweep.
    pub idle_timeout: Duration,
    /// How often the idle and buffer sweeps run.
    pub sweep_interval: Duration,
    /// Free pooled buffers unused for longer than this are evicted.
    pub buffer_idle_age: Duration,
    /// Application protocol preference order for transport negotiation.
    pub protocols: Vec<String>,
    /// Where the host registry snapshot is persisted.
    pub registry_path: PathBuf,
    /// Proxy applied to every request (None for direct connections).
    pub proxy: Option<ProxySettings>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_connections_per_variant: 6,
            max_connections_multiplexed: 12,
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            buffer_idle_age: Duration::from_secs(120),
            protocols: vec!["h2".to_string(), "http/1.1".to_string()],
            registry_path: PathBuf::from("known_hosts.bin"),
            proxy: None,
        }
    }
}

/// State reachable from timer callbacks and the dispatch tick.
struct SessionState {
    registry: HostRegistry,
    buffers: Arc<BufferPool>,
    config: SessionConfig,
    trace: RingBuffer<String>,
}

impl SessionState {
    fn limits(&self) -> PoolLimits {
        PoolLimits {
            per_variant: self.config.max_connections_per_variant,
            multiplexed: self.config.max_connections_multiplexed,
        }
    }
}

/// The transport-management core of a client.
///
/// Submitting a request routes it to the variant pool for its target;
/// connection workers report transitions on the event channels; `tick`
/// applies them. All administrative triggers (`save`, `load`,
/// `remove_all_idle_connections`, `shutdown`) are fire-and-forget.
pub struct NetworkSession {
    state: SessionState,
    factory: ConnectionFactory,
    connection_events: EventChannel<ConnectionEvent>,
    request_events: EventChannel<RequestEvent>,
    timers: TimerService<SessionState>,
}

impl fmt::Debug for NetworkSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkSession")
            .field("hosts", &self.state.registry.host_count())
            .field("connections", &self.state.registry.connection_count())
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl NetworkSession {
    /// Session with the bundled plaintext connector and real disk store.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_parts(config, Arc::new(TcpConnector), Arc::new(DiskStore))
    }

    /// Session with injected transport and storage capabilities.
    pub fn with_parts(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        store: Arc<dyn FileStore>,
    ) -> Self {
        let buffers = Arc::new(BufferPool::new());
        let connection_events = EventChannel::new();
        let request_events = EventChannel::new();
        let factory = ConnectionFactory::new(
            connector,
            config.protocols.clone(),
            Arc::clone(&buffers),
            connection_events.sender(),
            request_events.sender(),
        );
        let registry = HostRegistry::new(config.registry_path.clone(), store);

        let mut timers = TimerService::new();
        timers.schedule(config.sweep_interval, "idle-connection-sweep", true, |state: &mut SessionState| {
            let idle_timeout = state.config.idle_timeout;
            state.registry.close_idle_older_than(idle_timeout, Instant::now());
            true
        });
        timers.schedule(config.sweep_interval, "buffer-sweep", true, |state: &mut SessionState| {
            state.buffers.sweep(state.config.buffer_idle_age);
            true
        });

        Self {
            state: SessionState {
                registry,
                buffers,
                config,
                trace: RingBuffer::new(EVENT_TRACE_CAPACITY),
            },
            factory,
            connection_events,
            request_events,
            timers,
        }
    }

    /// Route a request: reuse an idle connection, open a new one under the
    /// cap, or queue it. Admission never fails; an unroutable target
    /// completes the request with `InvalidUrl`.
    pub fn submit(&mut self, request: Box<dyn Request>) {
        let mut request = request;
        let Some(address) = HostAddress::from_url(request.uri(), self.state.config.proxy.as_ref())
        else {
            request.complete(Err(NetError::InvalidUrl));
            return;
        };

        self.state.trace.push(format!("request {} -> {}", request.id(), address));
        let limits = self.state.limits();
        self.state.registry.submit(request, address, limits, &mut self.factory);
    }

    /// The dispatch tick: drain connection events, drain request events,
    /// poll timers, then flush queued requests against now-available
    /// connections. Never blocks; the host application calls this once per
    /// update-loop pass.
    pub fn tick(&mut self) {
        let now = Instant::now();

        for event in self.connection_events.drain() {
            let applied = catch_unwind(AssertUnwindSafe(|| self.apply_connection_event(event, now)));
            if applied.is_err() {
                tracing::error!("connection event handler panicked; event skipped");
            }
        }

        for event in self.request_events.drain() {
            let applied = catch_unwind(AssertUnwindSafe(|| self.apply_request_event(event)));
            if applied.is_err() {
                tracing::error!("request event handler panicked; event skipped");
            }
        }

        self.timers.poll(now, &mut self.state);
        self.try_to_send_queued_requests();
    }

    fn apply_connection_event(&mut self, event: ConnectionEvent, now: Instant) {
        match event {
            ConnectionEvent::Opened { id, protocol } => {
                if self.state.registry.on_connection_opened(id, &protocol, now) {
                    self.state.trace.push(format!("connection {id} active ({protocol})"));
                } else {
                    tracing::debug!(connection = id, "opened event for unknown connection");
                }
            }
            ConnectionEvent::OpenFailed { id, error } => {
                self.state.registry.on_connection_open_failed(id, &mut self.factory);
                self.state.trace.push(format!("connection {id} open failed: {error}"));
            }
            ConnectionEvent::RequestFinished { id, reusable } => {
                self.state.registry.on_request_finished(id, reusable, now, &mut self.factory);
                self.state.trace.push(format!("connection {id} finished request (reusable: {reusable})"));
            }
            ConnectionEvent::Closed { id, error } => {
                self.state.registry.on_connection_closed(id, &mut self.factory);
                match error {
                    Some(error) => self.state.trace.push(format!("connection {id} closed: {error}")),
                    None => self.state.trace.push(format!("connection {id} closed")),
                }
            }
        }
    }

    fn apply_request_event(&mut self, event: RequestEvent) {
        match event {
            RequestEvent::Completed { id } => {
                self.state.trace.push(format!("request {id} completed"));
            }
            RequestEvent::Failed { id, error } => {
                self.state.trace.push(format!("request {id} failed: {error}"));
            }
            RequestEvent::Resend { mut request } => {
                if request.take_retry() {
                    self.state.trace.push(format!("request {} resent", request.id()));
                    self.submit(request);
                } else {
                    self.state.trace.push(format!("request {} retry budget exhausted", request.id()));
                    request.complete(Err(NetError::TooManyRetries));
                }
            }
        }
    }

    /// Flush every pool's pending queue against available capacity.
    pub fn try_to_send_queued_requests(&mut self) {
        self.state.registry.flush_all(&mut self.factory);
    }

    /// Gracefully close every currently idle connection.
    pub fn remove_all_idle_connections(&mut self) {
        self.state.registry.remove_all_idle_connections();
    }

    /// Full teardown: fail queued requests, signal graceful close to every
    /// connection, discard unprocessed events and timers.
    pub fn shutdown(&mut self) {
        self.state.registry.shutdown();
        self.connection_events.clear();
        self.request_events.clear();
        self.timers.clear();
        self.state.trace.push("session shut down".to_string());
    }

    /// Persist host metadata. Fire-and-forget.
    pub fn save(&self) {
        self.state.registry.save();
    }

    /// Load persisted host metadata. Idempotent; never raises.
    pub fn load(&mut self) {
        self.state.registry.load();
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.state.registry
    }

    pub fn buffers(&self) -> &Arc<BufferPool> {
        &self.state.buffers
    }

    pub fn config(&self) -> &SessionConfig {
        &self.state.config
    }

    /// Variant pool serving a URL, if one exists yet.
    pub fn pool_for(&self, url: &Url) -> Option<&VariantPool> {
        let address = HostAddress::from_url(url, self.state.config.proxy.as_ref())?;
        self.state.registry.host(&address.host)?.pool(&address)
    }

    /// Queued requests for a URL's variant pool.
    pub fn pending_request_count(&self, url: &Url) -> usize {
        self.pool_for(url).map(|pool| pool.pending_count()).unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.state.registry.connection_count()
    }

    pub fn idle_connection_count(&self) -> usize {
        self.state.registry.idle_connection_count()
    }

    /// Recent applied transitions, oldest first. Bounded diagnostic trace.
    pub fn recent_events(&self) -> Vec<String> {
        self.state.trace.iter().cloned().collect()
    }
}
