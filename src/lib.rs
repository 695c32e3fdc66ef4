//! # netpool
//!
//! A Chromium-inspired connection-management core for Rust HTTP(S) and
//! WebSocket clients.
//!
//! `netpool` decides, per remote host, how many physical connections may
//! exist, which connection serves which queued request, when a connection
//! is reused versus torn down, and how negotiated protocol capabilities
//! persist across process restarts.
//!
//! ## Features
//!
//! - **Per-variant pooling**: one pool per (host, port, security, proxy)
//!   tuple with a 6-connections-per-variant default cap
//! - **Connection lifecycle**: explicit state machine with idle recycling,
//!   graceful shutdown, and resend-on-closure semantics
//! - **Single-writer dispatch**: workers report transitions over event
//!   channels; one tick applies them, so pool state needs no locks
//! - **Pooled buffers**: size-bucketed allocator for the hot I/O path
//! - **Host metadata persistence**: versioned binary snapshot of per-host
//!   protocol support, loaded defensively
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use netpool::{NetworkSession, SessionConfig};
//!
//! let mut session = NetworkSession::new(SessionConfig::default());
//! session.load();
//! session.submit(my_request);
//! loop {
//!     session.tick(); // from the application's update loop
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error taxonomy, ring buffer, timer service
//! - [`buffer`] - Pooled byte-buffer allocator
//! - [`event`] - Worker-to-dispatch event channels
//! - [`pool`] - Variant pools, host records, registry, persistence
//! - [`session`] - The owned top-level session and its dispatch tick
//! - [`transport`] - Secure-transport contract and the plaintext connector

pub mod base;
pub mod buffer;
pub mod event;
pub mod pool;
pub mod session;
pub mod transport;

pub use base::error::NetError;
pub use buffer::{BufferPool, BufferView, PooledBuffer};
pub use pool::address::{HostAddress, ProxySettings};
pub use pool::connection::{Connection, ConnectionId, ConnectionState};
pub use pool::host::{HostRecord, ProtocolSupport};
pub use pool::registry::HostRegistry;
pub use pool::store::{DiskStore, FileStore, MemoryStore};
pub use pool::variant::VariantPool;
pub use pool::{ExchangeOutcome, Request, RequestId};
pub use session::{NetworkSession, SessionConfig};
pub use transport::tcp::TcpConnector;
pub use transport::{Connector, EstablishedTransport, TransportStream};
