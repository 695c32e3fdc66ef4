//! The secure-transport contract.
//!
//! The pool never performs handshakes itself: it consumes a [`Connector`]
//! that yields a duplex byte stream plus the single negotiated
//! application-protocol name. TLS-capable connectors are injected by the
//! embedder; [`tcp::TcpConnector`] is the bundled plaintext default.

pub mod tcp;

use crate::base::error::NetError;
use crate::pool::address::HostAddress;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

/// A connected duplex byte stream (plain TCP or an encrypted wrapper).
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TransportStream for T {}

/// Result of a successful transport setup.
pub struct EstablishedTransport {
    pub stream: Box<dyn TransportStream>,
    /// Negotiated application protocol name (e.g. the ALPN result).
    pub protocol: String,
}

impl std::fmt::Debug for EstablishedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstablishedTransport").field("protocol", &self.protocol).finish()
    }
}

/// Transport setup capability: resolution, connect, and whatever secure
/// handshake the address requires.
///
/// Failures are classified through [`NetError::is_transient`]: a transient
/// failure requeues the connection's held request, a fatal one fails it.
pub trait Connector: Send + Sync + 'static {
    fn establish(
        &self,
        address: HostAddress,
        protocols: Vec<String>,
    ) -> BoxFuture<'static, Result<EstablishedTransport, NetError>>;
}
