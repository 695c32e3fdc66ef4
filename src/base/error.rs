use std::io;
use thiserror::Error;

/// Network error taxonomy for the transport-management core.
///
/// Connection-level variants describe why a transport died; request-level
/// variants surface through the request completion callback. Whether a
/// failure tears down a connection but allows the request to be resent is
/// decided by [`NetError::is_transient`].
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("Transport handshake failed")]
    HandshakeFailed,
    #[error("Protocol negotiation failed")]
    NegotiationFailed,
    #[error("Protocol downgrade detected")]
    ProtocolDowngraded,
    #[error("Tunnel connection failed")]
    TunnelConnectionFailed,

    // Request / admission errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Too many retries")]
    TooManyRetries,
    #[error("Pool shutting down")]
    PoolShuttingDown,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    /// True for failures worth a resend on a fresh connection: the remote
    /// or the network interfered, the request itself is not at fault.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NetError::ConnectionClosed
                | NetError::ConnectionReset
                | NetError::ConnectionAborted
                | NetError::ConnectionTimedOut
                | NetError::ProtocolDowngraded
        )
    }

    /// Map an IO error from a socket operation onto the taxonomy.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
            io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            io::ErrorKind::NotConnected => NetError::SocketNotConnected,
            io::ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
            _ => NetError::ConnectionFailed,
        }
    }
}

/// Extension trait for converting IO Results at socket boundaries.
pub trait IoResultExt<T> {
    /// Map the IO error onto [`NetError`], logging the underlying cause.
    fn net_context(self, operation: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn net_context(self, operation: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            let mapped = NetError::from_io(&e);
            tracing::debug!(%operation, error = %e, "io error mapped to {mapped}");
            mapped
        })
    }
}
