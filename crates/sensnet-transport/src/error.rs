//! Error types for the transport layer

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors related to datagram transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// No datagram arrived within the receive window. Routine, not a failure.
    #[error("Receive timed out")]
    Timeout,

    #[error("Transport I/O error: {0}")]
    Io(String),

    #[error("Transport closed")]
    Closed,

    #[error("Address already in use: {0}")]
    AddrInUse(SocketAddr),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Invalid transport configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// True for the routine receive timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
            _ => TransportError::Io(e.to_string()),
        }
    }
}

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
