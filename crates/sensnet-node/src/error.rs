//! Error types for the sensor node

use thiserror::Error;

use sensnet_core::{CatalogError, ClockError, CodecError};
use sensnet_transport::TransportError;

/// Errors that can occur in a sensor node
#[derive(Debug, Error)]
pub enum NodeError {
    /// Vector timestamps of unequal length met in a merge
    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),

    /// Packet encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Measurement catalog error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background task panicked or was aborted
    #[error("Task error: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for NodeError {
    fn from(e: tokio::task::JoinError) -> Self {
        NodeError::Task(e.to_string())
    }
}

/// Result type alias for node operations
pub type NodeResult<T> = Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: NodeError = ClockError::CardinalityMismatch {
            expected: 3,
            actual: 4,
        }
        .into();
        assert!(matches!(err, NodeError::Clock(_)));
        assert!(format!("{}", err).contains("cardinality"));

        let err: NodeError = TransportError::Closed.into();
        assert!(matches!(err, NodeError::Transport(_)));

        let err: NodeError = CatalogError::Empty.into();
        assert!(matches!(err, NodeError::Catalog(_)));
    }

    #[test]
    fn test_config_error_display() {
        let err = NodeError::Config("index 3 out of range".to_string());
        assert!(format!("{}", err).contains("index 3"));
    }
}
