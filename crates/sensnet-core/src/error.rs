//! Error types for Sensnet core

use thiserror::Error;

/// Errors related to logical clocks
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    /// Two vector timestamps of different length met in a merge or a
    /// checked comparison.
    #[error("Invalid timestamp cardinality: expected {expected}, got {actual}")]
    CardinalityMismatch { expected: usize, actual: usize },

    #[error("Component index {index} out of range for vector of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Errors related to encoding and decoding wire packets
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Decoding failed: {0}")]
    Decode(String),

    #[error("Malformed packet id: {0}")]
    MalformedPacketId(String),
}

impl From<postcard::Error> for CodecError {
    fn from(e: postcard::Error) -> Self {
        CodecError::Decode(e.to_string())
    }
}

/// Errors related to parsing a single measurement row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseMeasurementError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Errors related to loading a measurement catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed measurement on line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Measurement catalog is empty")]
    Empty,
}
