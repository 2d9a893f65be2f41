//! # Sensnet Core
//!
//! Core types for a peer-to-peer sensor network that exchanges periodic
//! measurements over a lossy transport.
//!
//! ## Key Types
//!
//! - [`ScalarTimestamp`] / [`VectorTimestamp`]: logical clocks and their merge rule
//! - [`Measurement`]: an immutable set of sensor readings
//! - [`MeasurementPacket`]: the unit exchanged on the wire, identified by [`PacketId`]
//! - [`MeasurementSource`]: positional catalog of readings ([`CsvCatalog`], [`InMemoryCatalog`])

pub mod catalog;
pub mod clock;
pub mod error;
pub mod measurement;
pub mod packet;

// Re-export main types
pub use catalog::*;
pub use clock::*;
pub use error::*;
pub use measurement::*;
pub use packet::*;
