//! # Sensnet Transport
//!
//! Unreliable datagram transport for Sensnet nodes.
//!
//! The node depends only on [`DatagramTransport`] (send to an address,
//! receive with a timeout) and [`DatagramBinder`] (bind a transport to an
//! address). Two implementations are provided:
//!
//! - [`SimulatedUdpSocket`] / [`UdpBinder`]: real UDP with a [`LossModel`]
//!   applied to outbound datagrams
//! - [`MockNetwork`] / [`MockSocket`]: in-memory channels with seeded loss,
//!   delay and duplication, for tests

pub mod datagram;
pub mod error;
pub mod mock;
pub mod udp;

pub use datagram::{DatagramBinder, DatagramTransport, LossModel, MAX_DATAGRAM_SIZE};
pub use error::{TransportError, TransportResult};
pub use mock::{MockNetwork, MockNetworkConfig, MockNetworkStats, MockSocket};
pub use udp::{SimulatedUdpSocket, UdpBinder};
