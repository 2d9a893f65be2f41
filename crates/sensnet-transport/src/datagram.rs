//! Datagram transport abstraction
//!
//! The [`DatagramTransport`] trait is the only thing the node needs from the
//! network: send a datagram to an address, and receive one with a timeout.
//! Loss and delay are properties of the implementation; callers see drops
//! as receive timeouts and delay as added latency.
//!
//! ## Implementations
//!
//! - [`SimulatedUdpSocket`](crate::udp::SimulatedUdpSocket): real UDP with injected loss and delay
//! - [`MockSocket`](crate::mock::MockSocket): in-memory endpoint on a [`MockNetwork`](crate::mock::MockNetwork)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{TransportError, TransportResult};

/// Largest payload a single UDP datagram over IPv4 can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Reject payloads no datagram can carry
pub(crate) fn check_payload(data: &[u8]) -> TransportResult<()> {
    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(TransportError::PayloadTooLarge {
            size: data.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(())
}

/// Packet-oriented send/receive primitive
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Send one datagram to `target`
    ///
    /// A datagram silently dropped by the transport still returns `Ok`.
    /// Payloads above [`MAX_DATAGRAM_SIZE`] fail with
    /// [`TransportError::PayloadTooLarge`].
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> TransportResult<()>;

    /// Receive one datagram into `buf`, waiting at most `timeout`
    ///
    /// Returns the number of bytes written and the source address. Datagrams
    /// longer than `buf` are truncated. Returns [`TransportError::Timeout`]
    /// when nothing arrives in time.
    async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransportResult<(usize, SocketAddr)>;

    /// The address this transport is bound to
    fn local_addr(&self) -> TransportResult<SocketAddr>;
}

/// Creates bound transports
///
/// The node binds one transport for its listening port and one ephemeral
/// transport for outbound sends.
#[async_trait]
pub trait DatagramBinder: Send + Sync {
    /// Bind a transport to `addr`. Port `0` picks an ephemeral port.
    async fn bind(&self, addr: SocketAddr) -> TransportResult<Arc<dyn DatagramTransport>>;
}

/// Simulated packet loss and delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossModel {
    /// Probability in `[0, 1]` that a datagram is silently dropped
    pub loss_rate: f64,
    /// Mean extra latency; actual delay is uniform in `[0, 2 * average_delay]`
    pub average_delay: Duration,
}

impl Default for LossModel {
    fn default() -> Self {
        Self::lossless()
    }
}

impl LossModel {
    /// Create a validated loss model
    pub fn new(loss_rate: f64, average_delay: Duration) -> TransportResult<Self> {
        if !(0.0..=1.0).contains(&loss_rate) {
            return Err(TransportError::InvalidConfig(format!(
                "loss rate must be within [0, 1], got {}",
                loss_rate
            )));
        }
        Ok(Self {
            loss_rate,
            average_delay,
        })
    }

    /// No loss, no delay
    pub fn lossless() -> Self {
        Self {
            loss_rate: 0.0,
            average_delay: Duration::ZERO,
        }
    }

    /// Decide the fate of one datagram from two uniform samples in `[0, 1)`
    ///
    /// Returns `None` if the datagram is dropped, otherwise the delay to
    /// apply before delivery.
    pub fn sample(&self, drop_roll: f64, delay_roll: f64) -> Option<Duration> {
        if drop_roll < self.loss_rate {
            return None;
        }
        Some(self.average_delay.mul_f64(2.0 * delay_roll))
    }
}
