//! UDP socket with simulated loss and delay
//!
//! Wraps a [`tokio::net::UdpSocket`]. Every outbound datagram is rolled
//! against the [`LossModel`]: dropped datagrams vanish without an error,
//! delayed ones are handed to a background task that sleeps and then sends.
//! Inbound traffic is passed through untouched.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{trace, warn};

use crate::datagram::{DatagramBinder, DatagramTransport, LossModel, check_payload};
use crate::error::{TransportError, TransportResult};

/// A UDP socket that drops and delays outbound datagrams
#[derive(Debug, Clone)]
pub struct SimulatedUdpSocket {
    socket: Arc<UdpSocket>,
    loss: LossModel,
}

impl SimulatedUdpSocket {
    /// Bind a socket to `addr` with the given loss model
    pub async fn bind(addr: SocketAddr, loss: LossModel) -> TransportResult<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::AddrInUse => TransportError::AddrInUse(addr),
            _ => TransportError::from(e),
        })?;
        Ok(Self {
            socket: Arc::new(socket),
            loss,
        })
    }

    /// The loss model applied to outbound datagrams
    pub fn loss_model(&self) -> LossModel {
        self.loss
    }

    fn roll(&self) -> Option<Duration> {
        self.loss
            .sample(rand::random::<f64>(), rand::random::<f64>())
    }
}

#[async_trait]
impl DatagramTransport for SimulatedUdpSocket {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> TransportResult<()> {
        check_payload(data)?;
        let Some(delay) = self.roll() else {
            trace!(%target, len = data.len(), "Simulated loss: datagram dropped");
            return Ok(());
        };

        if delay.is_zero() {
            self.socket.send_to(data, target).await?;
            return Ok(());
        }

        let socket = self.socket.clone();
        let payload = data.to_vec();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = socket.send_to(&payload, target).await {
                warn!(%target, error = %e, "Delayed datagram send failed");
            }
        });
        Ok(())
    }

    async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransportResult<(usize, SocketAddr)> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// Binds [`SimulatedUdpSocket`]s sharing one loss model
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpBinder {
    loss: LossModel,
}

impl UdpBinder {
    pub fn new(loss: LossModel) -> Self {
        Self { loss }
    }
}

#[async_trait]
impl DatagramBinder for UdpBinder {
    async fn bind(&self, addr: SocketAddr) -> TransportResult<Arc<dyn DatagramTransport>> {
        Ok(Arc::new(SimulatedUdpSocket::bind(addr, self.loss).await?))
    }
}
