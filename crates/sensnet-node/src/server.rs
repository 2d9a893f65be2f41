//! Inbound pipeline
//!
//! The listening loop blocks on the socket for at most the accept timeout,
//! then re-checks for shutdown. Each received datagram is handed to a worker
//! task; a semaphore bounds how many workers run at once.
//!
//! A worker confirms receipt before it decodes anything. Confirming first
//! lets the sender stop retrying even when the packet is a duplicate or
//! turns out to be malformed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use sensnet_core::{MeasurementPacket, PacketId, RECEIVE_CONFIRMATION};
use sensnet_transport::{DatagramTransport, TransportError};

use crate::config::TimingConfig;
use crate::error::NodeResult;
use crate::state::NodeState;

/// What happened to one inbound datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// First copy of the packet; stored in the window
    Stored(PacketId),
    /// A packet id seen before; confirmed but not stored again
    Duplicate(PacketId),
}

/// Receives measurement packets and folds them into the node state
pub struct Server {
    state: Arc<NodeState>,
    transport: Arc<dyn DatagramTransport>,
    /// Ids of every packet already stored
    seen: DashSet<PacketId>,
    workers: Arc<Semaphore>,
    accept_timeout: Duration,
    max_datagram_size: usize,
}

impl Server {
    pub fn new(
        state: Arc<NodeState>,
        transport: Arc<dyn DatagramTransport>,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            state,
            transport,
            seen: DashSet::new(),
            workers: Arc::new(Semaphore::new(timing.worker_pool_size)),
            accept_timeout: timing.accept_timeout,
            max_datagram_size: timing.max_datagram_size,
        }
    }

    /// Number of distinct packets stored so far
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Spawn the listening loop
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<NodeResult<()>> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Listen until cancelled or until the socket fails
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> NodeResult<()> {
        let mut buf = vec![0u8; self.max_datagram_size];
        info!("Server listening");

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.transport.recv_from(&mut buf, self.accept_timeout) => result,
            };

            match received {
                Ok((len, source)) => {
                    let permit = tokio::select! {
                        _ = cancel.cancelled() => break,
                        permit = self.workers.clone().acquire_owned() => permit,
                    };
                    let Ok(permit) = permit else {
                        break;
                    };

                    let data = buf[..len].to_vec();
                    let server = self.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = server.handle_datagram(&data, source).await {
                            warn!(%source, error = %e, "Rejected inbound datagram");
                        }
                    });
                }
                Err(TransportError::Timeout) => continue,
                Err(e) => {
                    error!(error = %e, "Listening socket failed");
                    return Err(e.into());
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    /// Confirm, decode, de-duplicate and store one datagram
    pub async fn handle_datagram(&self, data: &[u8], source: SocketAddr) -> NodeResult<Delivery> {
        if let Err(e) = self
            .transport
            .send_to(RECEIVE_CONFIRMATION.as_bytes(), source)
            .await
        {
            debug!(%source, error = %e, "Failed to send confirmation");
        }

        let packet = MeasurementPacket::from_bytes(data)?;
        trace!(%packet, %source, "Received packet");

        if !self.seen.insert(packet.id.clone()) {
            debug!(id = %packet.id, "Duplicate packet ignored");
            return Ok(Delivery::Duplicate(packet.id));
        }

        let MeasurementPacket {
            id,
            measurement,
            scalar_timestamp,
            vector_timestamp,
        } = packet;

        if let Err(e) = self
            .state
            .record_and_store(measurement, scalar_timestamp, vector_timestamp)
        {
            error!(%id, error = %e, "Packet clock incompatible with this network");
            return Err(e.into());
        }

        debug!(%id, "Stored remote measurement");
        Ok(Delivery::Stored(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensnet_core::{Measurement, ScalarTimestamp, VectorTimestamp, is_confirmation};
    use sensnet_transport::MockNetwork;

    use crate::error::NodeError;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn packet(sequence: u64, vector: Vec<u64>) -> Vec<u8> {
        MeasurementPacket::new(
            PacketId::new("node-a", sequence),
            Measurement::new(18, 1001, 60).with_co(Some(12)),
            ScalarTimestamp::new(3),
            VectorTimestamp::from_counters(vector),
        )
        .to_bytes()
        .unwrap()
    }

    fn server(network: &MockNetwork, total_nodes: usize) -> Server {
        let socket = network.bind_socket(addr(7000)).unwrap();
        Server::new(
            Arc::new(NodeState::new(1, total_nodes)),
            Arc::new(socket),
            &TimingConfig::testing(),
        )
    }

    #[tokio::test]
    async fn test_duplicate_is_confirmed_but_not_stored() {
        let network = MockNetwork::new();
        let sender = network.bind_socket(addr(7001)).unwrap();
        let server = server(&network, 2);

        let first = server.handle_datagram(&packet(0, vec![1, 0]), addr(7001)).await.unwrap();
        let again = server.handle_datagram(&packet(0, vec![1, 0]), addr(7001)).await.unwrap();

        assert!(matches!(first, Delivery::Stored(_)));
        assert!(matches!(again, Delivery::Duplicate(_)));
        assert_eq!(server.state.window_len(), 1);
        assert_eq!(server.seen_count(), 1);

        let mut buf = [0u8; 64];
        for _ in 0..2 {
            let (len, _) = sender
                .recv_from(&mut buf, Duration::from_secs(1))
                .await
                .unwrap();
            assert!(is_confirmation(&buf[..len]));
        }
    }

    #[tokio::test]
    async fn test_malformed_packet_is_confirmed_then_rejected() {
        let network = MockNetwork::new();
        let sender = network.bind_socket(addr(7001)).unwrap();
        let server = server(&network, 2);

        let err = server.handle_datagram(b"\xff\xff\xff", addr(7001)).await.unwrap_err();
        assert!(matches!(err, NodeError::Codec(_)));
        assert_eq!(server.state.window_len(), 0);

        let mut buf = [0u8; 64];
        let (len, _) = sender
            .recv_from(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(is_confirmation(&buf[..len]));
    }

    #[tokio::test]
    async fn test_wrong_vector_length_rejected() {
        let network = MockNetwork::new();
        let server = server(&network, 3);

        let err = server
            .handle_datagram(&packet(0, vec![1, 0]), addr(7001))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Clock(_)));
        assert_eq!(server.state.window_len(), 0);
        assert_eq!(server.state.event_count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let network = MockNetwork::new();
        let server = Arc::new(server(&network, 2));
        let cancel = CancellationToken::new();

        let handle = server.clone().spawn(cancel.clone());
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
