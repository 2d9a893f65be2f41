//! Outbound pipeline
//!
//! Once per production interval the client picks a measurement from the
//! catalog, records it locally and fans the resulting packet out to every
//! peer. Each peer gets its own send task, so a silent peer never holds up
//! the loop or the other peers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sensnet_core::{CatalogError, MeasurementPacket, MeasurementSource, PacketId, is_confirmation};
use sensnet_transport::{DatagramTransport, TransportError};

use crate::config::TimingConfig;
use crate::error::NodeResult;
use crate::retry::{RetryPolicy, retry};
use crate::state::NodeState;

/// Room for a confirmation plus a little slack
const ACK_BUFFER_SIZE: usize = 64;

/// Final state of one peer send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The peer confirmed receipt
    Acknowledged,
    /// The datagram went out but no confirmation arrived in time
    Unacknowledged,
    /// Every send attempt failed
    SendFailed,
}

/// Produces measurements and sends them to every peer
pub struct Client {
    name: String,
    state: Arc<NodeState>,
    transport: Arc<dyn DatagramTransport>,
    source: Arc<dyn MeasurementSource>,
    peers: Arc<[SocketAddr]>,
    timing: TimingConfig,
    started: Instant,
    next_sequence: u64,
}

impl Client {
    pub fn new(
        name: impl Into<String>,
        state: Arc<NodeState>,
        transport: Arc<dyn DatagramTransport>,
        source: Arc<dyn MeasurementSource>,
        peers: impl IntoIterator<Item = SocketAddr>,
        timing: TimingConfig,
        started: Instant,
    ) -> Self {
        Self {
            name: name.into(),
            state,
            transport,
            source,
            peers: peers.into_iter().collect(),
            timing,
            started,
            next_sequence: 0,
        }
    }

    /// Spawn the production loop
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Produce and send until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(peers = self.peers.len(), "Client producing");

        loop {
            match self.produce() {
                Ok(packet) => {
                    if let Err(e) = self.dispatch(&packet) {
                        warn!(id = %packet.id, error = %e, "Failed to dispatch packet");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to produce measurement"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.timing.production_interval) => {}
            }
        }

        info!(produced = self.next_sequence, "Client stopped");
    }

    /// Record the current catalog entry locally and wrap it in a packet
    ///
    /// The catalog position is the number of whole seconds since the node
    /// started, wrapped around the catalog size.
    pub fn produce(&mut self) -> NodeResult<MeasurementPacket> {
        let position = self.started.elapsed().as_secs() as usize;
        let measurement = self
            .source
            .get_wrapping(position)
            .ok_or(CatalogError::Empty)?;

        let stamp = self.state.record_local(measurement)?;
        let id = PacketId::new(self.name.clone(), self.next_sequence);
        self.next_sequence += 1;

        debug!(%id, position, scalar = %stamp.scalar, vector = %stamp.vector, "Produced measurement");
        Ok(MeasurementPacket::new(
            id,
            measurement,
            stamp.scalar,
            stamp.vector,
        ))
    }

    /// Encode `packet` once and start one send task per peer
    pub fn dispatch(&self, packet: &MeasurementPacket) -> NodeResult<Vec<JoinHandle<SendOutcome>>> {
        let payload: Arc<[u8]> = packet.to_bytes()?.into();

        let handles = self
            .peers
            .iter()
            .map(|&peer| {
                let transport = self.transport.clone();
                let payload = payload.clone();
                let policy = self.timing.retry_policy();
                let ack_timeout = self.timing.ack_timeout;
                let id = packet.id.clone();
                tokio::spawn(async move {
                    let outcome =
                        send_with_ack(transport.as_ref(), &payload, peer, policy, ack_timeout).await;
                    match outcome {
                        SendOutcome::Acknowledged => debug!(%id, %peer, "Peer confirmed packet"),
                        SendOutcome::Unacknowledged => {
                            warn!(%id, %peer, "No confirmation from peer, giving up")
                        }
                        SendOutcome::SendFailed => warn!(%id, %peer, "Could not send packet"),
                    }
                    outcome
                })
            })
            .collect();

        Ok(handles)
    }
}

/// Send `payload` to `peer` and wait for a confirmation, both with retries
///
/// The send phase and the acknowledgement phase each get the full retry
/// budget. The transport is shared, so a confirmation meant for another
/// send task may satisfy this one.
pub async fn send_with_ack(
    transport: &dyn DatagramTransport,
    payload: &[u8],
    peer: SocketAddr,
    policy: RetryPolicy,
    ack_timeout: Duration,
) -> SendOutcome {
    let sent = retry(policy, "send", || async move {
        transport.send_to(payload, peer).await.map(|_| true)
    })
    .await;
    if !sent {
        return SendOutcome::SendFailed;
    }

    let acknowledged = retry(policy, "ack", || async move {
        let mut buf = [0u8; ACK_BUFFER_SIZE];
        let (len, _) = transport.recv_from(&mut buf, ack_timeout).await?;
        Ok::<bool, TransportError>(is_confirmation(&buf[..len]))
    })
    .await;

    if acknowledged {
        SendOutcome::Acknowledged
    } else {
        SendOutcome::Unacknowledged
    }
}
