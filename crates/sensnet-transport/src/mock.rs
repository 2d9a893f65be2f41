//! In-memory datagram network for testing
//!
//! A [`MockNetwork`] routes datagrams between [`MockSocket`] endpoints over
//! channels, applying the same [`LossModel`] as the UDP socket plus an
//! optional duplication rate. A seeded RNG keeps lossy runs reproducible.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sensnet_transport::{DatagramBinder, DatagramTransport, MockNetwork};
//!
//! let network = MockNetwork::new();
//! let a = network.bind("127.0.0.1:9000".parse()?).await?;
//! let b = network.bind("127.0.0.1:9001".parse()?).await?;
//!
//! a.send_to(b"hello", b.local_addr()?).await?;
//! let mut buf = [0u8; 64];
//! let (len, from) = b.recv_from(&mut buf, Duration::from_secs(1)).await?;
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::trace;

use crate::datagram::{DatagramBinder, DatagramTransport, LossModel, check_payload};
use crate::error::{TransportError, TransportResult};

/// First port handed out for ephemeral binds
const EPHEMERAL_PORT_START: u16 = 49152;

/// A datagram in flight
#[derive(Debug, Clone)]
struct Datagram {
    source: SocketAddr,
    data: Vec<u8>,
}

/// Fault model for a [`MockNetwork`]
#[derive(Debug, Clone)]
pub struct MockNetworkConfig {
    /// Loss and delay applied to every datagram
    pub loss: LossModel,
    /// Probability in `[0, 1]` that a delivered datagram arrives twice
    pub duplicate_rate: f64,
    /// RNG seed for loss, delay and duplication rolls
    pub seed: u64,
}

impl Default for MockNetworkConfig {
    fn default() -> Self {
        Self {
            loss: LossModel::lossless(),
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

/// Delivery counters for a [`MockNetwork`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockNetworkStats {
    /// Datagrams handed to `send_to`
    pub sent: u64,
    /// Datagrams dropped by the loss model
    pub dropped: u64,
    /// Extra copies injected by duplication
    pub duplicated: u64,
    /// Datagrams addressed to an unbound endpoint
    pub unroutable: u64,
}

struct NetworkInner {
    endpoints: DashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    config: MockNetworkConfig,
    rng: Mutex<StdRng>,
    next_port: AtomicU16,
    sent: AtomicU64,
    dropped: AtomicU64,
    duplicated: AtomicU64,
    unroutable: AtomicU64,
}

impl NetworkInner {
    /// Roll loss, delay and duplication for one datagram
    fn roll(&self) -> Option<(Duration, bool)> {
        let mut rng = self.rng.lock();
        let drop_roll: f64 = rng.random();
        let delay_roll: f64 = rng.random();
        let dup_roll: f64 = rng.random();
        let delay = self.config.loss.sample(drop_roll, delay_roll)?;
        Some((delay, dup_roll < self.config.duplicate_rate))
    }

    fn deliver(&self, target: SocketAddr, datagram: Datagram) {
        match self.endpoints.get(&target) {
            Some(inbox) => {
                // A closed inbox means the endpoint is being torn down
                let _ = inbox.send(datagram);
            }
            None => {
                self.unroutable.fetch_add(1, Ordering::Relaxed);
                trace!(%target, "No endpoint bound, datagram vanished");
            }
        }
    }
}

/// An in-memory network of datagram endpoints
///
/// Cloning shares the same network.
#[derive(Clone)]
pub struct MockNetwork {
    inner: Arc<NetworkInner>,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetwork {
    /// A lossless, delay-free network
    pub fn new() -> Self {
        Self::with_config(MockNetworkConfig::default())
    }

    /// A network with the given fault model
    pub fn with_config(config: MockNetworkConfig) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                endpoints: DashMap::new(),
                rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
                config,
                next_port: AtomicU16::new(EPHEMERAL_PORT_START),
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                duplicated: AtomicU64::new(0),
                unroutable: AtomicU64::new(0),
            }),
        }
    }

    /// Bind a concrete endpoint
    ///
    /// Port `0` picks the next free ephemeral port on the given IP.
    pub fn bind_socket(&self, addr: SocketAddr) -> TransportResult<MockSocket> {
        let addr = if addr.port() == 0 {
            self.ephemeral_addr(addr.ip())?
        } else {
            addr
        };

        let (tx, rx) = mpsc::unbounded_channel();
        match self.inner.endpoints.entry(addr) {
            Entry::Occupied(_) => return Err(TransportError::AddrInUse(addr)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        Ok(MockSocket {
            addr,
            network: self.inner.clone(),
            inbox: AsyncMutex::new(rx),
        })
    }

    fn ephemeral_addr(&self, ip: IpAddr) -> TransportResult<SocketAddr> {
        let ip = if ip.is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            ip
        };
        for _ in EPHEMERAL_PORT_START..=u16::MAX {
            let port = self.inner.next_port.fetch_add(1, Ordering::Relaxed);
            let port = if port < EPHEMERAL_PORT_START {
                // Wrapped around
                self.inner
                    .next_port
                    .store(EPHEMERAL_PORT_START + 1, Ordering::Relaxed);
                EPHEMERAL_PORT_START
            } else {
                port
            };
            let candidate = SocketAddr::new(ip, port);
            if !self.inner.endpoints.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(TransportError::Io("ephemeral ports exhausted".into()))
    }

    /// True if an endpoint is bound at `addr`
    pub fn is_bound(&self, addr: &SocketAddr) -> bool {
        self.inner.endpoints.contains_key(addr)
    }

    /// Snapshot of the delivery counters
    pub fn stats(&self) -> MockNetworkStats {
        MockNetworkStats {
            sent: self.inner.sent.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            duplicated: self.inner.duplicated.load(Ordering::Relaxed),
            unroutable: self.inner.unroutable.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl DatagramBinder for MockNetwork {
    async fn bind(&self, addr: SocketAddr) -> TransportResult<Arc<dyn DatagramTransport>> {
        Ok(Arc::new(self.bind_socket(addr)?))
    }
}

/// One endpoint on a [`MockNetwork`]
///
/// Dropping the socket unbinds its address.
pub struct MockSocket {
    addr: SocketAddr,
    network: Arc<NetworkInner>,
    inbox: AsyncMutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl MockSocket {
    /// Inject a datagram as if it came from `source`, bypassing the fault model
    pub fn inject(&self, source: SocketAddr, data: Vec<u8>) {
        self.network.deliver(self.addr, Datagram { source, data });
    }
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.network.endpoints.remove(&self.addr);
    }
}

#[async_trait]
impl DatagramTransport for MockSocket {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> TransportResult<()> {
        check_payload(data)?;
        let network = &self.network;
        network.sent.fetch_add(1, Ordering::Relaxed);

        let Some((delay, duplicate)) = network.roll() else {
            network.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(source = %self.addr, %target, "Mock loss: datagram dropped");
            return Ok(());
        };

        let datagram = Datagram {
            source: self.addr,
            data: data.to_vec(),
        };
        let copies = if duplicate {
            network.duplicated.fetch_add(1, Ordering::Relaxed);
            2
        } else {
            1
        };

        if delay.is_zero() {
            for _ in 0..copies {
                network.deliver(target, datagram.clone());
            }
        } else {
            let network = network.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                for _ in 0..copies {
                    network.deliver(target, datagram.clone());
                }
            });
        }
        Ok(())
    }

    async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransportResult<(usize, SocketAddr)> {
        // Waiting for the inbox lock and for a datagram share one deadline.
        let deadline = tokio::time::Instant::now() + timeout;
        let mut inbox = match tokio::time::timeout_at(deadline, self.inbox.lock()).await {
            Ok(guard) => guard,
            Err(_) => return Err(TransportError::Timeout),
        };
        let datagram = match tokio::time::timeout_at(deadline, inbox.recv()).await {
            Ok(Some(datagram)) => datagram,
            Ok(None) => return Err(TransportError::Closed),
            Err(_) => return Err(TransportError::Timeout),
        };

        let len = datagram.data.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram.data[..len]);
        Ok((len, datagram.source))
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.addr)
    }
}
