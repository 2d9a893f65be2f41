//! # Sensnet Node
//!
//! A sensor node that periodically produces measurements, exchanges them
//! with its peers over a lossy datagram transport and aggregates everything
//! it has seen over fixed time windows.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                         Node                         │
//! │                                                      │
//! │   Client ──record_local──┐      ┌──record_and_store── Server
//! │     │                    ▼      ▼                  │    ▲
//! │     │               ┌────────────────┐             │    │
//! │     │               │   NodeState    │             │    │
//! │     │               │ clocks + window│             │    │
//! │     │               └───────┬────────┘             │    │
//! │     ▼                       │ drain_window         │    │
//! │  send tasks            Aggregator ──► ReportSink   │    │
//! └─────┼──────────────────────────────────────────────┼────┘
//!       └──────── DatagramTransport (lossy) ───────────┘
//! ```
//!
//! The node owns three loops: the [`Server`] listening loop, the [`Client`]
//! production loop and the [`Aggregator`]. All three stop together when
//! [`Node::stop`] cancels the shared token, or when the listening socket
//! fails.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod server;
pub mod state;
pub mod window;

pub use aggregator::{Aggregator, ChannelReportSink, ReportSink, TracingReportSink};
pub use client::{Client, SendOutcome, send_with_ack};
pub use config::{NodeConfig, TimingConfig};
pub use error::{NodeError, NodeResult};
pub use retry::{RetryPolicy, retry};
pub use server::{Delivery, Server};
pub use state::{NodeState, Stamp};
pub use window::{Window, WindowReport};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, instrument};

use sensnet_core::{
    CatalogError, ClockError, Measurement, MeasurementSource, ScalarTimestamp, VectorTimestamp,
};
use sensnet_transport::DatagramBinder;

/// Where a node is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, loops not running
    Created,
    /// Loops running
    Running,
    /// Stopped, or the listening socket failed; a node cannot be restarted
    ShutDown,
}

/// Result of [`Node::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The node was already running or has been shut down
    AlreadyStarted,
}

/// Result of [`Node::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// The node was never started or is already shut down
    NotRunning,
}

#[derive(Debug)]
struct Status {
    lifecycle: Lifecycle,
    started_at: Option<DateTime<Utc>>,
    local_addr: Option<SocketAddr>,
}

#[derive(Default)]
struct Tasks {
    server: Option<JoinHandle<NodeResult<()>>>,
    client: Option<JoinHandle<()>>,
    aggregator: Option<JoinHandle<()>>,
}

/// A sensor node
///
/// Construct with [`Node::new`], then [`start`](Self::start) the loops and
/// later [`stop`](Self::stop) them. Clock and window state is shared with
/// the loops and can be inspected at any time.
pub struct Node {
    config: NodeConfig,
    state: Arc<NodeState>,
    source: Arc<dyn MeasurementSource>,
    binder: Arc<dyn DatagramBinder>,
    sink: Arc<dyn ReportSink>,
    status: Arc<RwLock<Status>>,
    /// Serialises start, stop and join
    tasks: Mutex<Tasks>,
    cancel: CancellationToken,
}

impl Node {
    /// Create a node
    ///
    /// Fails if the configuration is invalid or the catalog is empty.
    /// Aggregation reports go to a [`TracingReportSink`] unless replaced
    /// with [`with_report_sink`](Self::with_report_sink).
    pub fn new(
        config: NodeConfig,
        source: Arc<dyn MeasurementSource>,
        binder: Arc<dyn DatagramBinder>,
    ) -> NodeResult<Self> {
        config.validate()?;
        if source.is_empty() {
            return Err(CatalogError::Empty.into());
        }

        info!(
            name = %config.name,
            index = config.index,
            total_nodes = config.total_nodes,
            peers = config.peers.len(),
            "Node created"
        );

        Ok(Self {
            state: Arc::new(NodeState::new(config.index, config.total_nodes)),
            config,
            source,
            binder,
            sink: Arc::new(TracingReportSink),
            status: Arc::new(RwLock::new(Status {
                lifecycle: Lifecycle::Created,
                started_at: None,
                local_addr: None,
            })),
            tasks: Mutex::new(Tasks::default()),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the destination of aggregation reports
    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Bind the sockets and launch the server, client and aggregator loops
    ///
    /// Starting a running or shut-down node does nothing and reports
    /// [`StartOutcome::AlreadyStarted`]. A bind failure leaves the node in
    /// [`Lifecycle::Created`].
    #[instrument(skip(self), fields(node = %self.config.name))]
    pub async fn start(&self) -> NodeResult<StartOutcome> {
        let mut tasks = self.tasks.lock().await;
        if self.lifecycle() != Lifecycle::Created {
            info!("Node already started");
            return Ok(StartOutcome::AlreadyStarted);
        }

        let listener = self.binder.bind(self.config.bind_addr).await?;
        let outbound = self
            .binder
            .bind(SocketAddr::new(self.config.bind_addr.ip(), 0))
            .await?;
        let local_addr = listener.local_addr()?;

        let started = Instant::now();
        let started_at = Utc::now();
        let timing = &self.config.timing;
        let name = &self.config.name;

        // Running before any loop exists, so a failing listener can only
        // ever move the node on to ShutDown.
        {
            let mut status = self.status.write();
            status.lifecycle = Lifecycle::Running;
            status.started_at = Some(started_at);
            status.local_addr = Some(local_addr);
        }

        let server = Arc::new(Server::new(self.state.clone(), listener, timing));
        let server_token = self.cancel.child_token();
        let node_token = self.cancel.clone();
        let status = self.status.clone();
        tasks.server = Some(tokio::spawn(
            async move {
                let result = server.run(server_token).await;
                if let Err(e) = &result {
                    error!(error = %e, "Listening socket lost, shutting node down");
                    status.write().lifecycle = Lifecycle::ShutDown;
                    node_token.cancel();
                }
                result
            }
            .instrument(info_span!("server", node = %name)),
        ));

        let client = Client::new(
            name.clone(),
            self.state.clone(),
            outbound,
            self.source.clone(),
            self.config.peers.iter().copied(),
            timing.clone(),
            started,
        );
        tasks.client = Some(tokio::spawn(
            client
                .run(self.cancel.child_token())
                .instrument(info_span!("client", node = %name)),
        ));

        let aggregator = Aggregator::new(
            name.clone(),
            self.state.clone(),
            self.sink.clone(),
            timing.aggregation_period,
        );
        tasks.aggregator = Some(tokio::spawn(
            aggregator
                .run(self.cancel.child_token())
                .instrument(info_span!("aggregator", node = %name)),
        ));

        info!(%local_addr, %started_at, "Node started");
        Ok(StartOutcome::Started)
    }

    /// Signal every loop to stop
    ///
    /// Returns without waiting; loops finish their current step within about
    /// one accept timeout. Use [`join`](Self::join) to wait for them.
    #[instrument(skip(self), fields(node = %self.config.name))]
    pub async fn stop(&self) -> StopOutcome {
        let _tasks = self.tasks.lock().await;
        {
            let mut status = self.status.write();
            if status.lifecycle != Lifecycle::Running {
                return StopOutcome::NotRunning;
            }
            status.lifecycle = Lifecycle::ShutDown;
        }

        self.cancel.cancel();
        info!("Node stopping");
        StopOutcome::Stopped
    }

    /// Wait for every loop to finish
    ///
    /// Blocks until [`stop`](Self::stop) is called or the listening socket
    /// fails. A listener failure shuts the whole node down on its own and
    /// its error is returned here.
    pub async fn join(&self) -> NodeResult<()> {
        let (server, client, aggregator) = {
            let mut tasks = self.tasks.lock().await;
            (
                tasks.server.take(),
                tasks.client.take(),
                tasks.aggregator.take(),
            )
        };

        let mut result = Ok(());
        if let Some(handle) = server {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => result = Err(e),
                Err(e) => result = Err(e.into()),
            }
        }
        for handle in [client, aggregator].into_iter().flatten() {
            if let Err(e) = handle.await {
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }
        result
    }

    /// Advance the clocks and store a measurement
    ///
    /// The single mutation entry point shared by the local and remote
    /// paths. See [`NodeState::record_and_store`].
    pub fn record_and_store(
        &self,
        measurement: Measurement,
        scalar: ScalarTimestamp,
        vector: VectorTimestamp,
    ) -> Result<Stamp, ClockError> {
        self.state.record_and_store(measurement, scalar, vector)
    }

    /// Atomically take the current window
    pub fn drain_window(&self) -> Window {
        self.state.drain_window()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn index(&self) -> usize {
        self.config.index
    }

    pub fn total_nodes(&self) -> usize {
        self.config.total_nodes
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.status.read().lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    /// Wall-clock time of the last successful start
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.status.read().started_at
    }

    /// Address of the listening socket once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.status.read().local_addr
    }

    /// Number of events recorded so far
    pub fn event_count(&self) -> u64 {
        self.state.event_count()
    }

    pub fn current_scalar(&self) -> ScalarTimestamp {
        self.state.current_scalar()
    }

    pub fn current_vector(&self) -> VectorTimestamp {
        self.state.current_vector()
    }

    /// Measurements waiting for the next aggregation round
    pub fn window_len(&self) -> usize {
        self.state.window_len()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
