//! Configuration for the sensor node

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{NodeError, NodeResult};
use crate::retry::RetryPolicy;

/// Timing and sizing knobs for the node's background loops
#[derive(Debug, Clone, PartialEq)]
pub struct TimingConfig {
    /// Pause between two produced measurements
    pub production_interval: Duration,
    /// Period of the windowed aggregation
    pub aggregation_period: Duration,
    /// How long the listening loop blocks before re-checking for shutdown
    pub accept_timeout: Duration,
    /// How long one acknowledgement wait lasts
    pub ack_timeout: Duration,
    /// Attempts for each of the send and acknowledgement phases
    pub retry_attempts: u32,
    /// Pause between two failed attempts
    pub retry_backoff: Duration,
    /// Largest datagram the node will receive
    pub max_datagram_size: usize,
    /// Upper bound on concurrently processed inbound datagrams
    pub worker_pool_size: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            production_interval: Duration::from_secs(1),
            aggregation_period: Duration::from_secs(5),
            accept_timeout: Duration::from_secs(1),
            ack_timeout: Duration::from_secs(1),
            retry_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            max_datagram_size: 1024,
            worker_pool_size: default_worker_pool_size(),
        }
    }
}

impl TimingConfig {
    /// Short intervals for tests and local experiments
    pub fn testing() -> Self {
        Self {
            production_interval: Duration::from_millis(50),
            aggregation_period: Duration::from_millis(250),
            accept_timeout: Duration::from_millis(20),
            ack_timeout: Duration::from_millis(100),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(10),
            max_datagram_size: 1024,
            worker_pool_size: 4,
        }
    }

    pub fn with_production_interval(mut self, interval: Duration) -> Self {
        self.production_interval = interval;
        self
    }

    pub fn with_aggregation_period(mut self, period: Duration) -> Self {
        self.aggregation_period = period;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set the retry budget and backoff
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    /// Retry policy shared by the send and acknowledgement phases
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_backoff)
    }

    fn validate(&self) -> NodeResult<()> {
        let durations = [
            ("production_interval", self.production_interval),
            ("aggregation_period", self.aggregation_period),
            ("accept_timeout", self.accept_timeout),
            ("ack_timeout", self.ack_timeout),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(NodeError::Config(format!("{} must be non-zero", field)));
            }
        }
        if self.retry_attempts == 0 {
            return Err(NodeError::Config(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(NodeError::Config(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.max_datagram_size == 0 {
            return Err(NodeError::Config(
                "max_datagram_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One less than the available parallelism, never below one
fn default_worker_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Configuration for a sensor node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Human-readable node name; prefixes every packet id this node sends
    pub name: String,
    /// This node's slot in the vector timestamp
    pub index: usize,
    /// Number of nodes in the network, i.e. the vector timestamp length
    pub total_nodes: usize,
    /// Address of the listening socket
    pub bind_addr: SocketAddr,
    /// Listening addresses of every other node
    pub peers: Vec<SocketAddr>,
    /// Loop timing
    pub timing: TimingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new("node-0", 0, 1, SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

impl NodeConfig {
    pub fn new(
        name: impl Into<String>,
        index: usize,
        total_nodes: usize,
        bind_addr: SocketAddr,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            total_nodes,
            bind_addr,
            peers: Vec::new(),
            timing: TimingConfig::default(),
        }
    }

    /// Set the peer addresses
    pub fn with_peers(mut self, peers: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.peers = peers.into_iter().collect();
        self
    }

    /// Set the loop timing
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Reject configurations the node cannot run with
    pub fn validate(&self) -> NodeResult<()> {
        if self.name.is_empty() {
            return Err(NodeError::Config("node name must not be empty".to_string()));
        }
        if self.total_nodes == 0 {
            return Err(NodeError::Config(
                "total_nodes must be at least 1".to_string(),
            ));
        }
        if self.index >= self.total_nodes {
            return Err(NodeError::Config(format!(
                "index {} out of range for {} nodes",
                self.index, self.total_nodes
            )));
        }
        if self.peers.contains(&self.bind_addr) {
            return Err(NodeError::Config(format!(
                "peer list contains the node's own address {}",
                self.bind_addr
            )));
        }
        self.timing.validate()
    }
}
