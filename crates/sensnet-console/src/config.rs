//! Command line and network file

use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sensnet_node::{NodeConfig, TimingConfig};
use sensnet_transport::LossModel;

#[derive(Parser, Debug)]
#[command(name = "sensnet-console", about = "Run one node of a Sensnet sensor network")]
pub struct Cli {
    /// Name of the node to run; prompted for when omitted
    pub name: Option<String>,

    /// Network description listing every node
    #[arg(long, short = 'n', default_value = "network.toml")]
    pub network: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Human-readable log output instead of JSON lines
    #[arg(long)]
    pub pretty: bool,
}

/// Errors in the network file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read network file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse network file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Network file lists no nodes")]
    NoNodes,

    #[error("Duplicate node {0}")]
    Duplicate(String),

    #[error("Node indices must be 0..{expected} without gaps, found {found}")]
    BadIndex { expected: usize, found: usize },

    #[error("Node {name}: {reason}")]
    InvalidNode { name: String, reason: String },

    #[error("Unknown node {0}")]
    UnknownNode(String),
}

/// One node of the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub name: String,
    pub index: usize,
    pub port: u16,
    #[serde(default)]
    pub loss_rate: f64,
    #[serde(default)]
    pub average_delay_ms: u64,
}

/// The whole network as described on disk
///
/// ```toml
/// host = "127.0.0.1"
/// measurements = "readings.csv"
///
/// [[nodes]]
/// name = "alpha"
/// index = 0
/// port = 9000
/// loss_rate = 0.2
/// average_delay_ms = 50
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFile {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// CSV catalog, relative to the network file
    #[serde(default)]
    pub measurements: Option<PathBuf>,
    pub nodes: Vec<NodeEntry>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// Everything needed to build one node
#[derive(Debug, Clone)]
pub struct SelectedNode {
    pub config: NodeConfig,
    pub loss: LossModel,
}

impl NetworkFile {
    /// Read and validate a network file
    ///
    /// A relative `measurements` path is resolved against the file's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut network = Self::parse(&fs::read_to_string(path)?)?;
        if let (Some(measurements), Some(dir)) = (&network.measurements, path.parent()) {
            if measurements.is_relative() {
                network.measurements = Some(dir.join(measurements));
            }
        }
        Ok(network)
    }

    /// Parse and validate network file contents
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let network: NetworkFile = toml::from_str(contents)?;
        network.validate()?;
        Ok(network)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        let mut indices = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ConfigError::Duplicate(format!("name {}", node.name)));
            }
            if !ports.insert(node.port) {
                return Err(ConfigError::Duplicate(format!("port {}", node.port)));
            }
            if node.index >= self.nodes.len() || !indices.insert(node.index) {
                return Err(ConfigError::BadIndex {
                    expected: self.nodes.len(),
                    found: node.index,
                });
            }
            LossModel::new(node.loss_rate, Duration::ZERO).map_err(|e| {
                ConfigError::InvalidNode {
                    name: node.name.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Build the configuration of the node called `name`
    ///
    /// Every other listed node becomes a peer.
    pub fn select(&self, name: &str, timing: TimingConfig) -> Result<SelectedNode, ConfigError> {
        let entry = self
            .nodes
            .iter()
            .find(|node| node.name == name)
            .ok_or_else(|| ConfigError::UnknownNode(name.to_string()))?;

        let peers = self
            .nodes
            .iter()
            .filter(|node| node.name != name)
            .map(|node| SocketAddr::new(self.host, node.port));

        let config = NodeConfig::new(
            &entry.name,
            entry.index,
            self.nodes.len(),
            SocketAddr::new(self.host, entry.port),
        )
        .with_peers(peers)
        .with_timing(timing);

        let loss = LossModel::new(
            entry.loss_rate,
            Duration::from_millis(entry.average_delay_ms),
        )
        .map_err(|e| ConfigError::InvalidNode {
            name: entry.name.clone(),
            reason: e.to_string(),
        })?;

        Ok(SelectedNode { config, loss })
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.name.as_str()).collect()
    }
}
