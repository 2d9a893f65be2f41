use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use sensnet_console::{Cli, NetworkFile, load_catalog, run_console};
use sensnet_logging::{LogConfig, SubscriberBuilder};
use sensnet_node::{Node, TimingConfig};
use sensnet_transport::UdpBinder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.pretty {
        LogConfig::development()
    } else {
        LogConfig::default()
    };
    let _guard = SubscriberBuilder::new()
        .with_config(log_config)
        .with_level(&cli.log_level)
        .try_init()?;

    let network = NetworkFile::load(&cli.network)
        .with_context(|| format!("loading {}", cli.network.display()))?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let name = match cli.name {
        Some(name) => name,
        None => prompt_name(&mut stdin, &network).await?,
    };

    let selected = network.select(&name, TimingConfig::default())?;
    let catalog = load_catalog(&network).context("loading measurement catalog")?;
    info!(
        node = %name,
        measurements = catalog.len(),
        loss_rate = selected.loss.loss_rate,
        "Network file loaded"
    );

    let node = Node::new(
        selected.config,
        catalog,
        Arc::new(UdpBinder::new(selected.loss)),
    )?;

    run_console(&node, stdin, tokio::io::stdout()).await
}

async fn prompt_name(
    stdin: &mut BufReader<tokio::io::Stdin>,
    network: &NetworkFile,
) -> anyhow::Result<String> {
    print!("Node name ({}): ", network.node_names().join(", "));
    std::io::stdout().flush()?;

    let mut line = String::new();
    stdin.read_line(&mut line).await?;
    let name = line.trim();
    if name.is_empty() {
        anyhow::bail!("no node name given");
    }
    Ok(name.to_string())
}
