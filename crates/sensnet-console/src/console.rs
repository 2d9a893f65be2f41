//! Interactive console loop
//!
//! Reads one command per line and drives the node's lifecycle. End of input
//! behaves like `EXIT`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use sensnet_node::{Node, StartOutcome, StopOutcome};

use crate::command::{Command, parse_line};

/// Run the console until `EXIT` or end of input
///
/// On exit a running node is stopped and its loops are awaited.
pub async fn run_console<R, W>(node: &Node, input: R, mut output: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output
        .write_all(
            format!(
                "Node {} ready. Commands: START, STOP, STATUS, EXIT\n",
                node.name()
            )
            .as_bytes(),
        )
        .await?;
    output.flush().await?;

    loop {
        let Some(line) = lines.next_line().await? else {
            info!("Console input closed");
            break;
        };

        let command = match parse_line(&line) {
            None => continue,
            Some(Ok(command)) => command,
            Some(Err(e)) => {
                output.write_all(format!("{}\n", e).as_bytes()).await?;
                output.flush().await?;
                continue;
            }
        };

        let reply = match command {
            Command::Start => match node.start().await {
                Ok(StartOutcome::Started) => "Node started".to_string(),
                Ok(StartOutcome::AlreadyStarted) => "Node already started".to_string(),
                Err(e) => format!("Failed to start node: {}", e),
            },
            Command::Stop => match node.stop().await {
                StopOutcome::Stopped => "Node stopping".to_string(),
                StopOutcome::NotRunning => "Node is not running".to_string(),
            },
            Command::Status => status_report(node),
            Command::Exit => break,
        };
        output.write_all(format!("{}\n", reply).as_bytes()).await?;
        output.flush().await?;
    }

    node.stop().await;
    if let Err(e) = node.join().await {
        output
            .write_all(format!("Node stopped with error: {}\n", e).as_bytes())
            .await?;
    }
    output.write_all(b"Bye\n").await?;
    output.flush().await?;
    Ok(())
}

/// Diagnostics block printed by `STATUS`
pub fn status_report(node: &Node) -> String {
    let started = node
        .started_at()
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    let listening = node
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "name: {}\nindex: {} of {}\nstate: {:?}\nstarted: {}\nlistening: {}\nevents: {}\nscalar clock: {}\nvector clock: {}\nwindow: {} measurements",
        node.name(),
        node.index(),
        node.total_nodes(),
        node.lifecycle(),
        started,
        listening,
        node.event_count(),
        node.current_scalar(),
        node.current_vector(),
        node.window_len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use sensnet_core::{InMemoryCatalog, Measurement};
    use sensnet_node::{Lifecycle, NodeConfig, TimingConfig};
    use sensnet_transport::MockNetwork;

    fn node(network: &MockNetwork) -> Node {
        let config = NodeConfig::new("alpha", 0, 1, SocketAddr::from(([127, 0, 0, 1], 5000)))
            .with_timing(TimingConfig::testing());
        Node::new(
            config,
            Arc::new(InMemoryCatalog::new(vec![Measurement::new(20, 1000, 50)])),
            Arc::new(network.clone()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_session_start_status_exit() {
        let network = MockNetwork::new();
        let node = node(&network);
        let input: &[u8] = b"status\n\nfly\nSTART\nstart\nSTATUS\nexit\nSTART\n";
        let mut output = Vec::new();

        run_console(&node, input, &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("started: never"));
        assert!(text.contains("Unknown command 'fly'"));
        assert!(text.contains("Node started"));
        assert!(text.contains("Node already started"));
        assert!(text.contains("listening: 127.0.0.1:5000"));
        assert!(text.ends_with("Bye\n"));
        assert_eq!(node.lifecycle(), Lifecycle::ShutDown);
    }

    #[tokio::test]
    async fn test_end_of_input_exits_cleanly() {
        let network = MockNetwork::new();
        let node = node(&network);
        let input: &[u8] = b"stop\n";
        let mut output = Vec::new();

        run_console(&node, input, &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Node is not running"));
        assert_eq!(node.lifecycle(), Lifecycle::Created);
    }
}
