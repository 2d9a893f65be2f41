//! Periodic windowed aggregation
//!
//! Every aggregation period the node drains its window and hands a
//! [`WindowReport`] to a [`ReportSink`]. The first round runs one full
//! period after start.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::state::NodeState;
use crate::window::WindowReport;

/// Destination of aggregation results
pub trait ReportSink: Send + Sync {
    fn report(&self, node: &str, report: &WindowReport);
}

/// Logs each report through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReportSink;

impl ReportSink for TracingReportSink {
    fn report(&self, node: &str, report: &WindowReport) {
        match report.mean_co {
            Some(mean) => info!(node, count = report.count, mean_co = mean, "Window aggregated"),
            None => info!(node, count = report.count, "Window aggregated, no CO data"),
        }
        for (scalar, m) in &report.by_scalar {
            debug!(node, %scalar, measurement = %m, "Scalar-ordered entry");
        }
        for (vector, m) in &report.by_vector {
            debug!(node, %vector, measurement = %m, "Vector-ordered entry");
        }
    }
}

/// Forwards each report to a channel
#[derive(Debug, Clone)]
pub struct ChannelReportSink {
    tx: mpsc::UnboundedSender<WindowReport>,
}

impl ChannelReportSink {
    /// Create a sink and the receiver its reports arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WindowReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ReportSink for ChannelReportSink {
    fn report(&self, _node: &str, report: &WindowReport) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.tx.send(report.clone());
    }
}

/// Drains the window on a fixed period
pub struct Aggregator {
    name: String,
    state: Arc<NodeState>,
    sink: Arc<dyn ReportSink>,
    period: Duration,
}

impl Aggregator {
    pub fn new(
        name: impl Into<String>,
        state: Arc<NodeState>,
        sink: Arc<dyn ReportSink>,
        period: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            state,
            sink,
            period,
        }
    }

    /// Run one aggregation round
    pub fn aggregate(&self) -> WindowReport {
        let window = self.state.drain_window();
        let report = window.report();
        self.sink.report(&self.name, &report);
        report
    }

    /// Spawn the periodic loop
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Aggregate every period until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.period;
        let mut ticker = tokio::time::interval_at(start, self.period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.aggregate();
                }
            }
        }

        debug!("Aggregator stopped");
    }
}
