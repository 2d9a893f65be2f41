//! Bounded retry with a fixed pause between attempts

use std::future::Future;
use std::time::Duration;

use sensnet_transport::TransportError;
use tracing::{debug, trace};

/// Attempt budget and backoff for one retried phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Run `op` until it reports success or the budget is spent
///
/// `Ok(true)` ends the loop. `Ok(false)` and any error count as a failed
/// attempt and are followed by the backoff pause, except after the last
/// attempt. Returns whether some attempt succeeded.
pub async fn retry<F, Fut>(policy: RetryPolicy, phase: &str, mut op: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, TransportError>>,
{
    for attempt in 1..=policy.attempts {
        match op().await {
            Ok(true) => return true,
            Ok(false) => trace!(phase, attempt, "Attempt rejected"),
            Err(e) if e.is_timeout() => trace!(phase, attempt, "Attempt timed out"),
            Err(e) => debug!(phase, attempt, error = %e, "Attempt failed"),
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.backoff).await;
        }
    }
    false
}
