use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};

use super::checker::{Checker, HttpChecker};
use super::types::{MonitorTarget, ProbeOutcome};
use crate::error::ProbeError;

/// Probe executor - performs one availability check against a target
///
/// Every check is bounded by a hard timeout regardless of what the
/// underlying [`Checker`] does, and the elapsed time always lands in the
/// outcome, success or not.
pub struct ProbeExecutor {
    checker: Arc<dyn Checker>,
    timeout: Duration,
}

impl ProbeExecutor {
    pub fn new(checker: Arc<dyn Checker>, timeout: Duration) -> Self {
        Self { checker, timeout }
    }

    /// Executor backed by a real HTTP client using the same timeout
    pub fn http(timeout: Duration, user_agent: &str) -> Result<Self, ProbeError> {
        Ok(Self::new(Arc::new(HttpChecker::new(timeout, user_agent)?), timeout))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `target` once. Never fails: every failure mode becomes a down outcome.
    pub async fn execute(&self, target: &MonitorTarget) -> ProbeOutcome {
        let endpoint = target.endpoint();
        let start = Instant::now();

        let attempt = timeout(self.timeout, self.checker.check(&endpoint)).await;
        let latency = start.elapsed();

        match attempt {
            Ok(Ok(code)) if is_available(code) => ProbeOutcome::up(code, latency),
            Ok(Ok(code)) => ProbeOutcome::down(describe_status(code), latency),
            Ok(Err(e)) => ProbeOutcome::down(e.to_string(), latency),
            Err(_) => ProbeOutcome::down(ProbeError::Timeout(self.timeout).to_string(), latency),
        }
    }
}

// 2xx and 3xx count as available
fn is_available(code: u16) -> bool {
    (200..400).contains(&code)
}

fn describe_status(code: u16) -> String {
    match reqwest::StatusCode::from_u16(code).ok().and_then(|s| s.canonical_reason()) {
        Some(reason) => format!("{code} {reason}"),
        None => code.to_string(),
    }
}
