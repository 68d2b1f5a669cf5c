//! Automatic retention and cleanup of probe results.
//!
//! Results older than the configured number of days are deleted by a
//! background sweep that runs on a fixed interval until cancelled.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::database::Database;
use crate::error::StoreError;

/// Retention policy for probe results
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Days to keep probe results
    pub result_days: u32,
    /// Pause between sweeps
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self { result_days: config.result_days, sweep_interval: config.sweep_interval() }
    }
}

impl RetentionPolicy {
    /// Oldest timestamp that survives a sweep at `now`
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(i64::from(self.result_days))
    }
}

/// Cleanup manager for expired results
pub struct RetentionCleanup {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    /// Delete every result older than the retention window
    pub async fn cleanup_expired_results(&self) -> Result<u64, StoreError> {
        let cutoff = self.policy.cutoff(Utc::now());
        debug!("Cleaning up results older than {} days (cutoff: {})", self.policy.result_days, cutoff);

        let deleted = self.database.delete_results_before(cutoff).await?;
        if deleted > 0 {
            info!("Retention cleanup completed: {} results deleted", deleted);
        }
        Ok(deleted)
    }

    /// Start the background sweep; the first sweep runs immediately
    pub fn start_periodic_cleanup(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.policy.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if let Err(e) = self.cleanup_expired_results().await {
                    warn!("Periodic results cleanup failed: {}", e);
                }
            }

            debug!("Retention cleanup stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::{ProbeOutcome, ProbeResult};
    use crate::testing::MemoryStore;
    use uuid::Uuid;

    fn result_aged(target: Uuid, days: i64) -> ProbeResult {
        let outcome = ProbeOutcome::up(200, Duration::from_millis(10));
        ProbeResult::from_outcome(target, &outcome, Utc::now() - chrono::Duration::days(days))
    }

    #[test]
    fn test_retention_policy_defaults() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.result_days, 30);
        assert_eq!(policy.sweep_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_cutoff_calculation() {
        let policy = RetentionPolicy { result_days: 7, sweep_interval: Duration::from_secs(60) };
        let now = Utc::now();
        assert_eq!(now - policy.cutoff(now), chrono::Duration::days(7));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_results() {
        let store = Arc::new(MemoryStore::default());
        let target = Uuid::new_v4();
        store.insert_result(result_aged(target, 45));
        store.insert_result(result_aged(target, 31));
        store.insert_result(result_aged(target, 2));

        let cleanup = RetentionCleanup::new(store.clone(), RetentionPolicy::default());
        assert_eq!(cleanup.cleanup_expired_results().await.unwrap(), 2);
        assert_eq!(store.results_for(target).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_cleanup_stops_on_cancel() {
        let store = Arc::new(MemoryStore::default());
        let target = Uuid::new_v4();
        store.insert_result(result_aged(target, 90));

        let cancel = CancellationToken::new();
        let policy = RetentionPolicy { result_days: 30, sweep_interval: Duration::from_secs(60) };
        let handle = RetentionCleanup::new(store.clone(), policy).start_periodic_cleanup(cancel.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.results_for(target).is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
