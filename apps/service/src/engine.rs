use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{DatabaseImpl, initialize_database};
use crate::management::MonitorService;
use crate::monitoring::executor::ProbeExecutor;
use crate::monitoring::scheduler::{MonitoringScheduler, SchedulerOptions};
use crate::notifications::NotificationDispatcher;
use crate::pool::open_pool;
use crate::retention::{RetentionCleanup, RetentionPolicy};

/// A running monitoring engine: store, scheduler, notifications and
/// retention sweep wired together from one [`Config`].
pub struct Engine {
    scheduler: MonitoringScheduler,
    service: Arc<MonitorService>,
    retention_cancel: CancellationToken,
    retention_handle: tokio::task::JoinHandle<()>,
}

impl Engine {
    /// Open the database, run migrations and start scheduling every stored target
    pub async fn bootstrap(config: &Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        info!("Opening database at {}", config.database.path.display());
        let pool = open_pool(&config.database.path, config.database.max_connections)
            .await
            .context("Failed to open database")?;
        {
            let conn = pool.get().await.context("Failed to acquire database connection")?;
            initialize_database(&conn).await.context("Failed to run database migrations")?;
        }
        let database = Arc::new(DatabaseImpl::new_from_pool(pool));

        let executor = ProbeExecutor::http(config.engine.probe_timeout(), &config.engine.user_agent)
            .context("Failed to build HTTP client")?;
        let notifier = NotificationDispatcher::from_config(database.clone(), &config.notifications)
            .context("Failed to set up notifications")?;

        let scheduler = MonitoringScheduler::new(
            database.clone(),
            Arc::new(executor),
            Arc::new(notifier),
            SchedulerOptions::from(&config.engine),
        );
        let scheduled = scheduler.start().await.context("Failed to start monitoring scheduler")?;
        info!("Monitoring {} targets", scheduled);

        let retention_cancel = CancellationToken::new();
        let retention_handle = RetentionCleanup::new(database.clone(), RetentionPolicy::from(&config.retention))
            .start_periodic_cleanup(retention_cancel.clone());

        let service = Arc::new(MonitorService::new(database, scheduler.clone(), config.engine.min_interval()));

        Ok(Self { scheduler, service, retention_cancel, retention_handle })
    }

    pub fn service(&self) -> Arc<MonitorService> {
        self.service.clone()
    }

    pub fn scheduler(&self) -> &MonitoringScheduler {
        &self.scheduler
    }

    /// Stop the retention sweep and drain the scheduler
    pub async fn shutdown(self) {
        info!("Shutting down monitoring engine...");
        self.retention_cancel.cancel();
        if let Err(e) = self.retention_handle.await {
            warn!("Retention task ended abnormally: {}", e);
        }
        if let Err(e) = self.scheduler.stop().await {
            warn!("Scheduler stop failed: {}", e);
        }
        info!("Monitoring engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.database.path = dir.path().join("engine.db");
        config
    }

    #[tokio::test]
    async fn bootstrap_and_shutdown_on_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::bootstrap(&config_in(&dir)).await.unwrap();

        assert!(engine.scheduler().is_running().await);
        assert!(engine.service().list_targets("u1").await.unwrap().is_empty());

        let scheduler = engine.scheduler().clone();
        engine.shutdown().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.engine.max_concurrent_probes = 0;

        assert!(Engine::bootstrap(&config).await.is_err());
    }

    #[tokio::test]
    async fn restart_picks_up_persisted_targets() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let engine = Engine::bootstrap(&config).await.unwrap();
        let request = crate::management::NewTarget {
            protocol: "http".into(),
            // discard port on loopback: refused quickly, never reaches the network
            url: "127.0.0.1:9".into(),
            frequency: 1,
            unit: "hour".into(),
        };
        let target = engine.service().create_target("u1", request).await.unwrap();
        engine.shutdown().await;

        let engine = Engine::bootstrap(&config).await.unwrap();
        assert!(engine.scheduler().is_scheduled(target.id).await);
        engine.shutdown().await;
    }
}
