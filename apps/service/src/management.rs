//! Owner-scoped management of monitor targets and integrations.
//!
//! Every mutation is applied to the store first and then mirrored into the
//! live schedule, so the scheduler never holds a target the store lacks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{EngineError, StoreError};
use crate::monitoring::scheduler::MonitoringScheduler;
use crate::monitoring::types::{Integration, IntegrationKind, MonitorTarget, ProbeResult, TargetId};
use crate::validation::{
    ValidationError, parse_protocol, validate_email, validate_interval, validate_target_url,
    validate_webhook_url,
};

/// Largest page of results a caller may ask for
pub const MAX_RECENT_RESULTS: usize = 500;

#[derive(Debug, Error)]
pub enum ManagementError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("a monitor for this protocol and URL already exists")]
    Duplicate,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schedule(#[from] EngineError),
}

/// Request to create a target
#[derive(Debug, Clone, Deserialize)]
pub struct NewTarget {
    pub protocol: String,
    pub url: String,
    pub frequency: u32,
    pub unit: String,
}

/// Partial update of a target. The url cannot be changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetUpdate {
    pub protocol: Option<String>,
    pub frequency: Option<u32>,
    pub unit: Option<String>,
}

/// Request to add an integration
#[derive(Debug, Clone, Deserialize)]
pub struct NewIntegration {
    #[serde(rename = "type")]
    pub kind: String,
    pub email: Option<String>,
    pub webhook_url: Option<String>,
}

pub struct MonitorService {
    database: Arc<dyn Database>,
    scheduler: MonitoringScheduler,
    min_interval: Duration,
    /// Serializes update and delete of the same target
    target_locks: Mutex<HashMap<TargetId, Arc<Mutex<()>>>>,
}

impl MonitorService {
    pub fn new(database: Arc<dyn Database>, scheduler: MonitoringScheduler, min_interval: Duration) -> Self {
        Self { database, scheduler, min_interval, target_locks: Mutex::default() }
    }

    async fn lock_target(&self, id: TargetId) -> OwnedMutexGuard<()> {
        let lock = self.target_locks.lock().await.entry(id).or_default().clone();
        lock.lock_owned().await
    }

    pub async fn create_target(&self, user_id: &str, request: NewTarget) -> Result<MonitorTarget, ManagementError> {
        let protocol = parse_protocol(&request.protocol)?;
        let url = validate_target_url(&request.url)?;
        let interval = validate_interval(request.frequency, &request.unit, self.min_interval)?;

        if self.database.find_target(user_id, protocol, &url).await?.is_some() {
            return Err(ManagementError::Duplicate);
        }

        let target = MonitorTarget::new(user_id, protocol, url, interval);
        self.database.create_target(&target).await.map_err(|e| match e {
            StoreError::Conflict => ManagementError::Duplicate,
            other => other.into(),
        })?;

        match self.scheduler.register(target.clone()).await {
            Ok(()) => {}
            Err(EngineError::NotRunning) => {
                warn!(target_id = %target.id, "Scheduler not running, target will be picked up at next start");
            }
            Err(e) => return Err(e.into()),
        }

        info!(target_id = %target.id, user_id, endpoint = %target.endpoint(), "Created monitor target");
        Ok(target)
    }

    pub async fn list_targets(&self, user_id: &str) -> Result<Vec<MonitorTarget>, ManagementError> {
        Ok(self.database.list_targets_by_user(user_id).await?)
    }

    pub async fn get_target(&self, user_id: &str, id: TargetId) -> Result<MonitorTarget, ManagementError> {
        match self.database.get_target(id).await? {
            Some(target) if target.user_id == user_id => Ok(target),
            _ => Err(ManagementError::NotFound),
        }
    }

    pub async fn update_target(
        &self,
        user_id: &str,
        id: TargetId,
        update: TargetUpdate,
    ) -> Result<MonitorTarget, ManagementError> {
        let _guard = self.lock_target(id).await;
        let mut target = self.get_target(user_id, id).await?;

        let protocol = match &update.protocol {
            Some(protocol) => parse_protocol(protocol)?,
            None => target.protocol,
        };
        let interval = if update.frequency.is_some() || update.unit.is_some() {
            let value = update.frequency.unwrap_or(target.interval.value);
            let unit = update.unit.as_deref().unwrap_or(target.interval.unit.as_str());
            validate_interval(value, unit, self.min_interval)?
        } else {
            target.interval
        };

        let protocol_changed = protocol != target.protocol;
        if protocol_changed && self.database.find_target(user_id, protocol, &target.url).await?.is_some() {
            return Err(ManagementError::Duplicate);
        }
        if !protocol_changed && interval == target.interval {
            return Ok(target);
        }

        target.protocol = protocol;
        target.interval = interval;
        target.updated_at = Utc::now();
        self.database.update_target_definition(&target).await.map_err(|e| match e {
            StoreError::Conflict => ManagementError::Duplicate,
            StoreError::NotFound => ManagementError::NotFound,
            other => other.into(),
        })?;

        let applied = if protocol_changed {
            self.scheduler.retarget(target.clone()).await
        } else {
            self.scheduler.reschedule(id, interval).await
        };
        match applied {
            Ok(()) => {}
            Err(EngineError::NotRunning) => {
                warn!(target_id = %id, "Scheduler not running, update applies at next start");
            }
            Err(EngineError::NotScheduled(_)) => self.scheduler.register(target.clone()).await?,
            Err(e) => return Err(e.into()),
        }

        info!(target_id = %id, protocol = %target.protocol, interval = %target.interval, "Updated monitor target");
        Ok(target)
    }

    pub async fn delete_target(&self, user_id: &str, id: TargetId) -> Result<(), ManagementError> {
        let guard = self.lock_target(id).await;
        let target = self.get_target(user_id, id).await?;

        // unschedule first so no result lands after the rows are gone
        self.scheduler.unregister(id).await;
        let deleted = match self.database.delete_target(id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.restore_schedule(target).await;
                return Err(e.into());
            }
        };

        self.target_locks.lock().await.remove(&id);
        drop(guard);
        if !deleted {
            return Err(ManagementError::NotFound);
        }

        info!(target_id = %id, user_id, "Deleted monitor target");
        Ok(())
    }

    /// Put a target back on the schedule after its delete failed
    async fn restore_schedule(&self, fetched: MonitorTarget) {
        let id = fetched.id;
        let target = self.database.get_target(id).await.ok().flatten().unwrap_or(fetched);
        match self.scheduler.register(target).await {
            Ok(()) | Err(EngineError::NotRunning) => {}
            Err(e) => warn!(target_id = %id, error = %e, "Failed to reschedule target after failed delete"),
        }
    }

    /// Newest-first results of an owned target, `limit` clamped to `1..=500`
    pub async fn recent_results(
        &self,
        user_id: &str,
        id: TargetId,
        limit: usize,
    ) -> Result<Vec<ProbeResult>, ManagementError> {
        self.get_target(user_id, id).await?;
        Ok(self.database.recent_results(id, limit.clamp(1, MAX_RECENT_RESULTS)).await?)
    }

    pub async fn add_integration(&self, user_id: &str, request: NewIntegration) -> Result<Integration, ManagementError> {
        let kind: IntegrationKind = request
            .kind
            .parse()
            .map_err(|_| ValidationError::new(format!("Invalid integration type '{}'. Must be email or webhook", request.kind)))?;

        let destination = match kind {
            IntegrationKind::Email => {
                let email = request.email.as_deref().ok_or_else(|| ValidationError::new("Email is required"))?;
                validate_email(email)?
            }
            IntegrationKind::Webhook => {
                let url = request
                    .webhook_url
                    .as_deref()
                    .ok_or_else(|| ValidationError::new("Webhook URL is required"))?;
                validate_webhook_url(url)?
            }
        };

        let integration = Integration::new(user_id, kind, destination);
        self.database.add_integration(&integration).await?;
        info!(integration_id = %integration.id, user_id, %kind, "Added integration");
        Ok(integration)
    }

    pub async fn list_integrations(&self, user_id: &str) -> Result<Vec<Integration>, ManagementError> {
        Ok(self.database.list_integrations(user_id).await?)
    }

    pub async fn get_integration(&self, user_id: &str, id: Uuid) -> Result<Integration, ManagementError> {
        self.database.get_integration(user_id, id).await?.ok_or(ManagementError::NotFound)
    }

    pub async fn delete_integration(&self, user_id: &str, id: Uuid) -> Result<(), ManagementError> {
        if !self.database.delete_integration(user_id, id).await? {
            return Err(ManagementError::NotFound);
        }
        info!(integration_id = %id, user_id, "Deleted integration");
        Ok(())
    }
}
