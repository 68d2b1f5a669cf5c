use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use uuid::Uuid;

use super::models::{
    INTEGRATION_COLUMNS, RESULT_COLUMNS, TARGET_COLUMNS, integration_from_row, result_from_row,
    target_from_row, timestamp_to_i64,
};
use crate::error::StoreError;
use crate::monitoring::types::{Integration, MonitorStatus, MonitorTarget, ProbeResult, Protocol, TargetId};
use crate::pool::{LibsqlManager, LibsqlPool};

/// The narrow store surface the scheduler depends on
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Every persisted target, any owner
    async fn list_targets(&self) -> Result<Vec<MonitorTarget>, StoreError>;

    /// Append one probe result
    async fn save_result(&self, result: &ProbeResult) -> Result<(), StoreError>;

    /// Write only the status field of a target
    async fn update_status(&self, target_id: TargetId, status: MonitorStatus) -> Result<(), StoreError>;
}

/// Full persistence interface used by management, notifications and retention
#[async_trait]
pub trait Database: TargetStore {
    async fn create_target(&self, target: &MonitorTarget) -> Result<(), StoreError>;

    async fn get_target(&self, id: TargetId) -> Result<Option<MonitorTarget>, StoreError>;

    async fn list_targets_by_user(&self, user_id: &str) -> Result<Vec<MonitorTarget>, StoreError>;

    async fn find_target(
        &self,
        user_id: &str,
        protocol: Protocol,
        url: &str,
    ) -> Result<Option<MonitorTarget>, StoreError>;

    /// Write protocol, url and interval. Status is left untouched.
    async fn update_target_definition(&self, target: &MonitorTarget) -> Result<(), StoreError>;

    /// Delete a target and its results. Returns whether it existed.
    async fn delete_target(&self, id: TargetId) -> Result<bool, StoreError>;

    /// Last `limit` results of a target, newest first
    async fn recent_results(&self, target_id: TargetId, limit: usize) -> Result<Vec<ProbeResult>, StoreError>;

    /// Delete results older than `cutoff`, returning how many were removed
    async fn delete_results_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn add_integration(&self, integration: &Integration) -> Result<(), StoreError>;

    async fn list_integrations(&self, user_id: &str) -> Result<Vec<Integration>, StoreError>;

    async fn get_integration(&self, user_id: &str, id: Uuid) -> Result<Option<Integration>, StoreError>;

    async fn delete_integration(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StoreError> {
        Ok(self.pool.get().await?)
    }

    async fn query_targets(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<MonitorTarget>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut targets = Vec::new();

        while let Some(row) = rows.next().await? {
            targets.push(target_from_row(&row)?);
        }

        Ok(targets)
    }
}

#[async_trait]
impl TargetStore for DatabaseImpl {
    async fn list_targets(&self) -> Result<Vec<MonitorTarget>, StoreError> {
        self.query_targets(&format!("SELECT {TARGET_COLUMNS} FROM monitor_targets ORDER BY created_at"), ())
            .await
    }

    async fn save_result(&self, result: &ProbeResult) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO probe_results (id, target_id, status, descriptor, latency_ms, timestamp) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                result.id.to_string(),
                result.target_id.to_string(),
                result.status.as_str(),
                result.descriptor.clone(),
                i64::try_from(result.latency_ms).unwrap_or(i64::MAX),
                timestamp_to_i64(result.timestamp)
            ],
        )
        .await
        .map_err(StoreError::from_write)?;

        Ok(())
    }

    async fn update_status(&self, target_id: TargetId, status: MonitorStatus) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;

        let changed = conn
            .execute(
                "UPDATE monitor_targets SET status = ? WHERE id = ?",
                params![status.as_str(), target_id.to_string()],
            )
            .await?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn create_target(&self, target: &MonitorTarget) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO monitor_targets (id, user_id, protocol, url, interval_value, interval_unit, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                target.id.to_string(),
                target.user_id.clone(),
                target.protocol.as_str(),
                target.url.clone(),
                i64::from(target.interval.value),
                target.interval.unit.as_str(),
                target.status.as_str(),
                timestamp_to_i64(target.created_at),
                timestamp_to_i64(target.updated_at)
            ],
        )
        .await
        .map_err(StoreError::from_write)?;

        Ok(())
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<MonitorTarget>, StoreError> {
        let mut targets = self
            .query_targets(
                &format!("SELECT {TARGET_COLUMNS} FROM monitor_targets WHERE id = ?"),
                params![id.to_string()],
            )
            .await?;
        Ok(targets.pop())
    }

    async fn list_targets_by_user(&self, user_id: &str) -> Result<Vec<MonitorTarget>, StoreError> {
        self.query_targets(
            &format!("SELECT {TARGET_COLUMNS} FROM monitor_targets WHERE user_id = ? ORDER BY created_at"),
            params![user_id],
        )
        .await
    }

    async fn find_target(
        &self,
        user_id: &str,
        protocol: Protocol,
        url: &str,
    ) -> Result<Option<MonitorTarget>, StoreError> {
        let mut targets = self
            .query_targets(
                &format!(
                    "SELECT {TARGET_COLUMNS} FROM monitor_targets WHERE user_id = ? AND protocol = ? AND url = ?"
                ),
                params![user_id, protocol.as_str(), url],
            )
            .await?;
        Ok(targets.pop())
    }

    async fn update_target_definition(&self, target: &MonitorTarget) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;

        let changed = conn
            .execute(
                "UPDATE monitor_targets SET protocol = ?, url = ?, interval_value = ?, interval_unit = ?, updated_at = ? WHERE id = ?",
                params![
                    target.protocol.as_str(),
                    target.url.clone(),
                    i64::from(target.interval.value),
                    target.interval.unit.as_str(),
                    timestamp_to_i64(target.updated_at),
                    target.id.to_string()
                ],
            )
            .await
            .map_err(StoreError::from_write)?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_target(&self, id: TargetId) -> Result<bool, StoreError> {
        let conn = self.get_conn().await?;

        conn.execute("DELETE FROM probe_results WHERE target_id = ?", params![id.to_string()]).await?;
        let deleted = conn.execute("DELETE FROM monitor_targets WHERE id = ?", params![id.to_string()]).await?;

        Ok(deleted > 0)
    }

    async fn recent_results(&self, target_id: TargetId, limit: usize) -> Result<Vec<ProbeResult>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RESULT_COLUMNS} FROM probe_results WHERE target_id = ? ORDER BY timestamp DESC, seq DESC LIMIT ?"
                ),
                params![target_id.to_string(), i64::try_from(limit).unwrap_or(i64::MAX)],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(result_from_row(&row)?);
        }

        Ok(results)
    }

    async fn delete_results_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.get_conn().await?;

        let deleted = conn
            .execute("DELETE FROM probe_results WHERE timestamp < ?", params![timestamp_to_i64(cutoff)])
            .await?;

        Ok(deleted)
    }

    async fn add_integration(&self, integration: &Integration) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO integrations (id, user_id, kind, destination, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                integration.id.to_string(),
                integration.user_id.clone(),
                integration.kind.as_str(),
                integration.destination.clone(),
                timestamp_to_i64(integration.created_at)
            ],
        )
        .await
        .map_err(StoreError::from_write)?;

        Ok(())
    }

    async fn list_integrations(&self, user_id: &str) -> Result<Vec<Integration>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {INTEGRATION_COLUMNS} FROM integrations WHERE user_id = ? ORDER BY created_at"),
                params![user_id],
            )
            .await?;

        let mut integrations = Vec::new();
        while let Some(row) = rows.next().await? {
            integrations.push(integration_from_row(&row)?);
        }

        Ok(integrations)
    }

    async fn get_integration(&self, user_id: &str, id: Uuid) -> Result<Option<Integration>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {INTEGRATION_COLUMNS} FROM integrations WHERE user_id = ? AND id = ?"),
                params![user_id, id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(integration_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete_integration(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError> {
        let conn = self.get_conn().await?;

        let deleted = conn
            .execute(
                "DELETE FROM integrations WHERE user_id = ? AND id = ?",
                params![user_id, id.to_string()],
            )
            .await?;

        Ok(deleted > 0)
    }
}
