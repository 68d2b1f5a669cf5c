use chrono::{DateTime, Utc};
use libsql::Row;
use uuid::Uuid;

use crate::error::StoreError;
use crate::monitoring::types::{CheckInterval, Integration, MonitorTarget, ProbeResult};

/// Column list matching [`target_from_row`]
pub const TARGET_COLUMNS: &str =
    "id, user_id, protocol, url, interval_value, interval_unit, status, created_at, updated_at";

/// Column list matching [`result_from_row`]
pub const RESULT_COLUMNS: &str = "id, target_id, status, descriptor, latency_ms, timestamp";

/// Column list matching [`integration_from_row`]
pub const INTEGRATION_COLUMNS: &str = "id, user_id, kind, destination, created_at";

/// Timestamps are stored as Unix milliseconds
pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn i64_to_timestamp(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Decode(format!("timestamp {millis} out of range")))
}

fn uuid_at(row: &Row, idx: i32) -> Result<Uuid, StoreError> {
    Ok(Uuid::parse_str(&row.get::<String>(idx)?)?)
}

pub fn target_from_row(row: &Row) -> Result<MonitorTarget, StoreError> {
    let interval_value = row.get::<i64>(4)?;
    let interval_value = u32::try_from(interval_value)
        .map_err(|_| StoreError::Decode(format!("interval value {interval_value} out of range")))?;

    Ok(MonitorTarget {
        id: uuid_at(row, 0)?,
        user_id: row.get(1)?,
        protocol: row.get::<String>(2)?.parse()?,
        url: row.get(3)?,
        interval: CheckInterval::new(interval_value, row.get::<String>(5)?.parse()?),
        status: row.get::<String>(6)?.parse()?,
        created_at: i64_to_timestamp(row.get(7)?)?,
        updated_at: i64_to_timestamp(row.get(8)?)?,
    })
}

pub fn result_from_row(row: &Row) -> Result<ProbeResult, StoreError> {
    Ok(ProbeResult {
        id: uuid_at(row, 0)?,
        target_id: uuid_at(row, 1)?,
        status: row.get::<String>(2)?.parse()?,
        descriptor: row.get(3)?,
        latency_ms: row.get::<i64>(4)?.max(0) as u64,
        timestamp: i64_to_timestamp(row.get(5)?)?,
    })
}

pub fn integration_from_row(row: &Row) -> Result<Integration, StoreError> {
    Ok(Integration {
        id: uuid_at(row, 0)?,
        user_id: row.get(1)?,
        kind: row.get::<String>(2)?.parse()?,
        destination: row.get(3)?,
        created_at: i64_to_timestamp(row.get(4)?)?,
    })
}
