use std::time::Duration;
use thiserror::Error;

use crate::monitoring::types::{ParseEnumError, TargetId};

/// Failures of the persistent store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Query(#[from] libsql::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("unable to decode stored row: {0}")]
    Decode(String),

    #[error("record conflicts with an existing one")]
    Conflict,

    #[error("record not found")]
    NotFound,
}

impl StoreError {
    /// Maps SQLite unique-constraint failures to [`StoreError::Conflict`].
    pub(crate) fn from_write(error: libsql::Error) -> Self {
        if error.to_string().contains("UNIQUE constraint failed") {
            StoreError::Conflict
        } else {
            StoreError::Query(error)
        }
    }
}

impl From<deadpool::managed::PoolError<libsql::Error>> for StoreError {
    fn from(error: deadpool::managed::PoolError<libsql::Error>) -> Self {
        StoreError::Pool(error.to_string())
    }
}

impl From<ParseEnumError> for StoreError {
    fn from(error: ParseEnumError) -> Self {
        StoreError::Decode(error.to_string())
    }
}

impl From<uuid::Error> for StoreError {
    fn from(error: uuid::Error) -> Self {
        StoreError::Decode(error.to_string())
    }
}

/// Why a single probe attempt could not produce a status code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Transport(String),
}

/// Scheduling lifecycle errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("target {0} is already scheduled")]
    AlreadyScheduled(TargetId),

    #[error("target {0} is not scheduled")]
    NotScheduled(TargetId),

    #[error("interval must be greater than zero")]
    InvalidInterval,

    #[error("scheduler has already been started")]
    AlreadyStarted,

    #[error("scheduler is not running")]
    NotRunning,

    #[error("failed to load monitor targets: {0}")]
    StartupLoadFailure(#[source] StoreError),
}
