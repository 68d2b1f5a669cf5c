//! Database abstraction layer
//!
//! Targets, probe results and integrations live in a local LibSQL (SQLite)
//! file accessed through a deadpool connection pool.

pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Database, DatabaseImpl, TargetStore};

use crate::error::StoreError;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<(), StoreError> {
    migrations::run_migrations(conn).await
}
