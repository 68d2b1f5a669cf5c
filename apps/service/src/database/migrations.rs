use libsql::Connection;

use crate::error::StoreError;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
///
/// This is the single source of truth for the database schema.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Initial schema").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Add integrations table").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
pub async fn get_current_version(conn: &Connection) -> Result<i32, StoreError> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<(), StoreError> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: monitor targets and their probe results
async fn run_migration_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitor_targets (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            protocol TEXT NOT NULL,
            url TEXT NOT NULL,
            interval_value INTEGER NOT NULL CHECK (interval_value > 0),
            interval_unit TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'unknown',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (user_id, protocol, url)
        )",
        (),
    )
    .await?;

    // seq breaks ties between results stamped in the same millisecond
    conn.execute(
        "CREATE TABLE IF NOT EXISTS probe_results (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            target_id TEXT NOT NULL,
            status TEXT NOT NULL,
            descriptor TEXT NOT NULL,
            latency_ms INTEGER NOT NULL,
            timestamp INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_targets_user ON monitor_targets(user_id)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_target_time ON probe_results(target_id, timestamp DESC)",
        (),
    )
    .await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_results_time ON probe_results(timestamp)", ()).await?;

    Ok(())
}

/// Migration v2: per-user notification integrations
async fn run_migration_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS integrations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            destination TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_integrations_user ON integrations(user_id)", ()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = libsql::Builder::new_local(dir.path().join("m.db")).build().await.unwrap();
        let conn = db.connect().unwrap();

        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        assert_eq!(get_current_version(&conn).await.unwrap(), SCHEMA_VERSION);
        let mut rows = conn.query("SELECT COUNT(*) FROM schema_migrations", ()).await.unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, i64::from(SCHEMA_VERSION));
    }
}
