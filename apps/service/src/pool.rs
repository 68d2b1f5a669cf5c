use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use deadpool::managed::{self, Pool, RecycleError, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError, params};

use crate::error::StoreError;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT_MS: i64 = 5000;

pub struct LibsqlManager {
    database: Database,
    recycle_count: AtomicI64,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database, recycle_count: AtomicI64::new(0) }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        // PRAGMA statements return a row, so they go through query
        conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ()).await?;
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        let recycle_count = self.recycle_count.fetch_add(1, Ordering::Relaxed);
        let row = conn
            .query("SELECT ?1", params![recycle_count])
            .await?
            .next()
            .await?
            .ok_or(LibsqlError::QueryReturnedNoRows)?;
        if row.get::<i64>(0)? != recycle_count {
            return Err(RecycleError::Message("connection returned a stale row".into()));
        }
        Ok(())
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (or create) the local database file and wrap it in a pool
pub async fn open_pool(path: &Path, max_size: usize) -> Result<LibsqlPool, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Pool(format!("cannot create {}: {e}", parent.display())))?;
    }

    let database = libsql::Builder::new_local(path).build().await?;
    Pool::builder(LibsqlManager::new(database))
        .max_size(max_size.max(1))
        .build()
        .map_err(|e| StoreError::Pool(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pooled_connections_are_recycled() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("nested/pool.db"), 2).await.unwrap();

        for _ in 0..3 {
            let conn = pool.get().await.unwrap();
            let mut rows = conn.query("SELECT 1", ()).await.unwrap();
            let row = rows.next().await.unwrap().unwrap();
            assert_eq!(row.get::<i64>(0).unwrap(), 1);
        }
        assert!(dir.path().join("nested/pool.db").exists());
    }
}
