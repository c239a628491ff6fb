//! Pooled SQLite connections shared by the registry, session and audit stores.

use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{AuthdError, StorageErrorKind};

use super::schema;

/// A connection checked out of the pool. Returned to the pool on drop.
pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub connections: u32,
    pub idle_connections: u32,
}

/// Explicit handle to the backing store.
///
/// Cloning is cheap; every clone shares the same underlying pool. Each
/// connection is health-checked when it is checked out.
#[derive(Clone)]
pub struct StorePool {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl StorePool {
    /// Open the database, build the pool and apply the schema.
    pub fn open(config: &StorageConfig) -> Result<Self, AuthdError> {
        let path = &config.database_path;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(path = %parent.display(), "Creating database directory");
                std::fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )
        });

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| AuthdError::Storage {
                kind: StorageErrorKind::PoolUnavailable {
                    message: format!("Failed to open database {}: {}", path.display(), e),
                },
            })?;

        let store = Self {
            pool,
            path: path.clone(),
        };

        let conn = store.get()?;
        schema::migrate(&conn)?;

        info!(
            path = %path.display(),
            pool_size = config.pool_size,
            "Storage pool ready"
        );

        Ok(store)
    }

    /// Check a connection out of the pool.
    ///
    /// Waits at most the configured connection timeout.
    pub fn get(&self) -> Result<PooledConn, AuthdError> {
        Ok(self.pool.get()?)
    }

    /// Round-trip a trivial query to confirm the store is reachable.
    pub fn health_check(&self) -> Result<(), AuthdError> {
        let conn = self.get()?;
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        if one != 1 {
            return Err(AuthdError::query("health check returned unexpected value"));
        }
        Ok(())
    }

    /// Current pool occupancy.
    pub fn status(&self) -> PoolStatus {
        let state = self.pool.state();
        PoolStatus {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_directory_and_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/authd.db");

        let pool = StorePool::open(&StorageConfig::at(&db_path)).unwrap();
        assert!(db_path.exists());
        assert_eq!(pool.path(), db_path);

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_health_check() {
        let temp_dir = TempDir::new().unwrap();
        let pool = StorePool::open(&StorageConfig::at(temp_dir.path().join("authd.db"))).unwrap();
        assert!(pool.health_check().is_ok());
        assert!(pool.status().connections >= 1);
    }

    #[test]
    fn test_connection_returned_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = StorageConfig::at(temp_dir.path().join("authd.db"));
        config.pool_size = 1;
        config.connection_timeout_ms = 100;
        let pool = StorePool::open(&config).unwrap();

        {
            let _held = pool.get().unwrap();
            let err = pool.get().err().unwrap();
            assert!(matches!(
                err,
                AuthdError::Storage {
                    kind: StorageErrorKind::PoolUnavailable { .. }
                }
            ));
        }

        assert!(pool.get().is_ok());
    }
}
