//! SQLite session backend.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::AuthdError;
use crate::storage::{from_millis, StorePool};

use super::traits::SessionStore;
use super::types::{Session, NONCE_LEN};

/// Sessions persisted in the shared database.
///
/// Consumption is a single `DELETE … RETURNING` statement, so the row is
/// read and removed atomically.
pub struct SqliteSessionStore {
    pool: StorePool,
}

impl SqliteSessionStore {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }
}

impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn insert(&self, session: Session) -> Result<(), AuthdError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO sessions (session_id, identifier, nonce, created_at, expire_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.identifier,
                &session.nonce[..],
                session.created_at.timestamp_millis(),
                session.expire_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn take(&self, session_id: &str, identifier: &str) -> Result<Option<Session>, AuthdError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "DELETE FROM sessions WHERE session_id = ?1 AND identifier = ?2
                 RETURNING nonce, created_at, expire_at",
                params![session_id, identifier],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((nonce, created_at, expire_at)) = row else {
            return Ok(None);
        };

        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| AuthdError::query(format!("session {} has a corrupt nonce", session_id)))?;

        Ok(Some(Session {
            id: session_id.to_string(),
            identifier: identifier.to_string(),
            nonce,
            created_at: from_millis(created_at),
            expire_at: from_millis(expire_at),
        }))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AuthdError> {
        let conn = self.pool.get()?;
        let removed = conn.execute(
            "DELETE FROM sessions WHERE expire_at < ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(removed)
    }

    fn len(&self) -> Result<usize, AuthdError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use chrono::Duration;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteSessionStore) {
        let temp_dir = TempDir::new().unwrap();
        let pool = StorePool::open(&StorageConfig::at(temp_dir.path().join("authd.db"))).unwrap();
        (temp_dir, SqliteSessionStore::new(pool))
    }

    fn session(id: &str, ttl_ms: i64) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            identifier: "C59B3706".to_string(),
            nonce: [0x42; NONCE_LEN],
            created_at: now,
            expire_at: now + Duration::milliseconds(ttl_ms),
        }
    }

    #[test]
    fn test_take_returns_stored_nonce_once() {
        let (_dir, store) = open_store();
        store.insert(session("s1", 5_000)).unwrap();

        let taken = store.take("s1", "C59B3706").unwrap().unwrap();
        assert_eq!(taken.nonce, [0x42; NONCE_LEN]);
        assert!(store.take("s1", "C59B3706").unwrap().is_none());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_take_with_other_identifier_keeps_session() {
        let (_dir, store) = open_store();
        store.insert(session("s1", 5_000)).unwrap();

        assert!(store.take("s1", "DEADBEEF").unwrap().is_none());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let (_dir, store) = open_store();
        store.insert(session("old", -1_000)).unwrap();
        store.insert(session("live", 60_000)).unwrap();

        assert_eq!(store.purge_expired(Utc::now()).unwrap(), 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_take_single_winner() {
        let (_dir, store) = open_store();
        let store = Arc::new(store);

        for round in 0..5 {
            let session_id = format!("race-{}", round);
            store.insert(session(&session_id, 5_000)).unwrap();

            let contenders = 8;
            let barrier = Arc::new(Barrier::new(contenders));
            let handles: Vec<_> = (0..contenders)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    let session_id = session_id.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        store.take(&session_id, "C59B3706").unwrap()
                    })
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(Option::is_some)
                .count();
            assert_eq!(winners, 1, "round {}", round);
            assert_eq!(store.len().unwrap(), 0);
        }
    }
}
