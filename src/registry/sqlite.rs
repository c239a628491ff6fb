//! SQLite-backed tag registry.
//!
//! Tables:
//! - `tags`: uid, secret_key, current_alias, enabled, last_rotated
//! - `used_aliases`: every alias ever reserved (primary key enforces uniqueness)

use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::error::AuthdError;
use crate::storage::{from_millis, StorePool};

use super::traits::TagRegistry;
use super::types::{AliasAssignment, TagRecord};

/// Tag registry over the shared connection pool.
pub struct SqliteTagRegistry {
    pool: StorePool,
}

impl SqliteTagRegistry {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a tag's key and enabled flag.
    ///
    /// Used to load fixtures; issuing tags is handled outside this daemon.
    pub fn seed_tag(&self, uid: &str, secret_key: &[u8], enabled: bool) -> Result<(), AuthdError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO tags (uid, secret_key, enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT(uid) DO UPDATE SET
                secret_key = excluded.secret_key,
                enabled = excluded.enabled",
            params![uid.to_ascii_uppercase(), secret_key, enabled],
        )?;
        Ok(())
    }

    /// Enable or disable a tag. Returns false if the tag does not exist.
    pub fn set_enabled(&self, uid: &str, enabled: bool) -> Result<bool, AuthdError> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE tags SET enabled = ?2 WHERE uid = ?1",
            params![uid.to_ascii_uppercase(), enabled],
        )?;
        Ok(updated > 0)
    }

    /// Number of aliases ever reserved.
    pub fn reserved_alias_count(&self) -> Result<usize, AuthdError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM used_aliases", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

impl TagRegistry for SqliteTagRegistry {
    fn lookup(&self, identifier: &str) -> Result<Option<TagRecord>, AuthdError> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                "SELECT uid, secret_key, current_alias, enabled, last_rotated FROM tags
                 WHERE uid = ?1 OR current_alias = ?1
                 ORDER BY uid = ?1 DESC
                 LIMIT 1",
                params![identifier],
                |row| {
                    Ok(TagRecord {
                        uid: row.get(0)?,
                        secret_key: row.get(1)?,
                        current_alias: row.get(2)?,
                        enabled: row.get(3)?,
                        last_rotated: row.get::<_, Option<i64>>(4)?.map(from_millis),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn assign_alias(
        &self,
        uid: &str,
        alias: &str,
        at: DateTime<Utc>,
    ) -> Result<AliasAssignment, AuthdError> {
        let mut conn = self.pool.get()?;

        // IMMEDIATE takes the write lock up front; concurrent rotations queue on busy_timeout
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // An alias must never shadow another tag's UID
        let shadows_uid: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM tags WHERE uid = ?1)",
            params![alias],
            |row| row.get(0),
        )?;
        if shadows_uid {
            return Ok(AliasAssignment::Collision);
        }

        match tx.execute(
            "INSERT INTO used_aliases (alias, uid, reserved_at) VALUES (?1, ?2, ?3)",
            params![alias, uid, at.timestamp_millis()],
        ) {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                debug!(uid = %uid, "Alias collision");
                return Ok(AliasAssignment::Collision);
            }
            Err(e) => return Err(e.into()),
        }

        let updated = match tx.execute(
            "UPDATE tags SET current_alias = ?2, last_rotated = ?3 WHERE uid = ?1 AND enabled = 1",
            params![uid, alias, at.timestamp_millis()],
        ) {
            Ok(n) => n,
            Err(e) if is_constraint_violation(&e) => return Ok(AliasAssignment::Collision),
            Err(e) => return Err(e.into()),
        };

        if updated == 0 {
            // Dropping the transaction rolls the reservation back
            return Ok(AliasAssignment::TagUnavailable);
        }

        tx.commit()?;
        Ok(AliasAssignment::Assigned)
    }
}
