//! SQLite schema for tags, alias reservations, sessions and the access log.
//!
//! Timestamps are stored as Unix milliseconds.

use rusqlite::Connection;

use crate::error::{AuthdError, StorageErrorKind};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tags (
        uid TEXT PRIMARY KEY,
        secret_key BLOB NOT NULL,
        current_alias TEXT UNIQUE,
        enabled INTEGER NOT NULL DEFAULT 1,
        last_rotated INTEGER
    );

    CREATE TABLE IF NOT EXISTS used_aliases (
        alias TEXT PRIMARY KEY,
        uid TEXT NOT NULL,
        reserved_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        identifier TEXT NOT NULL,
        nonce BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        expire_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_expire ON sessions(expire_at);

    CREATE TABLE IF NOT EXISTS access_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uid TEXT NOT NULL,
        result TEXT NOT NULL,
        reason TEXT,
        logged_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_access_log_uid ON access_log(uid, id);
";

/// Create all tables if they do not exist yet.
pub fn migrate(conn: &Connection) -> Result<(), AuthdError> {
    conn.execute_batch(SCHEMA).map_err(|e| AuthdError::Storage {
        kind: StorageErrorKind::Schema {
            message: e.to_string(),
        },
    })
}
