//! Audit sinks.
//!
//! The access log table is authoritative; a JSON lines file (one JSON object
//! per line) can mirror it for log shippers.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::params;
use tracing::{debug, warn};

use crate::error::AuthdError;
use crate::storage::{from_millis, StorePool};

use super::entry::{AuditResult, LogEntry, LogRecord};

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Sink name for logs.
    fn name(&self) -> &'static str;

    /// Durably write one entry.
    fn write(&self, entry: &LogEntry) -> Result<(), AuthdError>;
}

/// Access log stored in the shared database.
pub struct SqliteAuditSink {
    pool: StorePool,
}

impl SqliteAuditSink {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Most recent entries, newest first, optionally for one uid.
    pub fn recent(&self, uid: Option<&str>, limit: usize) -> Result<Vec<LogRecord>, AuthdError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, uid, result, reason, logged_at FROM access_log
             WHERE ?1 IS NULL OR uid = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![uid, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, uid, result, reason, logged_at) = row?;
            let result = AuditResult::parse(&result)
                .ok_or_else(|| AuthdError::query(format!("access_log row {} has result '{}'", id, result)))?;
            records.push(LogRecord {
                id,
                uid,
                result,
                reason,
                timestamp: from_millis(logged_at),
            });
        }

        Ok(records)
    }
}

impl AuditSink for SqliteAuditSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write(&self, entry: &LogEntry) -> Result<(), AuthdError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO access_log (uid, result, reason, logged_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.uid,
                entry.result.as_str(),
                entry.reason,
                entry.timestamp.timestamp_millis(),
            ],
        )?;
        Ok(())
    }
}

/// Writes audit entries to a file in JSON lines format.
///
/// Thread-safe via internal mutex.
pub struct JsonLinesAuditSink {
    /// The file handle wrapped in a mutex for thread safety.
    file: Mutex<File>,
    /// Path to the audit log file.
    path: PathBuf,
}

impl JsonLinesAuditSink {
    /// Open (or create) the file in append mode, creating the parent
    /// directory if needed.
    pub fn new(path: &Path) -> Result<Self, AuthdError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        debug!(path = %path.display(), "Audit log file opened");

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the audit log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn write(&self, entry: &LogEntry) -> Result<(), AuthdError> {
        let json = serde_json::to_string(entry)?;

        let mut file = self
            .file
            .lock()
            .map_err(|e| AuthdError::internal(format!("Failed to acquire audit log lock: {}", e)))?;

        writeln!(file, "{}", json)?;

        // Sync for durability
        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }

        Ok(())
    }
}

/// Collects entries in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryAuditSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[cfg(test)]
impl MemoryAuditSink {
    pub(crate) fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl AuditSink for MemoryAuditSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write(&self, entry: &LogEntry) -> Result<(), AuthdError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("subdir/audit.log");

        let sink = JsonLinesAuditSink::new(&log_path).unwrap();
        assert!(log_path.parent().unwrap().exists());
        assert_eq!(sink.path(), log_path);
    }

    #[test]
    fn test_jsonl_writes_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("audit.log");

        let sink = JsonLinesAuditSink::new(&log_path).unwrap();
        sink.write(&LogEntry::ok("C59B3706")).unwrap();
        sink.write(&LogEntry::denied("DEADBEEF", "NOT_AUTHORIZED")).unwrap();

        let mut content = String::new();
        File::open(&log_path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["uid"], "DEADBEEF");
        assert_eq!(parsed["result"], "DENIED");
        assert_eq!(parsed["reason"], "NOT_AUTHORIZED");
    }

    #[test]
    fn test_sqlite_recent_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let pool = StorePool::open(&StorageConfig::at(temp_dir.path().join("authd.db"))).unwrap();
        let sink = SqliteAuditSink::new(pool);

        sink.write(&LogEntry::ok("C59B3706")).unwrap();
        sink.write(&LogEntry::denied("DEADBEEF", "NOT_AUTHORIZED")).unwrap();
        sink.write(&LogEntry::denied("C59B3706", "HMAC_INVALID")).unwrap();

        let all = sink.recent(None, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].reason.as_deref(), Some("HMAC_INVALID"));
        assert!(all[0].id > all[1].id);

        let mine = sink.recent(Some("C59B3706"), 10).unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[1].result, AuditResult::Ok);

        assert_eq!(sink.recent(None, 1).unwrap().len(), 1);
    }
}
