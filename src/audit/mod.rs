//! Audit logging module.
//!
//! Records one entry per verification attempt in the access log table and,
//! optionally, in a JSON lines file.
//!
//! ## Features
//!
//! - Non-blocking appends through a bounded queue
//! - Per-attempt write timeout with bounded retries
//! - Newest-first queries over the access log

mod dispatcher;
mod entry;
mod logger;

pub use dispatcher::AuditLog;
pub use entry::{AuditResult, LogEntry, LogRecord};
pub use logger::{AuditSink, JsonLinesAuditSink, SqliteAuditSink};

#[cfg(test)]
pub(crate) use logger::MemoryAuditSink;
