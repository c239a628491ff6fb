//! Audit entry types.
//!
//! Defines the structure of verification log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal result of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditResult {
    Ok,
    Denied,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::Ok => "OK",
            AuditResult::Denied => "DENIED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OK" => Some(AuditResult::Ok),
            "DENIED" => Some(AuditResult::Denied),
            _ => None,
        }
    }
}

/// A single verification log entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Real tag uid when it was resolved, otherwise the submitted identifier.
    pub uid: String,
    pub result: AuditResult,
    /// Reason code; absent on a clean OK.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Entry for a successful verification.
    pub fn ok(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            result: AuditResult::Ok,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    /// Entry for a denied verification.
    pub fn denied(uid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            result: AuditResult::Denied,
            reason: Some(reason.into()),
            timestamp: Utc::now(),
        }
    }

    /// Attach a reason code.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A stored entry, as returned by log queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub id: i64,
    pub uid: String,
    pub result: AuditResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}
