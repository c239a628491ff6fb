//! Query recent verification log entries.

use std::sync::Arc;

use crate::audit::SqliteAuditSink;
use crate::error::{AuthdError, ValidationErrorKind};
use crate::validation::Identifier;

use super::super::traits::Command;
use super::super::types::{CommandParams, CommandResult, ExecutionContext};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 500;

/// Returns the newest access log entries, optionally for one tag.
///
/// Parameters:
/// - `uid` (optional): tag UID, hex
/// - `limit` (optional): 1..=500, default 20
///
/// Entries are written asynchronously, so one appended a moment ago may not
/// be visible yet.
pub struct AuditLogsCommand {
    access_log: Arc<SqliteAuditSink>,
}

impl AuditLogsCommand {
    pub fn new(access_log: Arc<SqliteAuditSink>) -> Self {
        Self { access_log }
    }

    fn limit(params: &CommandParams) -> Result<usize, AuthdError> {
        let limit = params.get_optional_i64("limit")?.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AuthdError::Validation {
                kind: ValidationErrorKind::InvalidParameter {
                    param: "limit".to_string(),
                    message: format!("must be between 1 and {}", MAX_LIMIT),
                },
            });
        }
        Ok(limit as usize)
    }
}

impl Command for AuditLogsCommand {
    fn name(&self) -> &'static str {
        "audit.logs"
    }

    fn validate(&self, params: &CommandParams) -> Result<(), AuthdError> {
        Self::limit(params)?;
        if let Some(uid) = params.get_optional_string("uid") {
            Identifier::parse(&uid)?;
        }
        Ok(())
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        params: CommandParams,
    ) -> Result<CommandResult, AuthdError> {
        let limit = Self::limit(&params)?;
        let uid = params
            .get_optional_string("uid")
            .map(|raw| Identifier::parse(&raw))
            .transpose()?;

        let items = self
            .access_log
            .recent(uid.as_ref().map(|id| id.as_str()), limit)?;

        Ok(CommandResult::success(serde_json::json!({
            "count": items.len(),
            "items": items,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditSink, LogEntry};
    use crate::commands::types::test_context;
    use crate::config::StorageConfig;
    use crate::storage::StorePool;
    use tempfile::TempDir;

    fn command() -> (TempDir, Arc<SqliteAuditSink>, AuditLogsCommand) {
        let dir = TempDir::new().unwrap();
        let pool = StorePool::open(&StorageConfig::at(dir.path().join("authd.db"))).unwrap();
        let sink = Arc::new(SqliteAuditSink::new(pool));
        let cmd = AuditLogsCommand::new(sink.clone());
        (dir, sink, cmd)
    }

    #[test]
    fn test_logs_newest_first_filtered() {
        let (_dir, sink, cmd) = command();
        sink.write(&LogEntry::ok("C59B3706")).unwrap();
        sink.write(&LogEntry::denied("DEADBEEF", "NOT_AUTHORIZED")).unwrap();
        sink.write(&LogEntry::denied("C59B3706", "HMAC_INVALID")).unwrap();

        let params = CommandParams::new(serde_json::json!({"uid": "c59b3706"}));
        cmd.validate(&params).unwrap();
        let result = cmd.execute(&test_context("audit.logs"), params).unwrap();

        assert_eq!(result.data["count"], 2);
        let items = result.data["items"].as_array().unwrap();
        assert_eq!(items[0]["reason"], "HMAC_INVALID");
        assert_eq!(items[1]["result"], "OK");
        assert!(items[1].get("reason").is_none());
    }

    #[test]
    fn test_logs_default_limit() {
        let (_dir, sink, cmd) = command();
        for _ in 0..25 {
            sink.write(&LogEntry::ok("C59B3706")).unwrap();
        }

        let result = cmd
            .execute(&test_context("audit.logs"), CommandParams::new(serde_json::json!({})))
            .unwrap();
        assert_eq!(result.data["count"], 20);
    }

    #[test]
    fn test_logs_rejects_bad_params() {
        let (_dir, _sink, cmd) = command();

        let too_big = CommandParams::new(serde_json::json!({"limit": 501}));
        assert_eq!(cmd.validate(&too_big).unwrap_err().error_code(), "VALIDATION_ERROR");

        let bad_uid = CommandParams::new(serde_json::json!({"uid": "xyz"}));
        assert_eq!(
            cmd.validate(&bad_uid).unwrap_err().error_code(),
            "MALFORMED_IDENTIFIER"
        );
    }
}
