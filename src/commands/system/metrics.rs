//! Metrics command for monitoring daemon health.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::audit::AuditLog;
use crate::error::AuthdError;
use crate::session::NonceSessionStore;
use crate::socket::ConnectionMetrics;
use crate::storage::StorePool;

use super::super::traits::Command;
use super::super::types::{CommandParams, CommandResult, ExecutionContext};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns request and verdict counters, live session count and storage
/// health.
pub struct MetricsCommand {
    start_time: Instant,
    metrics: Arc<ConnectionMetrics>,
    sessions: Arc<NonceSessionStore>,
    audit: Arc<AuditLog>,
    pool: StorePool,
}

impl MetricsCommand {
    pub fn new(
        metrics: Arc<ConnectionMetrics>,
        sessions: Arc<NonceSessionStore>,
        audit: Arc<AuditLog>,
        pool: StorePool,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            metrics,
            sessions,
            audit,
            pool,
        }
    }

    /// Get the daemon uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Command for MetricsCommand {
    fn name(&self) -> &'static str {
        "system.metrics"
    }

    fn validate(&self, _params: &CommandParams) -> Result<(), AuthdError> {
        Ok(())
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        _params: CommandParams,
    ) -> Result<CommandResult, AuthdError> {
        let storage_healthy = match self.pool.health_check() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Storage health check failed");
                false
            }
        };
        let pool = self.pool.status();

        // A failing backend reports no count rather than failing the command.
        let live_sessions = self.sessions.len().ok();

        Ok(CommandResult::success(serde_json::json!({
            "uptime_seconds": self.uptime().as_secs(),
            "requests_total": self.metrics.total_requests(),
            "requests_failed": self.metrics.failed_requests(),
            "requests_rate_limited": self.metrics.rate_limited(),
            "active_connections": self.metrics.active(),
            "verifications_ok": self.metrics.verifications_ok(),
            "verifications_denied": self.metrics.verifications_denied(),
            "sessions": {
                "backend": self.sessions.backend_name(),
                "live": live_sessions,
            },
            "audit_dropped": self.audit.dropped(),
            "storage": {
                "healthy": storage_healthy,
                "connections": pool.connections,
                "idle_connections": pool.idle_connections,
            },
            "version": VERSION,
        })))
    }
}
