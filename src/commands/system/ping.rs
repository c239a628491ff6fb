//! Ping command for health checking.

use crate::error::AuthdError;

use super::super::traits::Command;
use super::super::types::{CommandParams, CommandResult, ExecutionContext};

/// Simple ping command that returns a pong response.
///
/// Used for health checks and verifying the daemon is responsive.
pub struct PingCommand;

impl Command for PingCommand {
    fn name(&self) -> &'static str {
        "system.ping"
    }

    fn validate(&self, _params: &CommandParams) -> Result<(), AuthdError> {
        // Ping has no required parameters
        Ok(())
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        _params: CommandParams,
    ) -> Result<CommandResult, AuthdError> {
        Ok(CommandResult::success(serde_json::json!({
            "pong": true,
            "timestamp": ctx.received_at.timestamp(),
            "request_id": ctx.request_id.to_string(),
        })))
    }
}
