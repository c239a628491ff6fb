//! Command trait definition.

use std::time::Duration;

use crate::error::AuthdError;

use super::types::{CommandParams, CommandResult, ExecutionContext};

/// Core trait for all executable commands.
///
/// Every command the daemon serves implements this trait.
///
/// # Example
///
/// ```ignore
/// pub struct EchoCommand;
///
/// impl Command for EchoCommand {
///     fn name(&self) -> &'static str {
///         "system.echo"
///     }
///
///     fn validate(&self, params: &CommandParams) -> Result<(), AuthdError> {
///         params.require_string("value")
///     }
///
///     fn execute(
///         &self,
///         _ctx: &ExecutionContext,
///         params: CommandParams,
///     ) -> Result<CommandResult, AuthdError> {
///         let value = params.get_string("value")?;
///         Ok(CommandResult::success(serde_json::json!({"value": value})))
///     }
/// }
/// ```
pub trait Command: Send + Sync {
    /// Unique command identifier (e.g., "nonce.issue", "tag.verify").
    fn name(&self) -> &'static str;

    /// Validate the command parameters before execution.
    ///
    /// Cheap shape checks only; nothing here may touch storage.
    fn validate(&self, params: &CommandParams) -> Result<(), AuthdError>;

    /// Execute the command.
    ///
    /// Called from a blocking context via `spawn_blocking`.
    fn execute(
        &self,
        ctx: &ExecutionContext,
        params: CommandParams,
    ) -> Result<CommandResult, AuthdError>;

    /// Upper bound on how long the caller waits for a result.
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}
