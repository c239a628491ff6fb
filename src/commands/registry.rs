//! Command registry for dispatching requests to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::RateLimiter;
use crate::error::{AuthdError, CommandErrorKind};
use crate::services::AuthServices;
use crate::socket::ConnectionMetrics;

use super::audit::AuditLogsCommand;
use super::nonce::IssueNonceCommand;
use super::system::{MetricsCommand, PingCommand};
use super::tag::VerifyTagCommand;
use super::traits::Command;
use super::types::{CommandParams, CommandResult, ExecutionContext};

/// Registry of all available commands.
#[derive(Clone)]
pub struct CommandRegistry {
    commands: HashMap<&'static str, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a registry with every built-in command.
    pub fn new(
        services: &AuthServices,
        metrics: Arc<ConnectionMetrics>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        let mut registry = Self {
            commands: HashMap::new(),
        };

        // System commands
        registry.register(Arc::new(PingCommand));
        registry.register(Arc::new(MetricsCommand::new(
            Arc::clone(&metrics),
            Arc::clone(&services.sessions),
            Arc::clone(&services.audit),
            services.pool.clone(),
        )));

        // Challenge-response
        registry.register(Arc::new(IssueNonceCommand::new(
            Arc::clone(&services.sessions),
            rate_limiter,
        )));
        registry.register(Arc::new(VerifyTagCommand::rotating(
            Arc::clone(&services.verifier),
            Arc::clone(&metrics),
        )));
        registry.register(Arc::new(VerifyTagCommand::without_alias(
            Arc::clone(&services.verifier),
            metrics,
        )));

        // Access log
        registry.register(Arc::new(AuditLogsCommand::new(Arc::clone(
            &services.access_log,
        ))));

        info!(
            count = registry.commands.len(),
            "Command registry initialized"
        );

        registry
    }

    /// Register a command.
    fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name();
        debug!(command = name, "Registering command");
        self.commands.insert(name, command);
    }

    /// Get a command by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Look up, validate and run a command.
    pub fn dispatch(
        &self,
        ctx: &ExecutionContext,
        command_name: &str,
        params: CommandParams,
    ) -> Result<CommandResult, AuthdError> {
        let command = self
            .commands
            .get(command_name)
            .ok_or_else(|| AuthdError::Command {
                kind: CommandErrorKind::UnknownCommand {
                    name: command_name.to_string(),
                },
            })?;

        command.validate(&params)?;

        command.execute(ctx, params)
    }

    /// List all registered command names.
    pub fn list_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
