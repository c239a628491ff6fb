//! Verify a tag's challenge response.

use std::sync::Arc;

use crate::auth::{Verifier, VerifyRequest};
use crate::error::AuthdError;
use crate::socket::ConnectionMetrics;

use super::super::traits::Command;
use super::super::types::{CommandParams, CommandResult, ExecutionContext};

/// Runs the verifier on `{identifier, sessionId, hmac}`.
///
/// Serves `tag.verify` (rotates the alias on success) and
/// `tag.verify_no_alias` (leaves the alias untouched).
pub struct VerifyTagCommand {
    verifier: Arc<Verifier>,
    metrics: Arc<ConnectionMetrics>,
    rotate: bool,
}

impl VerifyTagCommand {
    /// `tag.verify`
    pub fn rotating(verifier: Arc<Verifier>, metrics: Arc<ConnectionMetrics>) -> Self {
        Self {
            verifier,
            metrics,
            rotate: true,
        }
    }

    /// `tag.verify_no_alias`
    pub fn without_alias(verifier: Arc<Verifier>, metrics: Arc<ConnectionMetrics>) -> Self {
        Self {
            verifier,
            metrics,
            rotate: false,
        }
    }
}

impl Command for VerifyTagCommand {
    fn name(&self) -> &'static str {
        if self.rotate {
            "tag.verify"
        } else {
            "tag.verify_no_alias"
        }
    }

    fn validate(&self, params: &CommandParams) -> Result<(), AuthdError> {
        params.parse::<VerifyRequest>().map(|_| ())
    }

    fn execute(
        &self,
        _ctx: &ExecutionContext,
        params: CommandParams,
    ) -> Result<CommandResult, AuthdError> {
        let request: VerifyRequest = params.parse()?;

        let verdict = if self.rotate {
            self.verifier.verify(&request)?
        } else {
            self.verifier.verify_without_rotation(&request)?
        };
        self.metrics.record_verdict(verdict.is_ok());

        Ok(CommandResult::success(serde_json::to_value(
            verdict.into_response(),
        )?))
    }
}
