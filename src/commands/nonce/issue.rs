//! Issue a one-time challenge for a tag.

use std::sync::Arc;

use crate::auth::RateLimiter;
use crate::error::{AuthdError, ValidationErrorKind};
use crate::session::NonceSessionStore;
use crate::validation::Identifier;

use super::super::traits::Command;
use super::super::types::{CommandParams, CommandResult, ExecutionContext};

/// Creates a session bound to an identifier and returns its nonce.
///
/// Parameters:
/// - `identifier`: tag UID or current alias, even-length hex
///
/// Returns `{"sessionId", "nonce"}` with the nonce as 32 hex characters.
/// Each peer has a per-identifier challenge budget.
pub struct IssueNonceCommand {
    sessions: Arc<NonceSessionStore>,
    rate_limiter: Arc<RateLimiter>,
}

impl IssueNonceCommand {
    pub fn new(sessions: Arc<NonceSessionStore>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            sessions,
            rate_limiter,
        }
    }
}

/// A missing or non-string identifier is as malformed as bad hex.
fn identifier_param(params: &CommandParams) -> Result<Identifier, AuthdError> {
    let raw = params
        .get_optional_string("identifier")
        .ok_or_else(|| AuthdError::Validation {
            kind: ValidationErrorKind::MalformedIdentifier {
                message: "identifier must be a hex string".to_string(),
            },
        })?;
    Identifier::parse(&raw)
}

impl Command for IssueNonceCommand {
    fn name(&self) -> &'static str {
        "nonce.issue"
    }

    fn validate(&self, params: &CommandParams) -> Result<(), AuthdError> {
        identifier_param(params).map(|_| ())
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        params: CommandParams,
    ) -> Result<CommandResult, AuthdError> {
        let identifier = identifier_param(&params)?;
        self.rate_limiter
            .admit_challenge(ctx.peer.ip(), &identifier)?;
        let challenge = self.sessions.issue(&identifier)?;

        Ok(CommandResult::success(serde_json::json!({
            "sessionId": challenge.session_id,
            "nonce": challenge.nonce_hex(),
        })))
    }
}
