//! Nonce session lifecycle: issuance, one-time consumption and lazy expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AuthdError;
use crate::validation::Identifier;

use super::traits::SessionStore;
use super::types::{Consumed, IssuedChallenge, Session, NONCE_LEN};

/// Issues and consumes one-time challenge sessions.
pub struct NonceSessionStore {
    backend: Arc<dyn SessionStore>,
    ttl: Duration,
    rng: SystemRandom,
}

impl NonceSessionStore {
    /// Create a session store over `backend` with the given session lifetime.
    pub fn new(backend: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            rng: SystemRandom::new(),
        }
    }

    /// Session lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new challenge for a raw, not yet validated identifier.
    ///
    /// Fails with `MALFORMED_IDENTIFIER` before touching the backend if the
    /// identifier is not well-formed hex.
    pub fn create_session(&self, identifier: &str) -> Result<IssuedChallenge, AuthdError> {
        let identifier = Identifier::parse(identifier)?;
        self.issue(&identifier)
    }

    /// Issue a new challenge for an already validated identifier.
    pub fn issue(&self, identifier: &Identifier) -> Result<IssuedChallenge, AuthdError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| AuthdError::internal("system RNG failed to produce a nonce"))?;

        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| AuthdError::internal(format!("invalid session ttl: {}", e)))?;
        let created_at = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            identifier: identifier.as_str().to_string(),
            nonce,
            created_at,
            expire_at: created_at + ttl,
        };

        let challenge = IssuedChallenge {
            session_id: session.id.clone(),
            nonce,
            expire_at: session.expire_at,
        };

        self.backend.insert(session)?;

        debug!(
            session_id = %challenge.session_id,
            identifier = %identifier,
            "Challenge session created"
        );

        Ok(challenge)
    }

    /// Retrieve and invalidate a session in one step.
    ///
    /// The record is gone after this call whatever the outcome, so a session
    /// can be consumed at most once. Expiry is evaluated after removal.
    pub fn get_and_consume(
        &self,
        session_id: &str,
        identifier: &Identifier,
    ) -> Result<Consumed, AuthdError> {
        let Some(session) = self.backend.take(session_id, identifier.as_str())? else {
            return Ok(Consumed::NotFound);
        };

        if session.is_expired_at(Utc::now()) {
            debug!(session_id = %session_id, "Challenge session expired");
            return Ok(Consumed::Expired);
        }

        Ok(Consumed::Valid {
            nonce: session.nonce,
            expire_at: session.expire_at,
        })
    }

    /// Remove expired sessions. Returns the number reclaimed.
    pub fn cleanup(&self) -> Result<usize, AuthdError> {
        self.backend.purge_expired(Utc::now())
    }

    /// Number of sessions currently held by the backend.
    pub fn len(&self) -> Result<usize, AuthdError> {
        self.backend.len()
    }

    /// Whether the backend holds no sessions.
    pub fn is_empty(&self) -> Result<bool, AuthdError> {
        Ok(self.len()? == 0)
    }

    /// Backend name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Start a background reclamation task.
    ///
    /// Expiry is enforced lazily on consumption; this pass only bounds storage
    /// growth from challenges that are never answered.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                let sweep = Arc::clone(&store);
                match tokio::task::spawn_blocking(move || sweep.cleanup()).await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(removed)) => debug!(removed, "Expired sessions reclaimed"),
                    Ok(Err(e)) => warn!(error = %e, "Session cleanup failed"),
                    Err(e) => warn!(error = %e, "Session cleanup task panicked"),
                }
            }
        });
    }
}
