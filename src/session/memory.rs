//! In-memory session backend.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::AuthdError;

use super::traits::SessionStore;
use super::types::Session;

/// Thread-safe in-memory session map.
///
/// Sessions do not survive a restart, which only shortens the replay window.
pub struct MemorySessionStore {
    /// Map of session id -> session.
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(), // Recover from mutex poisoning
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn insert(&self, session: Session) -> Result<(), AuthdError> {
        self.lock().insert(session.id.clone(), session);
        Ok(())
    }

    fn take(&self, session_id: &str, identifier: &str) -> Result<Option<Session>, AuthdError> {
        let mut sessions = self.lock();

        // Identifier check and removal happen under the same guard
        match sessions.get(session_id) {
            Some(session) if session.identifier == identifier => Ok(sessions.remove(session_id)),
            _ => Ok(None),
        }
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AuthdError> {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        Ok(before - sessions.len())
    }

    fn len(&self) -> Result<usize, AuthdError> {
        Ok(self.lock().len())
    }
}
