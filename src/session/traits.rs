//! Session backend trait.

use chrono::{DateTime, Utc};

use crate::error::AuthdError;

use super::types::Session;

/// Storage for live challenge sessions.
///
/// Implementations must make [`SessionStore::take`] atomic: of any number of
/// concurrent calls for the same session, at most one may return it.
pub trait SessionStore: Send + Sync {
    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Store a freshly issued session.
    fn insert(&self, session: Session) -> Result<(), AuthdError>;

    /// Remove and return the session matching both `session_id` and
    /// `identifier`. A session whose identifier differs is left untouched.
    fn take(&self, session_id: &str, identifier: &str) -> Result<Option<Session>, AuthdError>;

    /// Delete every session that expired before `now`. Returns the count removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AuthdError>;

    /// Number of stored sessions, expired ones included.
    fn len(&self) -> Result<usize, AuthdError>;
}
