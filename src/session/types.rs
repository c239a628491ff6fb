//! Challenge session types.

use chrono::{DateTime, Utc};

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 16;

/// A one-time challenge bound to an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque, unguessable session token.
    pub id: String,
    /// Canonical identifier the challenge was issued for.
    pub identifier: String,
    /// Random challenge bytes.
    pub nonce: [u8; NONCE_LEN],
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_at
    }
}

/// What a client receives when requesting a challenge.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub session_id: String,
    pub nonce: [u8; NONCE_LEN],
    pub expire_at: DateTime<Utc>,
}

impl IssuedChallenge {
    /// Nonce as lower-case hex (32 characters).
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce)
    }
}

/// Outcome of consuming a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumed {
    /// The session existed, matched the identifier and was still live.
    Valid {
        nonce: [u8; NONCE_LEN],
        expire_at: DateTime<Utc>,
    },
    /// The session existed but had expired. It has been deleted.
    Expired,
    /// No session with that id exists for that identifier.
    NotFound,
}
