//! Tag registry types.

use std::fmt;

use chrono::{DateTime, Utc};

/// A registered tag as seen by the verifier.
#[derive(Clone)]
pub struct TagRecord {
    /// Stable tag identifier (canonical upper-case hex).
    pub uid: String,
    /// Per-tag HMAC key.
    pub secret_key: Vec<u8>,
    /// Pseudonym issued by the most recent rotation.
    pub current_alias: Option<String>,
    pub enabled: bool,
    pub last_rotated: Option<DateTime<Utc>>,
}

impl fmt::Debug for TagRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagRecord")
            .field("uid", &self.uid)
            .field("secret_key", &"[REDACTED]")
            .field("current_alias", &self.current_alias)
            .field("enabled", &self.enabled)
            .field("last_rotated", &self.last_rotated)
            .finish()
    }
}

/// Result of an atomic alias reservation plus tag update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasAssignment {
    /// The alias was reserved and is now the tag's current alias.
    Assigned,
    /// The alias was already reserved (or shadows a UID). Nothing changed.
    Collision,
    /// The tag is unknown or disabled. The reservation was rolled back.
    TagUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let record = TagRecord {
            uid: "C59B3706".to_string(),
            secret_key: b"MiEjemplo".to_vec(),
            current_alias: None,
            enabled: true,
            last_rotated: None,
        };

        let debug = format!("{:?}", record);
        assert!(debug.contains("C59B3706"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("77, 105"));
    }
}
