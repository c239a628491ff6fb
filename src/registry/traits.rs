//! Tag registry trait.

use chrono::{DateTime, Utc};

use crate::error::AuthdError;

use super::types::{AliasAssignment, TagRecord};

/// Authoritative store of tags, their keys and their current alias.
pub trait TagRegistry: Send + Sync {
    /// Find a tag by UID or by its current alias.
    ///
    /// Disabled tags are returned with `enabled = false`.
    fn lookup(&self, identifier: &str) -> Result<Option<TagRecord>, AuthdError>;

    /// Reserve `alias` globally and make it the current alias of `uid`.
    ///
    /// Reservation and assignment commit together or not at all.
    fn assign_alias(
        &self,
        uid: &str,
        alias: &str,
        at: DateTime<Utc>,
    ) -> Result<AliasAssignment, AuthdError>;
}
