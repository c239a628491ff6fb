//! Storage module.
//!
//! An r2d2 pool of SQLite connections, handed explicitly to every component
//! that needs the database.

mod pool;
mod schema;

pub use pool::{PoolStatus, PooledConn, StorePool};
pub use schema::migrate;

use chrono::{DateTime, Utc};

/// Convert stored Unix milliseconds back into a timestamp.
pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}
