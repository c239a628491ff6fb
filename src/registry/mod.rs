//! Tag registry module.
//!
//! Holds tags, their per-tag secrets and current aliases, and the global set
//! of reserved aliases.

mod sqlite;
mod traits;
mod types;

pub use sqlite::SqliteTagRegistry;
pub use traits::TagRegistry;
pub use types::{AliasAssignment, TagRecord};
