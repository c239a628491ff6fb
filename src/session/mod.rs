//! Challenge session module.
//!
//! Issues one-time nonce sessions with a TTL and consumes them atomically.
//! Backends live behind [`SessionStore`]: an in-memory map or the shared
//! SQLite database.

mod memory;
mod sqlite;
mod store;
mod traits;
mod types;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;
pub use store::NonceSessionStore;
pub use traits::SessionStore;
pub use types::{Consumed, IssuedChallenge, Session, NONCE_LEN};
