//! Access log query commands.

mod logs;

pub use logs::AuditLogsCommand;
