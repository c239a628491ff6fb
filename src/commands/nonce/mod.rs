//! Challenge issuance commands.

mod issue;

pub use issue::IssueNonceCommand;
