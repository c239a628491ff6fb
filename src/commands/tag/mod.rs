//! Tag verification commands.

mod verify;

pub use verify::VerifyTagCommand;
