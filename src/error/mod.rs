//! Error types for the RFID authentication daemon.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
