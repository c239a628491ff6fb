//! TCP server module.
//!
//! Handles listening and per-connection request processing.

mod connection;
mod listener;

pub use connection::handle_connection;
pub use listener::{ConnectionMetrics, SocketListener};
