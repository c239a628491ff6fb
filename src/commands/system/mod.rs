//! System commands module.
//!
//! Liveness and monitoring endpoints.

mod metrics;
mod ping;

pub use metrics::MetricsCommand;
pub use ping::PingCommand;
