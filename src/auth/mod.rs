//! Authentication module.
//!
//! Runs the challenge-response verification state machine and limits
//! per-peer request rates.

mod hmac;
mod rate_limit;
mod verifier;

pub use hmac::TagMac;
pub use rate_limit::RateLimiter;
pub use verifier::{DenyReason, Stage, Verdict, Verifier, VerifyRequest, VerifyResponse};
