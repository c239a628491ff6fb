//! rfid-authd library
//!
//! Challenge-response authentication for RFID tags: one-time nonce sessions,
//! HMAC verification against per-tag secrets, alias rotation after each
//! successful verification, and an access log of every attempt.

pub mod alias;
pub mod audit;
pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod services;
pub mod session;
pub mod socket;
pub mod storage;
pub mod validation;
