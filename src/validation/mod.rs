//! Input validation module.
//!
//! Parses and canonicalizes the hex-encoded values clients submit.

mod hex;

pub use hex::{parse_hmac, Identifier, HMAC_LEN, MAX_IDENTIFIER_HEX_LEN};
