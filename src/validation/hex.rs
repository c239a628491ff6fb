//! Hex input validation for tag identifiers and HMAC values.
//!
//! Identifiers are canonicalised to upper-case hex so that a UID and its
//! lower-case spelling name the same tag.

use std::fmt;

use crate::error::{AuthdError, ValidationErrorKind};

/// Maximum identifier length in hex characters (32 bytes).
pub const MAX_IDENTIFIER_HEX_LEN: usize = 64;

/// Length of an HMAC-SHA256 tag in bytes.
pub const HMAC_LEN: usize = 32;

/// A well-formed tag identifier: a UID or a current alias.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    canonical: String,
    bytes: Vec<u8>,
}

impl Identifier {
    /// Parse an identifier from its hex form.
    ///
    /// Accepts an optional `0x` prefix and surrounding whitespace. The hex body
    /// must be non-empty, of even length and at most
    /// [`MAX_IDENTIFIER_HEX_LEN`] characters.
    pub fn parse(raw: &str) -> Result<Self, AuthdError> {
        let body = strip_prefix(raw);
        let bytes = decode(body, MAX_IDENTIFIER_HEX_LEN).map_err(|message| {
            AuthdError::Validation {
                kind: ValidationErrorKind::MalformedIdentifier { message },
            }
        })?;

        Ok(Self {
            canonical: body.to_ascii_uppercase(),
            bytes,
        })
    }

    /// Canonical upper-case hex form.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Decoded identifier bytes, the HMAC message prefix.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.canonical)
    }
}

/// Parse a submitted HMAC value (64 hex characters).
pub fn parse_hmac(raw: &str) -> Result<[u8; HMAC_LEN], AuthdError> {
    let body = strip_prefix(raw);
    let bytes = decode(body, HMAC_LEN * 2).map_err(|message| AuthdError::malformed("hmac", message))?;

    bytes.try_into().map_err(|b: Vec<u8>| {
        AuthdError::malformed(
            "hmac",
            format!("expected {} bytes, got {}", HMAC_LEN, b.len()),
        )
    })
}

fn strip_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
}

fn decode(body: &str, max_len: usize) -> Result<Vec<u8>, String> {
    if body.is_empty() {
        return Err("value cannot be empty".to_string());
    }

    if body.len() > max_len {
        return Err(format!("exceeds maximum length of {} hex characters", max_len));
    }

    if body.len() % 2 != 0 {
        return Err("hex value must have an even number of characters".to_string());
    }

    if let Some(c) = body.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("invalid hex character '{}'", c));
    }

    hex::decode(body).map_err(|e| e.to_string())
}
