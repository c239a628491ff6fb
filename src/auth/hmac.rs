//! HMAC-SHA256 tag response computation and verification.

use ring::hmac;

/// Keyed MAC over a tag challenge: `identifier_bytes ++ nonce`.
pub struct TagMac {
    key: hmac::Key,
}

impl TagMac {
    /// Create a MAC helper from a tag's secret key.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Compute the response a genuine tag would produce.
    pub fn sign(&self, identifier: &[u8], nonce: &[u8]) -> Vec<u8> {
        let tag = hmac::sign(&self.key, &challenge_message(identifier, nonce));
        tag.as_ref().to_vec()
    }

    /// Check a submitted response in constant time.
    pub fn verify(&self, identifier: &[u8], nonce: &[u8], mac: &[u8]) -> bool {
        hmac::verify(&self.key, &challenge_message(identifier, nonce), mac).is_ok()
    }
}

fn challenge_message(identifier: &[u8], nonce: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(identifier.len() + nonce.len());
    message.extend_from_slice(identifier);
    message.extend_from_slice(nonce);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    const UID: [u8; 4] = [0xC5, 0x9B, 0x37, 0x06];
    const NONCE: [u8; 16] = [7u8; 16];

    #[test]
    fn test_sign_then_verify() {
        let mac = TagMac::new(b"MiEjemplo");
        let response = mac.sign(&UID, &NONCE);

        assert_eq!(response.len(), 32);
        assert!(mac.verify(&UID, &NONCE, &response));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let response = TagMac::new(b"MiEjemplo").sign(&UID, &NONCE);
        assert!(!TagMac::new(b"OtraClave").verify(&UID, &NONCE, &response));
    }

    #[test]
    fn test_message_binds_identifier_and_nonce() {
        let mac = TagMac::new(b"MiEjemplo");
        let response = mac.sign(&UID, &NONCE);

        assert!(!mac.verify(&[0xDE, 0xAD, 0xBE, 0xEF], &NONCE, &response));
        assert!(!mac.verify(&UID, &[8u8; 16], &response));
    }

    #[test]
    fn test_truncated_mac_rejected() {
        let mac = TagMac::new(b"MiEjemplo");
        let response = mac.sign(&UID, &NONCE);
        assert!(!mac.verify(&UID, &NONCE, &response[..16]));
    }
}
