//! Request signing.

use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The three values that authenticate one signed request.
#[derive(Debug, Clone)]
pub struct SignatureBundle {
    /// Hex-encoded HMAC-SHA-256 (64 chars).
    pub hmac: String,
    /// ISO-8601 UTC timestamp generated at send time.
    pub timestamp: String,
    /// Fresh random request id, 128 bits hex-encoded.
    pub request_id: String,
}

/// Compute the hex HMAC over `timestamp "." request_id "." body`.
#[must_use]
pub fn compute_hmac(secret: &str, timestamp: &str, request_id: &str, body: &[u8]) -> String {
    let mut mac = mac_for(secret);
    feed(&mut mac, timestamp, request_id, body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a claimed hex HMAC against the wire format.
///
/// Returns `false` on a mismatch or on undecodable hex.
#[must_use]
pub fn verify_hmac(
    secret: &str,
    timestamp: &str,
    request_id: &str,
    body: &[u8],
    claimed_hex: &str,
) -> bool {
    let Ok(claimed) = hex::decode(claimed_hex) else {
        return false;
    };
    let mut mac = mac_for(secret);
    feed(&mut mac, timestamp, request_id, body);
    // `verify_slice` is the constant-time comparison.
    mac.verify_slice(&claimed).is_ok()
}

/// Sign a body with a fresh timestamp and request id.
#[must_use]
pub fn sign_body(secret: &str, body: &[u8]) -> SignatureBundle {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let request_id = fresh_request_id();
    let hmac = compute_hmac(secret, &timestamp, &request_id, body);
    SignatureBundle {
        hmac,
        timestamp,
        request_id,
    }
}

/// Mint a random request id with 128 bits of entropy, hex-encoded.
#[must_use]
pub fn fresh_request_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn mac_for(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length")
}

fn feed(mac: &mut HmacSha256, timestamp: &str, request_id: &str, body: &[u8]) {
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(request_id.as_bytes());
    mac.update(b".");
    mac.update(body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_is_64_hex_chars() {
        let bundle = sign_body("secret", br#"{"taskId":"T1"}"#);
        assert_eq!(bundle.hmac.len(), 64);
        assert!(bundle.hmac.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(bundle.request_id.len(), 32);
    }

    #[test]
    fn test_sign_then_verify() {
        let body = br#"{"taskId":"T3"}"#;
        let bundle = sign_body("s", body);
        assert!(verify_hmac("s", &bundle.timestamp, &bundle.request_id, body, &bundle.hmac));
    }

    #[test]
    fn test_one_byte_body_mutation_fails() {
        let body = br#"{"taskId":"T3"}"#;
        let bundle = sign_body("s", body);
        let mutated = br#"{"taskId":"T4"}"#;
        assert!(!verify_hmac(
            "s",
            &bundle.timestamp,
            &bundle.request_id,
            mutated,
            &bundle.hmac
        ));
    }

    #[test]
    fn test_request_id_is_part_of_the_input() {
        let body = b"{}";
        let bundle = sign_body("s", body);
        assert!(!verify_hmac("s", &bundle.timestamp, "00000000000000000000000000000000", body, &bundle.hmac));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let body = b"{}";
        let bundle = sign_body("s", body);
        assert!(!verify_hmac("other", &bundle.timestamp, &bundle.request_id, body, &bundle.hmac));
    }

    #[test]
    fn test_undecodable_hex_fails_closed() {
        assert!(!verify_hmac("s", "2026-01-01T00:00:00Z", "abc", b"{}", "zz-not-hex"));
    }

    #[test]
    fn test_request_ids_do_not_repeat() {
        let a = fresh_request_id();
        let b = fresh_request_id();
        assert_ne!(a, b);
    }
}
