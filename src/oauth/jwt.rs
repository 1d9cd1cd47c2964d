//! JWT assertion generator
//!
//! Mints the short-lived HS256 token exchanged through the jwt-bearer grant
//! after a successful OTP validation. This is an internal assertion only;
//! the backend's token endpoint is what validates it.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, KeyInit, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of a generated assertion in seconds
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// Generate a signed JWT for validating against the token endpoint.
///
/// The token is three base64url segments without padding, signed with
/// HMAC-SHA256 over `header.payload` using `signing_secret` as the raw key
/// bytes. `exp` is always `iat + 3600` and `jti` is a fresh UUID per call.
#[must_use]
pub fn generate_jwt(signing_secret: &str, subject: &str, issuer: &str, audience: &str) -> String {
    let header = json!({
        "alg": "HS256",
        "typ": "JWT"
    });

    let iat = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let payload = json!({
        "sub": subject,
        "iat": iat,
        "exp": iat + ASSERTION_LIFETIME_SECS,
        "iss": issuer,
        "aud": audience,
        "jti": Uuid::new_v4().to_string()
    });

    // Serializing plain JSON maps cannot fail.
    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload.to_string());

    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(signing_input.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{signing_input}.{signature_b64}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn decode_segment(segment: &str) -> Value {
        let bytes = URL_SAFE_NO_PAD.decode(segment).expect("base64url segment");
        serde_json::from_slice(&bytes).expect("JSON segment")
    }

    #[test]
    fn produces_three_base64url_segments() {
        let jwt = generate_jwt("secret", "user-1", "http://localhost:8080", "https://idp/token");
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        for part in &parts {
            assert!(!part.contains('+'));
            assert!(!part.contains('/'));
            assert!(!part.contains('='));
        }
    }

    #[test]
    fn header_declares_hs256() {
        let jwt = generate_jwt("secret", "user-1", "issuer", "audience");
        let header = decode_segment(jwt.split('.').next().unwrap());
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["typ"], "JWT");
    }

    #[test]
    fn payload_expires_one_hour_after_issue() {
        let jwt = generate_jwt("secret", "user-1", "issuer", "audience");
        let payload = decode_segment(jwt.split('.').nth(1).unwrap());

        let iat = payload["iat"].as_u64().expect("iat");
        let exp = payload["exp"].as_u64().expect("exp");
        assert_eq!(exp, iat + 3600);
        assert_eq!(payload["sub"], "user-1");
        assert_eq!(payload["iss"], "issuer");
        assert_eq!(payload["aud"], "audience");
    }

    #[test]
    fn jti_is_fresh_per_call() {
        let a = generate_jwt("secret", "user-1", "issuer", "audience");
        let b = generate_jwt("secret", "user-1", "issuer", "audience");

        let jti_a = decode_segment(a.split('.').nth(1).unwrap())["jti"].clone();
        let jti_b = decode_segment(b.split('.').nth(1).unwrap())["jti"].clone();
        assert_ne!(jti_a, jti_b);
    }

    #[test]
    fn signature_verifies_against_signing_input() {
        let jwt = generate_jwt("top-secret", "user-1", "issuer", "audience");
        let parts: Vec<&str> = jwt.split('.').collect();

        let mut mac = HmacSha256::new_from_slice(b"top-secret").unwrap();
        mac.update(format!("{}.{}", parts[0], parts[1]).as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        assert_eq!(parts[2], expected);
    }
}
