//! Webhook signatures and digests

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Validate a source-control push signature (`X-Hub-Signature-256` style)
/// against the raw request body. Comparison is constant-time.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    let sig_bytes = match hex::decode(sig) {
        Ok(b) => b,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// Non-reversible SHA-256 digest, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Generate a fresh webhook secret (32 random bytes, hex-encoded).
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"ref":"refs/heads/main"}"#;
        let sig = sign("s3cret", payload);
        assert!(verify_signature("s3cret", payload, &sig));
    }

    #[test]
    fn test_prefix_optional() {
        let payload = b"body";
        let sig = sign("s3cret", payload);
        let bare = sig.strip_prefix("sha256=").unwrap();
        assert!(verify_signature("s3cret", payload, bare));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"body";
        let sig = sign("s3cret", payload);
        assert!(!verify_signature("other", payload, &sig));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let sig = sign("s3cret", b"body");
        assert!(!verify_signature("s3cret", b"b0dy", &sig));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        assert!(!verify_signature("s3cret", b"body", "sha256=zzzz"));
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b"Hello World"),
            "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e"
        );
    }

    #[test]
    fn test_generate_secret_shape() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(hex::decode(&a).is_ok());
    }
}
