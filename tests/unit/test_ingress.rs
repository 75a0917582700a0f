//! Ingress validation tests

use hmac::{Hmac, Mac};
use renderlite::crypto::verify_signature;
use renderlite::ingress::{generate_subdomain, normalize_repo_url};
use sha2::Sha256;

#[test]
fn test_repo_url_normalization() {
    for (input, expected) in [
        ("https://github.com/acme/api.git", "https://github.com/acme/api"),
        ("https://github.com/acme/api", "https://github.com/acme/api"),
        ("https://gitlab.com/group/sub/project.git/", "https://gitlab.com/group/sub/project"),
        ("  https://github.com/acme/api.git  ", "https://github.com/acme/api"),
        ("http://git.internal/repo", "http://git.internal/repo"),
    ] {
        assert_eq!(normalize_repo_url(input).unwrap(), expected, "for {input:?}");
    }
}

#[test]
fn test_repo_url_rejections() {
    for input in [
        "git@github.com:acme/api.git",
        "ssh://git@github.com/acme/api",
        "file:///etc/passwd",
        "https://token@github.com/acme/api",
        "https://",
        "",
    ] {
        assert!(normalize_repo_url(input).is_err(), "{input:?} must be rejected");
    }
}

#[test]
fn test_subdomain_has_six_char_suffix_and_keeps_slug() {
    for name in ["api-x", "Shop Backend", "x"] {
        let subdomain = generate_subdomain(name);
        let (_slug, suffix) = subdomain.rsplit_once('-').unwrap();
        assert_eq!(suffix.len(), 6, "suffix of {subdomain}");
        assert!(subdomain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }
}

#[test]
fn test_webhook_signature_verification_against_known_mac() {
    let secret = "whsec_1234";
    let body = br#"{"ref":"refs/heads/main","after":"abc"}"#;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    assert!(verify_signature(secret, body, &signature));
    assert!(!verify_signature(secret, b"different body", &signature));
    assert!(!verify_signature("wrong secret", body, &signature));
    assert!(!verify_signature(secret, body, "sha256=00ff"));
}
