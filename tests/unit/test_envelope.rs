//! Secret envelope unit tests

use std::collections::HashMap;

use renderlite::crypto::envelope::mask_env;
use renderlite::crypto::SecretBox;

fn secret_box() -> SecretBox {
    SecretBox::new(&[42u8; 32])
}

#[test]
fn test_encrypt_decrypt_identity() {
    let sb = secret_box();
    for plaintext in [
        "",
        "short",
        "postgres://user:pass@db:5432/app?sslmode=require",
        "line one\nline two\n",
        "unicode: héllo wörld 日本語",
    ] {
        let envelope = sb.encrypt(plaintext).unwrap();
        assert_eq!(sb.decrypt(&envelope).unwrap(), plaintext, "round trip of {plaintext:?}");
    }
}

#[test]
fn test_envelope_format() {
    let envelope = secret_box().encrypt("value").unwrap();
    let parts: Vec<&str> = envelope.split(':').collect();
    assert_eq!(parts.len(), 3);
    // 16-byte IV and 16-byte tag, hex-encoded.
    assert_eq!(parts[0].len(), 32);
    assert_eq!(parts[1].len(), 32);
    assert!(parts.iter().all(|p| p.chars().all(|c| c.is_ascii_hexdigit())));
}

#[test]
fn test_unique_iv_per_encryption() {
    let sb = secret_box();
    let a = sb.encrypt("same plaintext").unwrap();
    let b = sb.encrypt("same plaintext").unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_every_flipped_ciphertext_byte_fails() {
    let sb = secret_box();
    let envelope = sb.encrypt("sensitive").unwrap();
    let parts: Vec<&str> = envelope.split(':').collect();
    let mut ct = hex::decode(parts[2]).unwrap();

    for i in 0..ct.len() {
        ct[i] ^= 0xff;
        let tampered = format!("{}:{}:{}", parts[0], parts[1], hex::encode(&ct));
        assert!(sb.decrypt(&tampered).is_err(), "byte {i} tamper must fail");
        ct[i] ^= 0xff;
    }
}

#[test]
fn test_tampered_iv_fails() {
    let sb = secret_box();
    let envelope = sb.encrypt("sensitive").unwrap();
    let parts: Vec<&str> = envelope.split(':').collect();
    let tampered = format!("{}:{}:{}", "00".repeat(16), parts[1], parts[2]);
    assert!(sb.decrypt(&tampered).is_err());
}

#[test]
fn test_malformed_envelopes_rejected() {
    let sb = secret_box();
    for bad in [
        "",
        "abc",
        "aa:bb",
        "aa:bb:cc:dd",
        "xx:yy:zz",
        "deadbeef:deadbeef:nothex!",
    ] {
        assert!(sb.decrypt(bad).is_err(), "{bad:?} must be rejected");
    }
}

#[test]
fn test_env_masking_hides_every_value() {
    let mut env = HashMap::new();
    env.insert("SECRET".to_string(), "aaaa:bbbb:cccc".to_string());
    env.insert("TOKEN".to_string(), "dddd:eeee:ffff".to_string());

    let masked = mask_env(&env);
    assert_eq!(masked.len(), 2);
    assert!(masked.values().all(|v| v == "********"));
}
