//! Authenticated-encryption envelope for user-supplied secrets
//!
//! Every secret string (env-var value, OAuth token) is stored as
//! `hex(iv):hex(tag):hex(ciphertext)` under AES-256-GCM with a 16-byte IV.
//! The key comes from process configuration and must be stable across
//! processes and restarts, or previously stored secrets become
//! undecryptable.

use std::collections::HashMap;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::RngCore;

use crate::errors::CoreError;

/// AES-256-GCM with the envelope's 16-byte IV.
type EnvelopeCipher = AesGcm<Aes256, U16>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Placeholder rendered in place of env values on every outward-facing shape.
pub const MASKED_VALUE: &str = "********";

/// Symmetric envelope codec bound to the process encryption key.
#[derive(Clone)]
pub struct SecretBox {
    cipher: EnvelopeCipher,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}

impl SecretBox {
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = EnvelopeCipher::new(GenericArray::from_slice(key));
        Self { cipher }
    }

    /// Encrypt a plaintext into the `iv:tag:ciphertext` hex envelope form.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CoreError> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let sealed = self
            .cipher
            .encrypt(GenericArray::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CoreError::Crypto("encryption failed".to_string()))?;

        // The AEAD output is ciphertext with the tag appended.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt an envelope, authenticating it in the process.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CoreError> {
        let parts: Vec<&str> = envelope.split(':').collect();
        let [iv_hex, tag_hex, ct_hex] = parts.as_slice() else {
            return Err(CoreError::Validation(
                "invalid envelope: expected iv:tag:ciphertext".to_string(),
            ));
        };

        let iv = decode_part(iv_hex, "iv")?;
        let tag = decode_part(tag_hex, "tag")?;
        let ciphertext = decode_part(ct_hex, "ciphertext")?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(CoreError::Validation("invalid envelope: bad component length".to_string()));
        }

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(
                GenericArray::from_slice(&iv),
                Payload { msg: &sealed, aad: &[] },
            )
            .map_err(|_| CoreError::Crypto("decryption failed: envelope corrupt or wrong key".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| CoreError::Crypto("decrypted payload is not valid UTF-8".to_string()))
    }

    /// Encrypt an env map value-by-value, as the API boundary does on accept.
    pub fn encrypt_env(
        &self,
        env: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, CoreError> {
        env.iter()
            .map(|(k, v)| Ok((k.clone(), self.encrypt(v)?)))
            .collect()
    }

    /// Decrypt an env map value-by-value, at job-construction time only.
    pub fn decrypt_env(
        &self,
        env: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, CoreError> {
        env.iter()
            .map(|(k, v)| Ok((k.clone(), self.decrypt(v)?)))
            .collect()
    }
}

/// Mask every value of an env map for outward-facing payloads.
pub fn mask_env(env: &HashMap<String, String>) -> HashMap<String, String> {
    env.keys()
        .map(|k| (k.clone(), MASKED_VALUE.to_string()))
        .collect()
}

fn decode_part(hex_str: &str, name: &str) -> Result<Vec<u8>, CoreError> {
    hex::decode(hex_str)
        .map_err(|_| CoreError::Validation(format!("invalid envelope: {name} is not hex")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret_box() -> SecretBox {
        SecretBox::new(&[7u8; 32])
    }

    #[test]
    fn test_round_trip() {
        let sb = secret_box();
        let envelope = sb.encrypt("DATABASE_URL=postgres://localhost").unwrap();
        assert_eq!(envelope.split(':').count(), 3);
        assert_eq!(sb.decrypt(&envelope).unwrap(), "DATABASE_URL=postgres://localhost");
    }

    #[test]
    fn test_round_trip_empty_string() {
        let sb = secret_box();
        let envelope = sb.encrypt("").unwrap();
        assert_eq!(sb.decrypt(&envelope).unwrap(), "");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let sb = secret_box();
        let envelope = sb.encrypt("secret").unwrap();
        let mut parts: Vec<String> = envelope.split(':').map(String::from).collect();
        // Flip one nibble of the ciphertext.
        let ct = parts[2].clone();
        let flipped = if ct.starts_with('0') { "1" } else { "0" };
        parts[2] = format!("{}{}", flipped, &ct[1..]);
        assert!(sb.decrypt(&parts.join(":")).is_err());
    }

    #[test]
    fn test_tampered_tag_rejected() {
        let sb = secret_box();
        let envelope = sb.encrypt("secret").unwrap();
        let mut parts: Vec<String> = envelope.split(':').map(String::from).collect();
        parts[1] = "00".repeat(16);
        assert!(sb.decrypt(&parts.join(":")).is_err());
    }

    #[test]
    fn test_wrong_component_count_rejected() {
        let sb = secret_box();
        assert!(sb.decrypt("deadbeef:cafebabe").is_err());
        assert!(sb.decrypt("a:b:c:d").is_err());
        assert!(sb.decrypt("not an envelope").is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let envelope = secret_box().encrypt("secret").unwrap();
        let other = SecretBox::new(&[8u8; 32]);
        assert!(other.decrypt(&envelope).is_err());
    }

    #[test]
    fn test_env_map_round_trip_and_mask() {
        let sb = secret_box();
        let mut env = HashMap::new();
        env.insert("PORT".to_string(), "3000".to_string());
        env.insert("API_KEY".to_string(), "hunter2".to_string());

        let encrypted = sb.encrypt_env(&env).unwrap();
        assert_ne!(encrypted["API_KEY"], "hunter2");
        assert_eq!(sb.decrypt_env(&encrypted).unwrap(), env);

        let masked = mask_env(&encrypted);
        assert_eq!(masked["PORT"], MASKED_VALUE);
        assert_eq!(masked["API_KEY"], MASKED_VALUE);
    }
}
