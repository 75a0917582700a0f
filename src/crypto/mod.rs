//! Secret handling: authenticated encryption at rest and webhook signatures

pub mod envelope;
pub mod webhook;

pub use envelope::{mask_env, SecretBox, MASKED_VALUE};
pub use webhook::{generate_secret, sha256_hex, verify_signature};
