// Hermod crypto vault.
//
// Grounded on everruns-storage's EncryptionService (AES-256-GCM +
// base64 envelope idiom), simplified per spec §4.2 from that file's
// per-value DEK-wrapped, key-rotating envelope down to a single master
// key with a flat `base64(nonce‖ciphertext‖tag)` wire format and no
// rotation support — the distilled spec has no concept of key_id or
// previous keys, so those fields are dropped rather than carried over
// unused.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::RngCore;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("ciphertext is not valid base64")]
    InvalidEncoding,
    #[error("ciphertext shorter than the nonce")]
    Truncated,
    #[error("decryption failed: authentication tag mismatch or corrupted data")]
    TagMismatch,
}

/// Encrypts/decrypts sensitive config values with a single AES-256-GCM
/// master key (spec §4.2). Keys shorter than 32 bytes are right-padded
/// with zeros; longer keys are truncated.
#[derive(Clone)]
pub struct Vault {
    cipher: Aes256Gcm,
}

impl Vault {
    pub fn new(master_key: &[u8]) -> Self {
        let mut key_bytes = [0u8; KEY_SIZE];
        let take = master_key.len().min(KEY_SIZE);
        key_bytes[..take].copy_from_slice(&master_key[..take]);
        let cipher = Aes256Gcm::new_from_slice(&key_bytes).expect("key is exactly 32 bytes");
        Self { cipher }
    }

    /// Builds a `Vault` from `HERMOD_MASTER_KEY`, treating its raw UTF-8
    /// bytes as the key material (padded/truncated per [`Vault::new`]).
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let raw = std::env::var("HERMOD_MASTER_KEY")?;
        Ok(Self::new(raw.as_bytes()))
    }

    /// `Encrypt(plaintext) → base64(nonce‖ciphertext‖tag)` with a fresh
    /// random 12-byte nonce per call.
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("AES-256-GCM encryption is infallible for well-formed input");

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        STANDARD.encode(out)
    }

    pub fn encrypt_string(&self, plaintext: &str) -> String {
        self.encrypt(plaintext.as_bytes())
    }

    /// Decrypts a `base64(nonce‖ciphertext‖tag)` value. Fails loudly
    /// (rather than returning garbage) on tag mismatch or truncation.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidEncoding)?;

        if raw.len() < NONCE_SIZE {
            return Err(CryptoError::Truncated);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::TagMismatch)
    }

    pub fn decrypt_to_string(&self, encoded: &str) -> Result<String, CryptoError> {
        let bytes = self.decrypt(encoded)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::TagMismatch)
    }
}

/// `GenerateToken() → url-safe base64(32 random bytes)`, used for
/// worker registration tokens (spec §4.2).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The `enc:` marker prefix a config value is stored with once
/// encrypted (spec §6 "Persisted state").
pub const ENCRYPTED_PREFIX: &str = "enc:";

pub fn mark_encrypted(ciphertext: &str) -> String {
    format!("{ENCRYPTED_PREFIX}{ciphertext}")
}

pub fn strip_marker(value: &str) -> Option<&str> {
    value.strip_prefix(ENCRYPTED_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let vault = Vault::new(b"0123456789abcdef0123456789abcdef");
        let encrypted = vault.encrypt_string("sk-test-api-key-12345");
        let decrypted = vault.decrypt_to_string(&encrypted).unwrap();
        assert_eq!(decrypted, "sk-test-api-key-12345");
    }

    #[test]
    fn same_plaintext_yields_different_ciphertext() {
        let vault = Vault::new(b"key-material");
        let a = vault.encrypt_string("same-plaintext");
        let b = vault.encrypt_string("same-plaintext");
        assert_ne!(a, b);
        assert_eq!(vault.decrypt_to_string(&a).unwrap(), "same-plaintext");
        assert_eq!(vault.decrypt_to_string(&b).unwrap(), "same-plaintext");
    }

    #[test]
    fn short_key_is_zero_padded() {
        let short = Vault::new(b"short");
        let padded = Vault::new(b"short\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0");
        let encrypted = short.encrypt_string("hello");
        assert_eq!(padded.decrypt_to_string(&encrypted).unwrap(), "hello");
    }

    #[test]
    fn key_change_invalidates_ciphertext() {
        let vault_a = Vault::new(b"vault-a-key-material");
        let vault_b = Vault::new(b"vault-b-different-key");
        let encrypted = vault_a.encrypt_string("secret-data");
        assert!(vault_b.decrypt(&encrypted).is_err());
    }

    #[test]
    fn rejects_truncated_ciphertext() {
        let vault = Vault::new(b"key");
        let err = vault.decrypt("AAAA").unwrap_err();
        assert!(matches!(err, CryptoError::Truncated));
    }

    #[test]
    fn rejects_invalid_base64() {
        let vault = Vault::new(b"key");
        let err = vault.decrypt("not valid base64!!!").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidEncoding));
    }

    #[test]
    fn token_is_url_safe_and_random() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(!a.contains('+'));
        assert!(!a.contains('/'));
        assert!(!a.contains('='));
    }

    #[test]
    fn marker_roundtrip() {
        let marked = mark_encrypted("abc123");
        assert_eq!(marked, "enc:abc123");
        assert_eq!(strip_marker(&marked), Some("abc123"));
        assert_eq!(strip_marker("plain-value"), None);
    }
}
