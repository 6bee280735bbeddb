//! Transparent encryption of sensitive connector config fields (spec
//! §4.1 "Sensitive fields": "a fixed set of config keys (password,
//! token, secret, uri, ...) is transparently encrypted on write with
//! an `enc:` prefix and decrypted on read; decryption failures leave
//! the original value").
//!
//! Grounded on `everruns-storage::encryption::EncryptionService`'s
//! transparent field-level encrypt/decrypt pass, simplified to the
//! single-master-key [`hermod_crypto::Vault`] (no per-value DEK).

use hermod_crypto::Vault;
use serde_json::{Map, Value};

/// Config keys treated as sensitive. Matched as a case-insensitive
/// substring of the map key, so `db_password`, `api_token`, and
/// `connection_uri` are all covered.
const SENSITIVE_MARKERS: &[&str] = &["password", "token", "secret", "uri", "api_key"];

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Encrypts every sensitive string value in place, marking it with the
/// `enc:` prefix. Already-marked values and non-string values are left
/// untouched.
pub fn encrypt_config(config: &mut Map<String, Value>, vault: &Vault) {
    for (key, value) in config.iter_mut() {
        if !is_sensitive(key) {
            continue;
        }
        if let Value::String(plain) = value {
            if hermod_crypto::strip_marker(plain).is_some() {
                continue;
            }
            let ciphertext = vault.encrypt_string(plain);
            *value = Value::String(hermod_crypto::mark_encrypted(&ciphertext));
        }
    }
}

/// Decrypts every `enc:`-marked string value in place. A decryption
/// failure (wrong key, corrupted ciphertext) leaves the stored value
/// unchanged, per spec: "decryption failures leave the original value".
pub fn decrypt_config(config: &mut Map<String, Value>, vault: &Vault) {
    for value in config.values_mut() {
        if let Value::String(stored) = value {
            let Some(ciphertext) = hermod_crypto::strip_marker(stored) else {
                continue;
            };
            if let Ok(plain) = vault.decrypt_to_string(ciphertext) {
                *value = Value::String(plain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> Vault {
        Vault::new(b"a test master key padded to size")
    }

    #[test]
    fn round_trips_sensitive_keys_only() {
        let v = vault();
        let mut config: Map<String, Value> = serde_json::from_value(serde_json::json!({
            "host": "db.internal",
            "password": "hunter2",
            "api_key": "abc123",
        }))
        .unwrap();

        encrypt_config(&mut config, &v);
        assert_eq!(config["host"], Value::String("db.internal".into()));
        assert!(config["password"].as_str().unwrap().starts_with("enc:"));
        assert!(config["api_key"].as_str().unwrap().starts_with("enc:"));

        decrypt_config(&mut config, &v);
        assert_eq!(config["password"], Value::String("hunter2".into()));
        assert_eq!(config["api_key"], Value::String("abc123".into()));
    }

    #[test]
    fn decryption_failure_leaves_original_value() {
        let v = vault();
        let mut config: Map<String, Value> = serde_json::from_value(serde_json::json!({
            "token": "enc:not-valid-base64!!",
        }))
        .unwrap();

        decrypt_config(&mut config, &v);
        assert_eq!(config["token"], Value::String("enc:not-valid-base64!!".into()));
    }

    #[test]
    fn wrong_key_leaves_ciphertext_untouched() {
        let v1 = vault();
        let v2 = Vault::new(b"a completely different key......");
        let mut config: Map<String, Value> = serde_json::from_value(serde_json::json!({
            "secret": "top secret value",
        }))
        .unwrap();

        encrypt_config(&mut config, &v1);
        let ciphertext = config["secret"].clone();
        decrypt_config(&mut config, &v2);
        assert_eq!(config["secret"], ciphertext);
    }
}
