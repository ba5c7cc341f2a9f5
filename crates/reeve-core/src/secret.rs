//! Encryption of secret values embedded in repository configuration.
//!
//! Secrets are sealed with AES-256-GCM. The cipher key is the SHA-256 digest of
//! the configured secret key, and the encoded form is `base64(nonce || ciphertext)`.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("no secret key configured")]
    InvalidKey,

    #[error("malformed secret value: {0}")]
    Malformed(String),

    #[error("decryption failed")]
    Decrypt,
}

fn cipher(key: &str) -> Result<Aes256Gcm, SecretError> {
    if key.is_empty() {
        return Err(SecretError::InvalidKey);
    }
    let digest = Sha256::digest(key.as_bytes());
    Aes256Gcm::new_from_slice(&digest).map_err(|_| SecretError::InvalidKey)
}

/// Encrypt `plaintext` into a literal suitable for a `secret` document.
pub fn encrypt_secret(key: &str, plaintext: &str) -> Result<String, SecretError> {
    let cipher = cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| SecretError::Malformed("encryption failed".to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(sealed))
}

/// Decrypt a literal produced by [`encrypt_secret`].
///
/// A wrong key or tampered value fails authentication and never yields plaintext.
pub fn decrypt_secret(key: &str, encrypted: &str) -> Result<String, SecretError> {
    let cipher = cipher(key)?;
    let sealed = BASE64
        .decode(encrypted.trim())
        .map_err(|e| SecretError::Malformed(e.to_string()))?;

    if sealed.len() <= NONCE_SIZE {
        return Err(SecretError::Malformed("value too short".to_string()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SecretError::Decrypt)?;

    String::from_utf8(plaintext).map_err(|e| SecretError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let encrypted = encrypt_secret("key", "hello").unwrap();
        assert_eq!(decrypt_secret("key", &encrypted).unwrap(), "hello");
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt_secret("key", "hello").unwrap();
        let result = decrypt_secret("other-key", &encrypted);
        assert!(matches!(result, Err(SecretError::Decrypt)));
    }

    #[test]
    fn test_nonce_is_random() {
        let a = encrypt_secret("key", "hello").unwrap();
        let b = encrypt_secret("key", "hello").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_value_fails() {
        let encrypted = encrypt_secret("key", "hello").unwrap();
        let mut sealed = BASE64.decode(&encrypted).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        let result = decrypt_secret("key", &BASE64.encode(sealed));
        assert!(matches!(result, Err(SecretError::Decrypt)));
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            decrypt_secret("key", "not base64!"),
            Err(SecretError::Malformed(_))
        ));
        assert!(matches!(
            decrypt_secret("key", "c2hvcnQ="),
            Err(SecretError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            encrypt_secret("", "hello"),
            Err(SecretError::InvalidKey)
        ));
    }
}
