//! AES-256-GCM credential vault.
//!
//! Each value is encrypted with a fresh random nonce. Ciphertexts are rendered
//! as `base64(nonce).base64(ciphertext)` so a single opaque string can be
//! stored in a setup record or the token store.

use super::CredentialVault;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Separator between the encoded nonce and the encoded ciphertext.
const SEPARATOR: char = '.';

/// Validates that the master key is exactly 32 bytes when base64 decoded.
pub fn validate_key(key_base64: &str) -> Result<[u8; KEY_SIZE]> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .context("Failed to decode base64 encryption key")?;

    key_bytes.as_slice().try_into().map_err(|_| {
        anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        )
    })
}

/// Credential vault backed by AES-256-GCM.
#[derive(Clone)]
pub struct AesGcmVault {
    key: [u8; KEY_SIZE],
}

impl AesGcmVault {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Builds the master vault from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_base64: &str) -> Result<Self> {
        validate_key(key_base64).map(Self::new)
    }

    /// Derives a vault from a secret pair.
    ///
    /// Used for config-scoped encryption: the same pair always yields the same
    /// key, a changed pair yields an unrelated one.
    pub fn derive(secret: &str, salt: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update([0u8]);
        hasher.update(secret.as_bytes());
        Self::new(hasher.finalize().into())
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| anyhow!("Failed to create cipher: {}", e))
    }
}

impl CredentialVault for AesGcmVault {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = self.cipher()?;

        // Never reuse a nonce
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        Ok(format!(
            "{}{}{}",
            BASE64.encode(nonce),
            SEPARATOR,
            BASE64.encode(ciphertext)
        ))
    }

    fn decrypt(&self, encrypted: &str) -> Result<String> {
        let (nonce, ciphertext) = encrypted
            .split_once(SEPARATOR)
            .context("Malformed ciphertext: missing nonce separator")?;

        let nonce_bytes = BASE64.decode(nonce).context("Failed to decode nonce")?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(anyhow!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            ));
        }
        let ciphertext_bytes = BASE64
            .decode(ciphertext)
            .context("Failed to decode ciphertext")?;

        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext_bytes.as_ref())
            .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

        String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
    }
}

impl fmt::Debug for AesGcmVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmVault").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        let valid_key = BASE64.encode([0u8; 32]);
        assert!(validate_key(&valid_key).is_ok());

        let short_key = BASE64.encode([0u8; 16]);
        assert!(validate_key(&short_key).is_err());

        let long_key = BASE64.encode([0u8; 64]);
        assert!(validate_key(&long_key).is_err());

        assert!(validate_key("not-valid-base64!@#$").is_err());
    }

    #[test]
    fn test_encrypt_decrypt() {
        let vault = AesGcmVault::new([0u8; 32]);
        let encrypted = vault.encrypt("client-secret-123").unwrap();

        assert!(!encrypted.contains("client-secret-123"));
        assert!(encrypted.contains(SEPARATOR));
        assert_eq!(vault.decrypt(&encrypted).unwrap(), "client-secret-123");
    }

    #[test]
    fn test_same_plaintext_different_ciphertext() {
        let vault = AesGcmVault::new([7u8; 32]);
        let first = vault.encrypt("same").unwrap();
        let second = vault.encrypt("same").unwrap();
        assert_ne!(first, second);
        assert_eq!(vault.decrypt(&first).unwrap(), "same");
        assert_eq!(vault.decrypt(&second).unwrap(), "same");
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = AesGcmVault::new([0u8; 32]).encrypt("secret").unwrap();
        assert!(AesGcmVault::new([1u8; 32]).decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_malformed_input_fails() {
        let vault = AesGcmVault::new([0u8; 32]);
        assert!(vault.decrypt("no-separator").is_err());
        assert!(vault.decrypt("AAAA.AAAA").is_err());

        let mut tampered = vault.encrypt("secret").unwrap();
        tampered.push('X');
        assert!(vault.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_derived_vault_is_deterministic_per_pair() {
        let encrypted = AesGcmVault::derive("secret", "client").encrypt("token").unwrap();

        assert_eq!(
            AesGcmVault::derive("secret", "client").decrypt(&encrypted).unwrap(),
            "token"
        );
        assert!(AesGcmVault::derive("secret", "other-client")
            .decrypt(&encrypted)
            .is_err());
        assert!(AesGcmVault::derive("rotated", "client")
            .decrypt(&encrypted)
            .is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let out = format!("{:?}", AesGcmVault::new([9u8; 32]));
        assert!(!out.contains('9'));
    }
}
