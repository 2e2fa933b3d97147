//! Reversible encryption for operator disclosure

use crate::error::{Result, RuntimeError};
use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, KeyInit, Nonce};
use sha2::{Digest, Sha256};

/// AES-256-GCM vault for sensitive input fields.
///
/// Ciphertexts are hex strings with the 96-bit nonce prefixed, so a single
/// column stores everything needed for disclosure. The cipher key is derived
/// from the configured key material with SHA-256, which accepts passphrases
/// of any length.
pub struct SensitiveVault {
    cipher: Aes256Gcm,
}

const NONCE_LEN: usize = 12;

impl SensitiveVault {
    /// Create a vault from the configured key material. An empty key is a
    /// fatal initialization error.
    pub fn new(key_material: &str) -> Result<Self> {
        if key_material.is_empty() {
            return Err(RuntimeError::Sensitive(
                "encryption key must not be empty".to_string(),
            ));
        }
        let key = Sha256::digest(key_material.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| RuntimeError::Sensitive("invalid cipher key".to_string()))?;
        Ok(Self { cipher })
    }

    /// Encrypt a plaintext field; returns hex(nonce || ciphertext)
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| RuntimeError::Sensitive("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    /// Decrypt a hex(nonce || ciphertext) field back to plaintext
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let raw = hex::decode(encoded)
            .map_err(|_| RuntimeError::Sensitive("ciphertext is not hex".to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(RuntimeError::Sensitive("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| RuntimeError::Sensitive("decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| RuntimeError::Sensitive("plaintext is not utf-8".to_string()))
    }
}
