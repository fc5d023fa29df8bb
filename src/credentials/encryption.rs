//! AES-256-GCM encryption for stored OAuth tokens.
//!
//! Each token is sealed with its own random nonce. The stored form is
//! base64(nonce || ciphertext), so a single column holds everything needed to
//! decrypt it. The master key is 32 bytes and comes from configuration.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Validates that the master key is exactly 32 bytes when base64 decoded.
///
/// # Returns
/// * `Ok(Vec<u8>)` - Decoded key bytes
/// * `Err` - If key is invalid length or invalid base64
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        return Err(anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        ));
    }

    Ok(key_bytes)
}

/// Process-wide token cipher.
///
/// Built once at startup and shared by the store and the installers.
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").finish_non_exhaustive()
    }
}

impl EncryptionService {
    /// Creates a service from a base64-encoded 32-byte key.
    pub fn new(key_base64: &str) -> Result<Self> {
        let key = validate_key(key_base64)?;
        Self::from_key(&key)
    }

    /// Creates a service from raw key bytes.
    pub fn from_key(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

        Ok(Self { cipher })
    }

    /// Encrypts plaintext with a fresh random nonce.
    ///
    /// # Security
    /// - Nonce is drawn from the OS RNG and never reused
    /// - Authenticated encryption (tampering detected on decrypt)
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        let mut payload = Vec::with_capacity(NONCE_SIZE + sealed.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&sealed);

        Ok(BASE64.encode(payload))
    }

    /// Decrypts a value produced by [`EncryptionService::encrypt`].
    ///
    /// Fails on a wrong key, truncated input or tampered ciphertext.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let payload = BASE64
            .decode(ciphertext)
            .context("Failed to decode ciphertext")?;

        if payload.len() <= NONCE_SIZE {
            return Err(anyhow!(
                "Ciphertext too short: expected more than {} bytes, got {}",
                NONCE_SIZE,
                payload.len()
            ));
        }

        let (nonce_bytes, sealed) = payload.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed)
            .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

        String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
    }
}
