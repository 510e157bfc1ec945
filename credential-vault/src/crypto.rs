//! Symmetric encryption for secrets at rest
//!
//! AES-256-GCM with a random 96-bit nonce per value. The stored form is
//! `base64(nonce || ciphertext)`; the nonce travels with the value, the
//! key never leaves process configuration.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use common::error::{Error, Result};

/// Nonce length for AES-GCM, in bytes
const NONCE_LEN: usize = 12;

/// Cipher for vault secrets
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Build a cipher from a hex-encoded 32-byte key
    pub fn from_hex_key(hex_key: &str) -> Result<Self> {
        let key_bytes = hex::decode(hex_key)
            .map_err(|e| Error::Configuration(format!("VAULT_KEY is not valid hex: {}", e)))?;
        if key_bytes.len() != 32 {
            return Err(Error::Configuration(format!(
                "VAULT_KEY must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt a secret for storage
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| Error::Crypto("Encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Decrypt a stored secret
    pub fn decrypt(&self, sealed: &str) -> Result<String> {
        let bytes = BASE64
            .decode(sealed)
            .map_err(|e| Error::Crypto(format!("Stored secret is not valid base64: {}", e)))?;
        if bytes.len() <= NONCE_LEN {
            return Err(Error::Crypto("Stored secret is truncated".to_string()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::Crypto("Decryption failed; wrong key or corrupt value".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::Crypto(format!("Decrypted secret is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn round_trips_a_secret() {
        let cipher = SecretCipher::from_hex_key(TEST_KEY).unwrap();
        let sealed = cipher.encrypt("refresh-token-value").unwrap();
        assert_ne!(sealed, "refresh-token-value");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "refresh-token-value");
    }

    #[test]
    fn fresh_nonce_per_value() {
        let cipher = SecretCipher::from_hex_key(TEST_KEY).unwrap();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_short_key() {
        assert!(SecretCipher::from_hex_key("deadbeef").is_err());
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = SecretCipher::from_hex_key(TEST_KEY).unwrap();
        let sealed = cipher.encrypt("secret").unwrap();
        let mut bytes = BASE64.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);
        assert!(cipher.decrypt(&tampered).is_err());
    }
}
