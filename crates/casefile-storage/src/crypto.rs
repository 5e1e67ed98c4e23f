//! At-rest encryption for stored objects.
//!
//! AES-256-GCM with a random nonce per object; the nonce is prefixed to the
//! ciphertext so decryption needs only the key. The parameters recorded in
//! a file's metadata describe the envelope, they are not required to open it.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::traits::StorageError;

/// AES-256-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Authenticated encryption for object payloads.
#[derive(Clone)]
pub struct ObjectCipher {
    cipher: Aes256Gcm,
}

impl ObjectCipher {
    /// Create a cipher from raw 32-byte key material.
    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self, StorageError> {
        if key_bytes.len() != 32 {
            return Err(StorageError::Encryption(
                "Encryption key must be 32 bytes (256 bits)".to_string(),
            ));
        }
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Create a cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(key: &str) -> Result<Self, StorageError> {
        let key_bytes = BASE64
            .decode(key)
            .map_err(|e| StorageError::Encryption(format!("Failed to decode key: {}", e)))?;
        Self::from_key_bytes(&key_bytes)
    }

    /// Encrypt a payload; output is `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| StorageError::Encryption(format!("Encryption failed: {}", e)))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(combined)
    }

    /// Decrypt a `nonce || ciphertext` payload.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        if data.len() < NONCE_LEN {
            return Err(StorageError::Encryption(
                "Encrypted payload too short".to_string(),
            ));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| StorageError::Encryption(format!("Decryption failed: {}", e)))
    }

    /// Envelope description recorded in the file's metadata.
    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "algorithm": "aes-256-gcm",
            "envelope": "nonce-prefixed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> ObjectCipher {
        ObjectCipher::from_key_bytes(&[7u8; 32]).unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let c = cipher();
        let plaintext = b"%PDF-1.7 case evidence";
        let encrypted = c.encrypt(plaintext).unwrap();
        assert_ne!(&encrypted[NONCE_LEN..], plaintext.as_slice());
        assert_eq!(c.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn nonces_are_unique_per_object() {
        let c = cipher();
        let a = c.encrypt(b"same bytes").unwrap();
        let b = c.encrypt(b"same bytes").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let c = cipher();
        let mut encrypted = c.encrypt(b"payload").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xFF;
        assert!(c.decrypt(&encrypted).is_err());
    }

    #[test]
    fn short_key_rejected() {
        assert!(ObjectCipher::from_key_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn truncated_payload_rejected() {
        let c = cipher();
        assert!(c.decrypt(&[1, 2, 3]).is_err());
    }
}
