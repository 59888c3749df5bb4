//! Router credential encryption (AES-256-GCM)
//!
//! The router password is stored in the config file as
//! `base64(nonce_12bytes || ciphertext || tag_16bytes)` and decrypted with a
//! master key supplied through the environment.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{SyncError, SyncResult};

/// Environment variable holding the base64 master key
pub const MASTER_KEY_ENV: &str = "HUB_MASTER_KEY";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Master encryption key
#[derive(Clone)]
pub struct MasterKey {
    key: [u8; KEY_LEN],
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

impl MasterKey {
    /// Fresh random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Key from its base64 form
    pub fn from_base64(encoded: &str) -> SyncResult<Self> {
        let mut bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| SyncError::Crypto("master key is not valid base64"))?;
        if bytes.len() != KEY_LEN {
            bytes.zeroize();
            return Err(SyncError::Crypto("master key must be 32 bytes"));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self { key })
    }

    /// Key from [`MASTER_KEY_ENV`], `None` when unset
    pub fn from_env() -> SyncResult<Option<Self>> {
        match std::env::var(MASTER_KEY_ENV) {
            Ok(value) => Self::from_base64(&value).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Base64 form, for provisioning
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.key)
    }

    /// Encrypt a secret into its stored form
    pub fn encrypt_string(&self, plaintext: &str) -> SyncResult<String> {
        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|_| SyncError::Crypto("invalid key"))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| SyncError::Crypto("encryption failed"))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(&blob))
    }

    /// Decrypt a stored secret
    pub fn decrypt_string(&self, encoded: &str) -> SyncResult<Zeroizing<String>> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| SyncError::Crypto("ciphertext is not valid base64"))?;
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(SyncError::Crypto("ciphertext too short"));
        }

        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|_| SyncError::Crypto("invalid key"))?;
        let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
        let plaintext = cipher
            .decrypt(nonce, &data[NONCE_LEN..])
            .map_err(|_| SyncError::Crypto("decryption failed (wrong key or tampered data)"))?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| SyncError::Crypto("decrypted secret is not UTF-8"))
    }
}
