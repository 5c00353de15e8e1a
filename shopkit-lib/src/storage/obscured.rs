//! Obscured flag storage.
//!
//! Wraps another [`KeyValueStore`] and seals every value with AES-256-GCM
//! under a key derived from the application's custom secret. Keys stay in
//! clear text so flags can be listed and cleared without the secret.
//!
//! The secret ships inside the application, so this keeps store data away
//! from casual inspection and edits. It is not a defense against someone
//! who has extracted the secret.
//!
//! # Wire Format
//!
//! Each stored value is base64 of:
//!
//! ```text
//! [1 byte version][12 bytes nonce][N bytes ciphertext][16 bytes auth tag]
//! ```
//!
//! The per-value key is derived from the master key and the flag key, so a
//! sealed value copied under another key does not open.

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use sha2::Sha256;

use super::{keys, KeyValueStore};
use crate::{Result, ShopkitError};

const OBSCURED_VERSION: u8 = 1;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Salt for deriving the master key from the custom secret.
const SECRET_SALT: &[u8] = b"shopkit/obscured-storage/v1";

/// Plain value stored under [`keys::SECRET_CHECK`].
const SECRET_CHECK_VALUE: &str = "shopkit";

/// [`KeyValueStore`] that seals values with a key derived from a secret.
pub struct ObscuredKeyValueStore {
    inner: Arc<dyn KeyValueStore>,
    master_key: [u8; 32],
}

impl ObscuredKeyValueStore {
    /// Wrap `inner`, deriving the sealing key from `custom_secret`.
    pub fn new(inner: Arc<dyn KeyValueStore>, custom_secret: &str) -> Result<Self> {
        let hk = Hkdf::<Sha256>::new(Some(SECRET_SALT), custom_secret.as_bytes());
        let mut master_key = [0u8; 32];
        hk.expand(b"master", &mut master_key)
            .map_err(|e| ShopkitError::Config(format!("key derivation failed: {}", e)))?;
        Ok(Self { inner, master_key })
    }

    /// Underlying store holding the sealed values.
    pub fn inner(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner
    }

    fn cipher(&self, key: &str) -> Result<Aes256Gcm> {
        let hk = Hkdf::<Sha256>::new(None, &self.master_key);
        let mut derived = [0u8; 32];
        hk.expand(key.as_bytes(), &mut derived)
            .map_err(|e| ShopkitError::Config(format!("key derivation failed: {}", e)))?;
        Aes256Gcm::new_from_slice(&derived)
            .map_err(|e| ShopkitError::Config(format!("invalid sealing key: {}", e)))
    }

    /// Seal `value` for storage under `key`.
    pub fn seal(&self, key: &str, value: &str) -> Result<String> {
        let cipher = self.cipher(key)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, value.as_bytes())
            .map_err(|e| ShopkitError::Storage(format!("cannot seal {}: {}", key, e)))?;

        let mut sealed = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        sealed.push(OBSCURED_VERSION);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Open a value sealed under `key`.
    ///
    /// Fails with [`ShopkitError::Storage`] when the value is not in the
    /// sealed format or was sealed with another secret or key.
    pub fn open(&self, key: &str, sealed: &str) -> Result<String> {
        let bytes = STANDARD
            .decode(sealed.trim())
            .map_err(|_| ShopkitError::Storage(format!("value for {} is not sealed", key)))?;
        if bytes.len() < 1 + NONCE_SIZE + TAG_SIZE {
            return Err(ShopkitError::Storage(format!("value for {} is truncated", key)));
        }
        if bytes[0] != OBSCURED_VERSION {
            return Err(ShopkitError::Storage(format!(
                "value for {} has unsupported version {}",
                key, bytes[0]
            )));
        }

        let nonce = Nonce::from_slice(&bytes[1..1 + NONCE_SIZE]);
        let plaintext = self
            .cipher(key)?
            .decrypt(nonce, &bytes[1 + NONCE_SIZE..])
            .map_err(|_| ShopkitError::Storage(format!("cannot open value for {}", key)))?;
        String::from_utf8(plaintext)
            .map_err(|_| ShopkitError::Storage(format!("value for {} is not UTF-8", key)))
    }

    /// Check the secret against the marker written by an earlier run.
    ///
    /// Returns `false` when no marker is stored yet. Fails with
    /// [`ShopkitError::SecretMismatch`] when the marker does not open.
    pub async fn check_secret(&self) -> Result<bool> {
        let Some(sealed) = self.inner.get_string(keys::SECRET_CHECK).await? else {
            return Ok(false);
        };
        match self.open(keys::SECRET_CHECK, &sealed) {
            Ok(value) if value == SECRET_CHECK_VALUE => Ok(true),
            _ => {
                tracing::error!("custom secret does not open stored store data");
                Err(ShopkitError::SecretMismatch)
            }
        }
    }

    /// Store the marker that later runs check the secret against.
    pub async fn remember_secret(&self) -> Result<()> {
        self.set_string(keys::SECRET_CHECK, SECRET_CHECK_VALUE).await
    }
}

#[async_trait::async_trait]
impl KeyValueStore for ObscuredKeyValueStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.inner.get_string(key).await? {
            Some(sealed) => self.open(key, &sealed).map(Some),
            None => Ok(None),
        }
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let sealed = self.seal(key, value)?;
        self.inner.set_string(key, &sealed).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }
}
