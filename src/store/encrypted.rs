//! File-backed encrypted key-value store.
//!
//! Each key lives in its own file `<dir>/<key>.enc` holding
//! `nonce (12 bytes) || ChaCha20-Poly1305 ciphertext`. The key name is bound
//! as associated data, so a file copied over another key's file fails to
//! decrypt instead of silently yielding the wrong value.
//!
//! Writes go to a temp file in the same directory and are renamed into
//! place, which keeps single-key writes atomic.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::Rng;
use tracing::{debug, info};

use super::{KeyValueStore, StorageError, check_key};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_FILE: &str = "store.key";
const VALUE_EXT: &str = "enc";

// =============================================================================
// KEY MATERIAL
// =============================================================================

/// 256-bit symmetric key for the store.
#[derive(Clone)]
pub struct StoreKey([u8; KEY_LEN]);

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreKey(..)")
    }
}

impl StoreKey {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::rng().random())
    }

    /// Decode a standard-base64 key (e.g. from `EATOS_STORE_KEY`).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyMaterial`] if the input is not base64 or
    /// does not decode to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, StorageError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| StorageError::KeyMaterial(e.to_string()))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| StorageError::KeyMaterial(format!("expected {KEY_LEN} bytes, got {}", b.len())))?;
        Ok(Self(key))
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Read `<dir>/store.key`, creating it with a fresh key if absent.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the key file cannot be read, written, or
    /// decoded.
    pub async fn load_or_create(dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(KEY_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(encoded) => Self::from_base64(&encoded),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tokio::fs::create_dir_all(dir).await?;
                let key = Self::generate();
                write_atomic(&path, key.to_base64().as_bytes()).await?;
                info!(path = %path.display(), "store: generated new store key");
                Ok(key)
            }
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Encrypted [`KeyValueStore`] rooted at an application data directory.
pub struct EncryptedFileStore {
    dir: PathBuf,
    cipher: ChaCha20Poly1305,
}

impl EncryptedFileStore {
    /// Open a store in `dir` with the given key. The directory is created on
    /// first write.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyMaterial`] if the cipher rejects the key.
    pub fn new(dir: impl Into<PathBuf>, key: &StoreKey) -> Result<Self, StorageError> {
        let cipher = ChaCha20Poly1305::new_from_slice(&key.0).map_err(|e| StorageError::KeyMaterial(e.to_string()))?;
        Ok(Self { dir: dir.into(), cipher })
    }

    /// Open a store in `dir`, taking the key from `EATOS_STORE_KEY` when set
    /// and from `<dir>/store.key` otherwise.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the key cannot be obtained.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        let key = match crate::config::env_non_empty("EATOS_STORE_KEY") {
            Some(encoded) => StoreKey::from_base64(&encoded)?,
            None => StoreKey::load_or_create(&dir).await?,
        };
        Self::new(dir, &key)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{VALUE_EXT}"))
    }

    fn seal(&self, key: &str, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::rng().random();
        let nonce = Nonce::from(nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad: key.as_bytes() })
            .map_err(|_| StorageError::Encrypt { key: key.to_string() })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open_sealed(&self, key: &str, sealed: &[u8]) -> Result<Vec<u8>, StorageError> {
        if sealed.len() < NONCE_LEN {
            return Err(StorageError::Decrypt { key: key.to_string() });
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce_bytes: [u8; NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| StorageError::Decrypt { key: key.to_string() })?;
        self.cipher
            .decrypt(&Nonce::from(nonce_bytes), Payload { msg: ciphertext, aad: key.as_bytes() })
            .map_err(|_| StorageError::Decrypt { key: key.to_string() })
    }
}

#[async_trait]
impl KeyValueStore for EncryptedFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        check_key(key)?;
        let sealed = match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let plaintext = self.open_sealed(key, &sealed)?;
        let value = String::from_utf8(plaintext).map_err(|_| StorageError::Decrypt { key: key.to_string() })?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_key(key)?;
        let sealed = self.seal(key, value.as_bytes())?;
        tokio::fs::create_dir_all(&self.dir).await?;
        write_atomic(&self.path_for(key), &sealed).await?;
        debug!(key, "store: value written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => {
                debug!(key, "store: value deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `bytes` to a sibling temp file, restrict it to the owner, then
/// rename it over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let suffix: u64 = rand::rng().random();
    let tmp = path.with_extension(format!("{suffix:016x}.tmp"));
    tokio::fs::write(&tmp, bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "encrypted_test.rs"]
mod tests;
