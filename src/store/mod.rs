//! Secure key-value storage.
//!
//! DESIGN
//! ======
//! The app keeps a handful of small string values (the cached credential,
//! the theme preference) that must survive restarts and be encrypted at rest.
//! `KeyValueStore` is the seam; `EncryptedFileStore` is the on-disk
//! implementation and tests use an in-memory store.
//!
//! Only single-key reads and writes are atomic. Callers treat every read as
//! potentially stale.

pub mod encrypted;

use async_trait::async_trait;

pub use encrypted::{EncryptedFileStore, StoreKey};

/// Errors produced by secure storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("encryption failed for key {key}")]
    Encrypt { key: String },

    #[error("decryption failed for key {key}")]
    Decrypt { key: String },

    #[error("stored value serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Key names must be non-empty and limited to `[A-Za-z0-9._-]`.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// The store key could not be decoded or has the wrong length.
    #[error("invalid key material: {0}")]
    KeyMaterial(String),
}

impl StorageError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "E_STORAGE_IO",
            Self::Encrypt { .. } => "E_STORAGE_ENCRYPT",
            Self::Decrypt { .. } => "E_STORAGE_DECRYPT",
            Self::Serialize(_) => "E_STORAGE_SERIALIZE",
            Self::InvalidKey(_) => "E_STORAGE_INVALID_KEY",
            Self::KeyMaterial(_) => "E_STORAGE_KEY_MATERIAL",
        }
    }
}

/// Async string key-value store scoped to the application.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Absent keys yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the value exists but cannot be read or
    /// decrypted.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] on write failure.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] on write failure.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Validate a storage key name.
pub(crate) fn check_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && !key.starts_with('.');
    if valid { Ok(()) } else { Err(StorageError::InvalidKey(key.to_string())) }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
