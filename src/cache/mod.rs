//! Secure credential cache.
//!
//! DESIGN
//! ======
//! Holds a minimal, advisory copy of the last known identity so the app can
//! show who was signed in before the auth provider has resolved. It is never
//! authoritative: the provider's first state-change event overrides it.
//!
//! The record is JSON `{uid, email, displayName, photoURL}` under a single
//! key in the encrypted store. There is no versioning.

pub mod theme;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::store::{KeyValueStore, StorageError};

pub use theme::{AppliedTheme, ColorScheme, ResolvedTheme, ThemePreference, ThemeSettings, ThemeSetter};

pub const USER_AUTH_KEY: &str = "eatos_user_auth";
pub const USER_PROFILE_KEY: &str = "eatos_user_profile";

/// Durable subset of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredential {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
}

impl From<&AuthUser> for CachedCredential {
    fn from(user: &AuthUser) -> Self {
        Self {
            uid: user.uid.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            photo_url: user.photo_url.clone(),
        }
    }
}

impl From<CachedCredential> for AuthUser {
    fn from(c: CachedCredential) -> Self {
        Self { uid: c.uid, email: c.email, display_name: c.display_name, photo_url: c.photo_url }
    }
}

/// Persistence contract for the cached credential.
#[async_trait]
pub trait CredentialCache: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`StorageError`] on write failure.
    async fn save(&self, credential: &CachedCredential) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns a [`StorageError`] if a stored record cannot be read or parsed.
    async fn load(&self) -> Result<Option<CachedCredential>, StorageError>;

    /// # Errors
    ///
    /// Returns a [`StorageError`] on write failure.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// [`CredentialCache`] backed by a [`KeyValueStore`].
pub struct SecureCredentialCache {
    store: Arc<dyn KeyValueStore>,
}

impl SecureCredentialCache {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialCache for SecureCredentialCache {
    async fn save(&self, credential: &CachedCredential) -> Result<(), StorageError> {
        let json = serde_json::to_string(credential)?;
        self.store.set(USER_AUTH_KEY, &json).await
    }

    async fn load(&self) -> Result<Option<CachedCredential>, StorageError> {
        match self.store.get(USER_AUTH_KEY).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.store.delete(USER_AUTH_KEY).await?;
        self.store.delete(USER_PROFILE_KEY).await
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
