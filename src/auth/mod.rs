//! Remote auth provider: the identity service of record.
//!
//! DESIGN
//! ======
//! The session store never talks to an SDK directly. It sees the provider
//! as [`AuthProvider`]: a stream of state-change events plus a handful of
//! request/response operations. [`firebase::FirebaseAuth`] is the production
//! implementation; tests inject a scripted fake.
//!
//! Provider errors are surfaced unchanged. Nothing here retries.

pub mod config;
pub mod firebase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use config::FirebaseConfig;
pub use firebase::{FirebaseAuth, REFRESH_TOKEN_KEY};

/// Receiving half of an auth state subscription. Each message is the current
/// user, or `None` when signed out. Dropping the receiver unsubscribes.
pub type AuthStateReceiver = mpsc::UnboundedReceiver<Option<AuthUser>>;

/// Identity as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Errors produced by auth provider operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown account, wrong password, disabled user, or malformed email.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("email address is already in use")]
    EmailAlreadyInUse,

    #[error("password rejected: {0}")]
    WeakPassword(String),

    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered with an error we do not map more precisely.
    #[error("auth provider error: status {status}: {message}")]
    Provider { status: u16, message: String },

    /// The operation is not available in this build.
    #[error("unsupported in this build: {0}")]
    Unsupported(String),

    #[error("auth response parse failed: {0}")]
    ResponseParse(String),

    #[error("missing API key: env var {var} not set")]
    MissingApiKey { var: String },

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl AuthError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredential(_) => "E_INVALID_CREDENTIAL",
            Self::EmailAlreadyInUse => "E_EMAIL_IN_USE",
            Self::WeakPassword(_) => "E_WEAK_PASSWORD",
            Self::Network(_) => "E_NETWORK",
            Self::Provider { .. } => "E_AUTH_PROVIDER",
            Self::Unsupported(_) => "E_UNSUPPORTED",
            Self::ResponseParse(_) => "E_AUTH_PARSE",
            Self::MissingApiKey { .. } => "E_MISSING_API_KEY",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }
}

/// The remote identity service as the session store sees it.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Subscribe to auth state changes.
    fn subscribe(&self) -> AuthStateReceiver;

    /// Verify an email/password credential and start a provider session.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`] unchanged.
    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    /// Federated Google sign-in. Not available in this build.
    ///
    /// # Errors
    ///
    /// Always returns [`AuthError::Unsupported`] unless overridden.
    async fn sign_in_with_google(&self) -> Result<AuthUser, AuthError> {
        Err(AuthError::Unsupported("Google sign-in requires a native build".into()))
    }

    /// Create an account and start a provider session.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`] unchanged.
    async fn register_with_email(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    /// End the provider session.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`] unchanged.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Ask the provider to send a password-reset message.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`] unchanged.
    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Update the signed-in user's profile. Returns `None` when no user is
    /// signed in with the provider.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`] unchanged.
    async fn update_profile(&self, display_name: &str, photo_url: Option<&str>) -> Result<Option<AuthUser>, AuthError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
