//! Firebase Authentication configuration parsed from environment variables.

use super::AuthError;
use crate::config::{HttpTimeouts, env_non_empty};

pub const DEFAULT_FIREBASE_AUTH_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_FIREBASE_TOKEN_BASE_URL: &str = "https://securetoken.googleapis.com/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub base_url: String,
    /// Secure Token service, used to exchange a refresh token for an ID token.
    pub token_base_url: String,
    pub timeouts: HttpTimeouts,
}

impl FirebaseConfig {
    /// Build typed Firebase config from environment variables.
    ///
    /// Required:
    /// - `FIREBASE_API_KEY`
    ///
    /// Optional:
    /// - `FIREBASE_AUTH_BASE_URL`: Identity Toolkit base URL (point at the
    ///   auth emulator for local work)
    /// - `FIREBASE_TOKEN_BASE_URL`: Secure Token base URL
    /// - `FIREBASE_REQUEST_TIMEOUT_SECS`: default 60
    /// - `FIREBASE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingApiKey`] if `FIREBASE_API_KEY` is unset.
    pub fn from_env() -> Result<Self, AuthError> {
        let api_key =
            env_non_empty("FIREBASE_API_KEY").ok_or_else(|| AuthError::MissingApiKey { var: "FIREBASE_API_KEY".into() })?;
        let base_url = base_url_from_env("FIREBASE_AUTH_BASE_URL", DEFAULT_FIREBASE_AUTH_BASE_URL);
        let token_base_url = base_url_from_env("FIREBASE_TOKEN_BASE_URL", DEFAULT_FIREBASE_TOKEN_BASE_URL);
        let timeouts = HttpTimeouts::from_env("FIREBASE");
        Ok(Self { api_key, base_url, token_base_url, timeouts })
    }
}

fn base_url_from_env(var: &str, default: &str) -> String {
    env_non_empty(var)
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
