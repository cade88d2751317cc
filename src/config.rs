//! Environment helpers shared by the per-module `from_env` constructors.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = ".eatos";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Parse an env var, falling back to `default` when unset or unparseable.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Return the value of an env var, treating empty strings as unset.
pub(crate) fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// HTTP timeouts for an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    /// Read `{prefix}_REQUEST_TIMEOUT_SECS` and `{prefix}_CONNECT_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env(prefix: &str) -> Self {
        Self {
            request_secs: env_parse(&format!("{prefix}_REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse(&format!("{prefix}_CONNECT_TIMEOUT_SECS"), DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Build a reqwest client honoring these timeouts.
    pub(crate) fn client(self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_secs))
            .connect_timeout(Duration::from_secs(self.connect_secs))
            .build()
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Application data directory from `EATOS_DATA_DIR` (default `.eatos`).
#[must_use]
pub fn data_dir_from_env() -> PathBuf {
    env_non_empty("EATOS_DATA_DIR").map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
