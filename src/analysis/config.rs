//! Analysis configuration parsed from environment variables.

use crate::config::{HttpTimeouts, env_non_empty};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// May be empty; the client refuses to call out without a key.
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeouts: HttpTimeouts,
}

impl AnalysisConfig {
    /// Build typed analysis config from environment variables.
    ///
    /// All optional:
    /// - `GEMINI_API_KEY`, falling back to `EXPO_PUBLIC_GEMINI_API_KEY`
    /// - `GEMINI_MODEL`: default `gemini-1.5-flash`
    /// - `GEMINI_BASE_URL`: default Generative Language API v1beta
    /// - `GEMINI_REQUEST_TIMEOUT_SECS`: default 60
    /// - `GEMINI_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// A missing key is not an error here; every analysis call checks it.
    #[must_use]
    pub fn from_env() -> Self {
        let api_key = env_non_empty("GEMINI_API_KEY")
            .or_else(|| env_non_empty("EXPO_PUBLIC_GEMINI_API_KEY"))
            .unwrap_or_default();
        let model = env_non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let base_url = env_non_empty("GEMINI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let timeouts = HttpTimeouts::from_env("GEMINI");
        Self { api_key, model, base_url, timeouts }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
