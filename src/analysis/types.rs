//! Analysis types: nutrition estimates and errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by food analysis.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// No API key was configured.
    #[error("Gemini API key is missing")]
    MissingApiKey,

    /// The HTTP request to the model provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The model provider returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The provider envelope could not be deserialized.
    #[error("API response parse failed: {0}")]
    ApiParse(String),

    /// The provider answered without any candidate text.
    #[error("model returned no text")]
    EmptyResponse,

    /// The model text was not a valid nutrition estimate.
    #[error("malformed nutrition estimate: {0}")]
    MalformedEstimate(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl AnalysisError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "E_MISSING_API_KEY",
            Self::ApiRequest(_) => "E_API_REQUEST",
            Self::ApiResponse { .. } => "E_API_RESPONSE",
            Self::ApiParse(_) => "E_API_PARSE",
            Self::EmptyResponse => "E_EMPTY_RESPONSE",
            Self::MalformedEstimate(_) => "E_MALFORMED_ESTIMATE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }
}

// =============================================================================
// ESTIMATE
// =============================================================================

/// Structured nutrition guess for a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionEstimate {
    /// Short descriptive name of the meal.
    pub name: String,
    /// Estimated total kilocalories.
    pub calories: f64,
    /// Grams.
    pub protein: f64,
    /// Grams.
    pub carbs: f64,
    /// Grams.
    pub fat: f64,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    pub ingredients: Vec<String>,
}

// =============================================================================
// ANALYZER TRAIT
// =============================================================================

/// Stateless text/image → nutrition estimate service. Enables mocking in tests.
#[async_trait]
pub trait FoodAnalyzer: Send + Sync {
    /// Estimate nutrition from a natural-language description such as
    /// `"a large pepperoni pizza"`.
    ///
    /// # Errors
    ///
    /// Returns an [`AnalysisError`] on missing credentials, network failure,
    /// or an unparseable model response.
    async fn analyze_text(&self, text: &str) -> Result<NutritionEstimate, AnalysisError>;

    /// Estimate nutrition from a photo.
    ///
    /// # Errors
    ///
    /// Returns an [`AnalysisError`] on missing credentials, network failure,
    /// or an unparseable model response.
    async fn analyze_image(&self, image: &[u8], mime_type: &str) -> Result<NutritionEstimate, AnalysisError>;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
