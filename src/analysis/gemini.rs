//! Gemini `generateContent` client for food analysis.
//!
//! Thin HTTP wrapper for `/models/{model}:generateContent`. Envelope and
//! estimate parsing are pure functions for testability.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use super::config::AnalysisConfig;
use super::types::{AnalysisError, FoodAnalyzer, NutritionEstimate};

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

const FOOD_ANALYSIS_PROMPT: &str = r#"Estimate the nutrition of the food described or pictured.
Respond with a single JSON object and nothing else, shaped exactly like:
{
  "name": "short descriptive name of the meal",
  "calories": <number, total kcal>,
  "protein": <number, grams>,
  "carbs": <number, grams>,
  "fat": <number, grams>,
  "confidence": <number between 0 and 1>,
  "ingredients": ["detected", "ingredients"]
}
Assume typical portion sizes when none are given."#;

// =============================================================================
// CLIENT
// =============================================================================

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Build a client from environment variables (see [`AnalysisConfig::from_env`]).
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn from_env() -> Result<Self, AnalysisError> {
        Self::new(AnalysisConfig::from_env())
    }

    /// # Errors
    ///
    /// Returns [`AnalysisError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let http = config
            .timeouts
            .client()
            .map_err(|e| AnalysisError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key: config.api_key, model: config.model, base_url: config.base_url })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, input: Part<'_>) -> Result<NutritionEstimate, AnalysisError> {
        if self.api_key.is_empty() {
            return Err(AnalysisError::MissingApiKey);
        }

        let body = ApiRequest {
            contents: [Content { parts: [Part::Text { text: FOOD_ANALYSIS_PROMPT.into() }, input] }],
        };

        let response = self
            .http
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AnalysisError::ApiRequest(e.to_string()))?;

        if status != 200 {
            warn!(status, model = %self.model, "gemini: request rejected");
            return Err(AnalysisError::ApiResponse { status, body: text });
        }

        let reply = parse_response(&text)?;
        debug!(model = %self.model, chars = reply.len(), "gemini: response received");
        parse_estimate(&reply).inspect_err(|e| warn!(error = %e, "gemini: unusable estimate"))
    }
}

#[async_trait]
impl FoodAnalyzer for GeminiClient {
    async fn analyze_text(&self, text: &str) -> Result<NutritionEstimate, AnalysisError> {
        self.generate(Part::Text { text: format!("User Input: \"{text}\"").into() })
            .await
    }

    async fn analyze_image(&self, image: &[u8], mime_type: &str) -> Result<NutritionEstimate, AnalysisError> {
        let mime_type = if mime_type.is_empty() { DEFAULT_IMAGE_MIME } else { mime_type };
        self.generate(Part::InlineData { inline_data: InlineData { mime_type, data: STANDARD.encode(image) } })
            .await
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(serde::Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: std::borrow::Cow<'a, str>,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(serde::Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(serde::Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Concatenate the text parts of the first candidate.
fn parse_response(json: &str) -> Result<String, AnalysisError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| AnalysisError::ApiParse(e.to_string()))?;

    let text: String = api
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }
    Ok(text)
}

/// Strip markdown code fences from model output and parse the estimate.
///
/// Parsing is strict: anything but a complete estimate object fails with
/// [`AnalysisError::MalformedEstimate`]. `confidence` is clamped into `[0, 1]`.
pub fn parse_estimate(text: &str) -> Result<NutritionEstimate, AnalysisError> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let mut estimate: NutritionEstimate =
        serde_json::from_str(cleaned.trim()).map_err(|e| AnalysisError::MalformedEstimate(e.to_string()))?;
    estimate.confidence = if estimate.confidence.is_nan() { 0.0 } else { estimate.confidence.clamp(0.0, 1.0) };
    Ok(estimate)
}

#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;
