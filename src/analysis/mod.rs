//! Food analysis: natural-language or photo input to a nutrition estimate.
//!
//! Stateless and independent of the session: callers hand the analyzer text
//! or image bytes and get a [`NutritionEstimate`] back. No retry, no caching.

pub mod config;
pub mod gemini;
pub mod types;

pub use config::AnalysisConfig;
pub use gemini::{DEFAULT_IMAGE_MIME, GeminiClient, parse_estimate};
pub use types::{AnalysisError, FoodAnalyzer, NutritionEstimate};

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
