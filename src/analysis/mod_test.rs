use super::*;
use crate::session::{SessionConfig, SessionPhase, SessionStore};
use crate::test_helpers::{FakeCache, FakeProvider};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

// =========================================================================
// MockAnalyzer
// =========================================================================

/// Replays canned model text through the real estimate parser.
struct MockAnalyzer {
    replies: Mutex<Vec<String>>,
    inputs: Mutex<Vec<String>>,
}

impl MockAnalyzer {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| (*r).to_string()).collect()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    fn next_reply(&self, input: String) -> Result<NutritionEstimate, AnalysisError> {
        self.inputs.lock().unwrap().push(input);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }
        parse_estimate(&replies.remove(0))
    }
}

#[async_trait]
impl FoodAnalyzer for MockAnalyzer {
    async fn analyze_text(&self, text: &str) -> Result<NutritionEstimate, AnalysisError> {
        self.next_reply(text.to_string())
    }

    async fn analyze_image(&self, image: &[u8], mime_type: &str) -> Result<NutritionEstimate, AnalysisError> {
        self.next_reply(format!("{mime_type}:{}", image.len()))
    }
}

const PIZZA: &str = r#"{"name":"Pepperoni pizza","calories":2200,"protein":90,"carbs":250,"fat":95,"confidence":0.6,"ingredients":["dough","cheese","pepperoni"]}"#;

// =========================================================================
// FoodAnalyzer contract
// =========================================================================

#[tokio::test]
async fn analyzer_is_usable_as_trait_object() {
    let analyzer: Arc<dyn FoodAnalyzer> = Arc::new(MockAnalyzer::new(&[PIZZA]));
    let est = analyzer.analyze_text("a large pepperoni pizza").await.unwrap();
    assert_eq!(est.name, "Pepperoni pizza");
    assert_eq!(est.ingredients.len(), 3);
}

#[tokio::test]
async fn non_json_reply_fails_without_partial_result() {
    let analyzer = MockAnalyzer::new(&["I think that's about 300 calories!"]);
    let err = analyzer.analyze_text("2 eggs and toast").await.unwrap_err();
    assert!(matches!(err, AnalysisError::MalformedEstimate(_)));
    assert_eq!(err.error_code(), "E_MALFORMED_ESTIMATE");
}

#[tokio::test]
async fn image_requests_carry_mime_type() {
    let analyzer = MockAnalyzer::new(&[PIZZA]);
    analyzer.analyze_image(&[0xff, 0xd8, 0xff], DEFAULT_IMAGE_MIME).await.unwrap();
    assert_eq!(analyzer.inputs.lock().unwrap().as_slice(), ["image/jpeg:3"]);
}

// =========================================================================
// Session independence
// =========================================================================

#[tokio::test]
async fn analysis_leaves_session_untouched() {
    let provider = Arc::new(FakeProvider::default());
    let cache = Arc::new(FakeCache::open(None));
    let store = SessionStore::start(provider.clone(), cache.clone(), SessionConfig { provisional_timeout: None });
    provider.emit(None);
    let before = store.resolved().await;
    assert_eq!(before.phase(), SessionPhase::Anonymous);

    let analyzer = MockAnalyzer::new(&["not json"]);
    assert!(analyzer.analyze_text("2 eggs and toast").await.is_err());

    assert_eq!(store.state(), before);
    assert!(cache.current().is_none());
}
