//! End-to-end tests for sanitizing generative output.
//!
//! Raw completions the way models actually return them, through
//! `OutputSanitizer` and through the ranking engine that consumes it.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use prognos::{
    Extraction, ExtractionStage, HistoryEntry, ModelContext, OutputSanitizer, PatientHistory, PatientId,
    PredictRequest, Predictor, TransitionEdge,
};
use serde_json::json;

fn structured(raw: &str) -> (serde_json::Value, ExtractionStage) {
    match OutputSanitizer::extract(raw) {
        Extraction::Structured(value, stage) => (value, stage),
        Extraction::Malformed => panic!("expected structured output for {raw:?}"),
    }
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn test_fenced_completion() {
    let raw = "Here is the ranking:\n```json\n{\"predictions\": [{\"code\": \"N18.3\"}], \"explanation\": \"CKD follows.\"}\n```\n";
    let (value, stage) = structured(raw);
    assert_eq!(stage, ExtractionStage::Unwrapped);
    assert_eq!(value["predictions"][0]["code"], json!("N18.3"));
}

#[test]
fn test_prefixed_completion() {
    let (value, stage) = structured("<|im_start|>assistant\nJSON: {\"explanation\": \"ok\"}<|im_end|>");
    assert_eq!(stage, ExtractionStage::Unwrapped);
    assert_eq!(value, json!({"explanation": "ok"}));
}

#[test]
fn test_object_inside_prose() {
    let raw = "Based on the history, {\"predictions\": [{\"code\": \"I50.9\"}], \"explanation\": \"uses {braces}\"} is my answer.";
    let (value, stage) = structured(raw);
    assert_eq!(stage, ExtractionStage::Balanced);
    assert_eq!(value["explanation"], json!("uses {braces}"));
}

#[test]
fn test_trailing_commas() {
    let (value, stage) = structured("{\"predictions\": [{\"code\": \"N18.3\",},], \"explanation\": \"x\",}");
    assert_eq!(stage, ExtractionStage::Repaired);
    assert_eq!(value, json!({"predictions": [{"code": "N18.3"}], "explanation": "x"}));
}

#[test]
fn test_smart_quotes() {
    let (value, stage) = structured("{\u{201C}explanation\u{201D}: \u{201C}likely CKD\u{201D}}");
    assert_eq!(stage, ExtractionStage::Repaired);
    assert_eq!(value, json!({"explanation": "likely CKD"}));
}

#[test]
fn test_stray_closer() {
    let (value, _) = structured("{\"explanation\": \"x\"}}]");
    assert_eq!(value, json!({"explanation": "x"}));
}

// ============================================================================
// Rejection
// ============================================================================

#[test]
fn test_unrecoverable_outputs() {
    for raw in [
        "",
        "   ",
        "I'm sorry, I cannot provide medical predictions.",
        "{\"predictions\": [",
        "null",
        "3.14",
    ] {
        assert_eq!(OutputSanitizer::extract(raw), Extraction::Malformed, "input: {raw:?}");
    }
}

#[test]
fn test_reparse_of_recovered_value_is_direct() {
    let (value, _) = structured("```\n{'explanation': 'single quoted'}\n```");
    let (again, stage) = structured(&value.to_string());
    assert_eq!(stage, ExtractionStage::Direct);
    assert_eq!(again, value);
}

// ============================================================================
// Through the pipeline
// ============================================================================

fn request() -> PredictRequest {
    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    PredictRequest::new(PatientHistory::new(vec![HistoryEntry::new("I10", t0)])).with_transitions(vec![
        TransitionEdge::new("I10", "N18.3", 0.3),
        TransitionEdge::new("I10", "I25.10", 0.2),
    ])
}

#[tokio::test]
async fn test_fenced_model_answer_is_used() {
    let source = |_prompt: &str| -> prognos::Result<String> {
        Ok("```json\n{\"predictions\": [{\"code\": \"N18.3\"}], \"explanation\": \"Long-standing hypertension damages the kidneys.\",}\n```".to_string())
    };
    let ctx = ModelContext::new().with_explanation(source);
    let predictor = Predictor::open_memory().with_context(ctx);

    let result = predictor.predict(PatientId(1), request()).await.unwrap();
    assert!(!result.used_fallback);
    assert_eq!(result.explanation, "Long-standing hypertension damages the kidneys.");
    // Ranking order is the formula's, not the model's
    assert_eq!(result.predictions[0].code.as_str(), "N18.3");
}

#[tokio::test]
async fn test_model_naming_unknown_code_falls_back() {
    let source = |_prompt: &str| -> prognos::Result<String> {
        Ok("{\"predictions\": [{\"code\": \"Z99.9\"}], \"explanation\": \"made up\"}".to_string())
    };
    let ctx = ModelContext::new().with_explanation(source);
    let predictor = Predictor::open_memory().with_context(ctx);

    let result = predictor.predict(PatientId(2), request()).await.unwrap();
    assert!(result.used_fallback);
    assert!(result.explanation.starts_with("Based on transition probability (0.30)"));
}

#[tokio::test]
async fn test_citation_ahead_of_answer_is_skipped() {
    let source = |_prompt: &str| -> prognos::Result<String> {
        Ok(r#"Per guidelines [1], the answer is {"predictions":[{"code":"N18.3"}],"explanation":"Model says N18.3."}"#
            .to_string())
    };
    let predictor = Predictor::open_memory().with_context(ModelContext::new().with_explanation(source));

    let result = predictor.predict(PatientId(3), request()).await.unwrap();
    assert!(!result.used_fallback);
    assert_eq!(result.explanation, "Model says N18.3.");
}

#[test]
fn test_nested_openers_stay_fast() {
    let started = std::time::Instant::now();
    assert_eq!(OutputSanitizer::extract(&"{".repeat(40_000)), Extraction::Malformed);
    assert_eq!(OutputSanitizer::extract(&"[{".repeat(20_000)), Extraction::Malformed);
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
}
