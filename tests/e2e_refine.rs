//! End-to-end tests for clinician refinement.
//!
//! Each test exercises: stored graph -> clinician edit -> candidate rebuild
//! -> re-ranking, through `Predictor` backed by `MemoryStore`.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use prognos::{
    ClinicianEdit, CyclePolicy, DagSnapshot, DagState, EdgeOrigin, Error, GraphEdge, HistoryEntry, ModificationKind,
    PatientHistory, PatientId, PipelineConfig, PredictRequest, Predictor, RefineRequest, TransitionEdge,
};

fn history(codes: &[&str]) -> PatientHistory {
    let entries = codes
        .iter()
        .enumerate()
        .map(|(i, code)| HistoryEntry::new(*code, Utc.timestamp_opt(1_600_000_000 + i as i64 * 86_400, 0).unwrap()))
        .collect();
    PatientHistory::new(entries)
}

fn transitions() -> Vec<TransitionEdge> {
    vec![
        TransitionEdge::new("I10", "N18.3", 0.5),
        TransitionEdge::new("I10", "I25.10", 0.3),
    ]
}

async fn seeded(patient: PatientId) -> Predictor<prognos::MemoryStore> {
    let predictor = Predictor::open_memory();
    predictor
        .predict(patient, PredictRequest::new(history(&["I10"])).with_transitions(transitions()))
        .await
        .unwrap();
    predictor
}

// ============================================================================
// Edit semantics
// ============================================================================

#[tokio::test]
async fn test_reverse_edge() {
    let mut dag = DagSnapshot::new();
    dag.upsert_edge(GraphEdge::new("A", "B", 0.8, EdgeOrigin::ClinicianAdded));
    let predictor = Predictor::open_memory();

    let request = RefineRequest::new(history(&["A"]), ClinicianEdit::reverse("A", "B", "B precedes A")).with_dag(dag);
    let result = predictor.refine(PatientId(1), request).await.unwrap();

    assert!(!result.dag.has_edge("A", "B"));
    assert_eq!(result.dag.edge("B", "A").map(|e| e.weight), Some(0.8));
    assert_eq!(result.dag.history().len(), 1);
    assert_eq!(result.dag.history()[0].kind, ModificationKind::ReverseEdge);
    assert_eq!(result.dag.state(), DagState::Refined);
}

#[tokio::test]
async fn test_add_edge_twice_same_edges() {
    let patient = PatientId(2);
    let predictor = seeded(patient).await;
    let edit = ClinicianEdit::add("N18.3", "I50.9", "fluid overload observed");

    let once = predictor
        .refine(patient, RefineRequest::new(history(&["I10"]), edit.clone()).with_transitions(transitions()))
        .await
        .unwrap();
    let twice = predictor
        .refine(patient, RefineRequest::new(history(&["I10"]), edit).with_transitions(transitions()))
        .await
        .unwrap();

    assert_eq!(once.dag.edges(), twice.dag.edges());
    assert_eq!(twice.dag.history().len(), once.dag.history().len() + 1);
    let edge = twice.dag.edge("N18.3", "I50.9").unwrap();
    assert_eq!(edge.weight, 0.8);
    assert_eq!(edge.origin, EdgeOrigin::ClinicianAdded);
}

#[tokio::test]
async fn test_remove_absent_edge_logged() {
    let patient = PatientId(3);
    let predictor = seeded(patient).await;
    let before = predictor.dag(patient).await.unwrap().unwrap();

    let result = predictor
        .refine(patient, RefineRequest::new(history(&["I10"]), ClinicianEdit::remove("N18.3", "I10", "")))
        .await
        .unwrap();

    assert_eq!(result.dag.edges(), before.edges());
    assert_eq!(result.dag.history().len(), before.history().len() + 1);
    let entry = result.dag.history().last().unwrap();
    assert_eq!(entry.kind, ModificationKind::RemoveEdge);
    assert_eq!(entry.old_weight, None);
}

#[tokio::test]
async fn test_removed_edge_stays_removed() {
    let patient = PatientId(4);
    let predictor = seeded(patient).await;

    predictor
        .refine(patient, RefineRequest::new(history(&["I10"]), ClinicianEdit::remove("I10", "I25.10", "ruled out")))
        .await
        .unwrap();
    let again = predictor
        .predict(patient, PredictRequest::new(history(&["I10"])).with_transitions(transitions()))
        .await
        .unwrap();

    assert!(!again.dag.has_edge("I10", "I25.10"));
    assert!(again.dag.has_edge("I10", "N18.3"));
}

// ============================================================================
// Re-ranking
// ============================================================================

#[tokio::test]
async fn test_added_edge_target_becomes_candidate() {
    let patient = PatientId(5);
    let predictor = seeded(patient).await;

    let result = predictor
        .refine(
            patient,
            RefineRequest::new(history(&["I10"]), ClinicianEdit::add("I10", "I50.9", "")).with_transitions(transitions()),
        )
        .await
        .unwrap();

    let codes: Vec<&str> = result.predictions.iter().map(|p| p.code.as_str()).collect();
    assert_eq!(codes, vec!["I50.9", "N18.3", "I25.10"]);
    result.validate().unwrap();
}

#[tokio::test]
async fn test_refine_without_stored_graph_builds_one() {
    let predictor = Predictor::open_memory();
    let result = predictor
        .refine(
            PatientId(6),
            RefineRequest::new(history(&["I10"]), ClinicianEdit::remove("I10", "N18.3", "")).with_transitions(transitions()),
        )
        .await
        .unwrap();

    assert!(!result.dag.has_edge("I10", "N18.3"));
    assert!(result.dag.has_edge("I10", "I25.10"));
    assert!(predictor.dag(PatientId(6)).await.unwrap().is_some());
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_invalid_edit_rolls_back() {
    let patient = PatientId(7);
    let predictor = seeded(patient).await;
    let before = predictor.dag(patient).await.unwrap().unwrap();

    let err = predictor
        .refine(patient, RefineRequest::new(history(&["I10"]), ClinicianEdit::add("I10", "NOT_A_CODE", "")))
        .await
        .unwrap_err();
    match err {
        Error::InvalidClinicianEdit { from, to, .. } => {
            assert_eq!(from, "I10");
            assert_eq!(to, "NOT_A_CODE");
        }
        other => panic!("expected InvalidClinicianEdit, got {other:?}"),
    }

    assert_eq!(predictor.dag(patient).await.unwrap().unwrap(), before);
    assert_eq!(predictor.predictions(patient).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cycle_rejected_by_default() {
    let patient = PatientId(8);
    let predictor = seeded(patient).await;
    let err = predictor
        .refine(patient, RefineRequest::new(history(&["I10"]), ClinicianEdit::add("N18.3", "I10", "")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidClinicianEdit { .. }));
}

#[tokio::test]
async fn test_cycle_allowed_when_configured() {
    let config = PipelineConfig { cycle_policy: CyclePolicy::Allow, ..PipelineConfig::default() };
    let predictor = Predictor::open_memory().with_config(config);
    predictor
        .predict(PatientId(9), PredictRequest::new(history(&["I10"])).with_transitions(transitions()))
        .await
        .unwrap();

    let result = predictor
        .refine(PatientId(9), RefineRequest::new(history(&["I10"]), ClinicianEdit::add("N18.3", "I10", "")))
        .await
        .unwrap();
    assert!(result.dag.has_edge("N18.3", "I10"));
    assert!(result.dag.has_edge("I10", "N18.3"));
}

#[tokio::test]
async fn test_refine_request_json() {
    let json = serde_json::json!({
        "history": [{"code": "I10", "visitTimestamp": "2024-01-01T00:00:00Z"}],
        "clinicianFeedback": {"action": "reverse_edge", "from": "I10", "to": "N18.3", "reason": "check"}
    });
    let request: RefineRequest = serde_json::from_value(json).unwrap();
    assert_eq!(request.edit, ClinicianEdit::reverse("I10", "N18.3", "check"));
    assert!(request.dag.is_none());
}
