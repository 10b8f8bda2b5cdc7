//! Property tests over the pure stages.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use prognos::ranking::score::{breakdown, composite};
use prognos::{
    Candidate, CandidateSetBuilder, DagBuilder, Extraction, HistoryEntry, OutputSanitizer, PatientHistory,
    PipelineConfig, RankingEngine, ScoreWeights, TransitionEdge,
};

const CODES: &[&str] = &["I10", "E11", "N18.3", "N18.4", "I25.10", "I50.9", "I21.9", "I63.9"];

fn code() -> impl Strategy<Value = &'static str> {
    prop::sample::select(CODES)
}

fn history() -> impl Strategy<Value = PatientHistory> {
    prop::collection::vec((code(), 0i64..5), 0..5).prop_map(|visits| {
        PatientHistory::new(
            visits
                .into_iter()
                .map(|(code, day)| HistoryEntry::new(code, Utc.timestamp_opt(1_700_000_000 + day * 86_400, 0).unwrap()))
                .collect(),
        )
    })
}

fn transitions() -> impl Strategy<Value = Vec<TransitionEdge>> {
    prop::collection::vec((code(), code(), -0.5f64..1.5), 0..12)
        .prop_map(|rows| rows.into_iter().map(|(from, to, p)| TransitionEdge::new(from, to, p)).collect())
}

proptest! {
    #[test]
    fn score_stays_in_unit_interval(t in -2.0f64..3.0, d in -2.0f64..3.0, b in -2.0f64..3.0) {
        let candidate = Candidate { transition_prob: t, doc_similarity: d, clinician_boost: b, ..Candidate::new("X") };
        let score = composite(&breakdown(&candidate), &ScoreWeights::default());
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn candidates_never_empty(history in history(), transitions in transitions()) {
        let config = PipelineConfig::default();
        let set = CandidateSetBuilder::new(&config).build(&history, &transitions, config.epsilon);
        prop_assert!(!set.is_empty());
        for candidate in &set.candidates {
            prop_assert!(!history.contains(candidate.code.as_str()));
        }
    }

    #[test]
    fn ranking_is_a_total_order(history in history(), transitions in transitions(), comment in prop::option::of("[A-Za-z0-9. ]{0,30}")) {
        let config = PipelineConfig::default();
        let set = CandidateSetBuilder::new(&config).build(&history, &transitions, config.epsilon);
        let ranked = RankingEngine::new(&config).rank_by_formula(&set, comment.as_deref());

        prop_assert!(!ranked.is_empty());
        prop_assert!(ranked.len() <= config.max_predictions);
        for (i, prediction) in ranked.iter().enumerate() {
            prop_assert_eq!(prediction.rank as usize, i + 1);
        }
        for pair in ranked.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.score > b.score || (a.score == b.score && a.code < b.code));
        }

        let again = RankingEngine::new(&config).rank_by_formula(&set, comment.as_deref());
        prop_assert_eq!(ranked, again);
    }

    #[test]
    fn built_graph_is_acyclic(history in history(), transitions in transitions()) {
        let config = PipelineConfig::default();
        let set = CandidateSetBuilder::new(&config).build(&history, &transitions, config.epsilon);
        let dag = DagBuilder::new(&config).build(&history, &set, &[]);
        for edge in dag.edges() {
            prop_assert!(edge.from != edge.to);
            prop_assert!(!dag.reaches(edge.to.as_str(), edge.from.as_str()));
            prop_assert!((0.0..=1.0).contains(&edge.weight));
        }
        for code in set.codes() {
            prop_assert!(dag.contains_node(code.as_str()));
        }
    }

    #[test]
    fn sanitizer_is_total_and_stable(raw in "\\PC{0,200}") {
        let first = OutputSanitizer::extract(&raw);
        prop_assert_eq!(&first, &OutputSanitizer::extract(&raw));
        if let Extraction::Structured(value, _) = first {
            prop_assert!(value.is_object() || value.is_array());
        }
    }

    #[test]
    fn sanitizer_recovers_wrapped_objects(key in "[a-z]{1,8}", value in "[A-Za-z0-9 ]{0,20}", label in prop::sample::select(vec!["", "JSON: ", "Output: ", "Answer:"])) {
        let raw = format!("{label}```json\n{{\"{key}\": \"{value}\",}}\n```");
        match OutputSanitizer::extract(&raw) {
            Extraction::Structured(parsed, _) => prop_assert_eq!(parsed[key.as_str()].as_str(), Some(value.as_str())),
            Extraction::Malformed => prop_assert!(false, "not recovered: {}", raw),
        }
    }
}
