//! Final result assembly.

use tracing::debug;

use crate::config::PipelineConfig;
use crate::model::{DagSnapshot, EvidenceRef, EvidenceSnippet, PipelineResult};
use crate::ranking::score::unit;
use crate::ranking::{cap_chars, RankingOutcome};

pub struct ResponseAssembler<'a> {
    config: &'a PipelineConfig,
}

impl<'a> ResponseAssembler<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Merge ranking, graph and evidence into the caller-facing result.
    ///
    /// Every predicted code is made a graph node before the result leaves.
    pub fn assemble(&self, outcome: RankingOutcome, mut dag: DagSnapshot, evidence: &[EvidenceSnippet]) -> PipelineResult {
        for prediction in &outcome.predictions {
            dag.ensure_node(prediction.code.clone());
        }

        let result = PipelineResult {
            predictions: outcome.predictions,
            explanation: outcome.explanation,
            evidence: self.top_evidence(evidence),
            dag,
            used_fallback: outcome.used_fallback,
        };
        debug_assert!(result.validate().is_ok(), "result references codes outside the graph");
        debug!(
            predictions = result.predictions.len(),
            evidence = result.evidence.len(),
            used_fallback = result.used_fallback,
            "result assembled"
        );
        result
    }

    /// Similarity descending, ties by code; trimmed snippets. Similarities
    /// are clamped to `[0, 1]` (NaN to 0) before sorting.
    pub fn top_evidence(&self, evidence: &[EvidenceSnippet]) -> Vec<EvidenceRef> {
        let mut sorted: Vec<(&EvidenceSnippet, f64)> = evidence.iter().map(|s| (s, unit(s.similarity))).collect();
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.code.cmp(&b.0.code)));
        sorted
            .into_iter()
            .take(self.config.max_evidence)
            .map(|(s, similarity)| EvidenceRef {
                code: s.code.clone(),
                snippet: cap_chars(&s.text, self.config.snippet_chars),
                similarity,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RankedPrediction, ScoreBreakdown};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_top_evidence() {
        let config = PipelineConfig::default();
        let evidence: Vec<EvidenceSnippet> = (0..7)
            .map(|i| EvidenceSnippet::new(format!("C{i}"), "é".repeat(200), f64::from(i) / 10.0))
            .collect();
        let top = ResponseAssembler::new(&config).top_evidence(&evidence);
        assert_eq!(top.len(), 5);
        assert_eq!(top[0].code.as_str(), "C6");
        assert_eq!(top[0].snippet.chars().count(), 150);
    }

    #[test]
    fn test_evidence_similarity_clamped() {
        let config = PipelineConfig::default();
        let evidence = vec![
            EvidenceSnippet::new("A", "nan", f64::NAN),
            EvidenceSnippet::new("B", "high", 3.5),
            EvidenceSnippet::new("C", "low", -0.4),
            EvidenceSnippet::new("D", "mid", 0.5),
        ];
        let top = ResponseAssembler::new(&config).top_evidence(&evidence);
        let got: Vec<(&str, f64)> = top.iter().map(|e| (e.code.as_str(), e.similarity)).collect();
        assert_eq!(got, vec![("B", 1.0), ("D", 0.5), ("A", 0.0), ("C", 0.0)]);
    }

    #[test]
    fn test_predictions_become_nodes() {
        let config = PipelineConfig::default();
        let outcome = RankingOutcome {
            predictions: vec![RankedPrediction {
                code: "X".into(),
                score: 0.0,
                rank: 1,
                score_breakdown: ScoreBreakdown::default(),
            }],
            explanation: "e".into(),
            used_fallback: true,
        };
        let result = ResponseAssembler::new(&config).assemble(outcome, DagSnapshot::new(), &[]);
        assert!(result.dag.contains_node("X"));
        result.validate().unwrap();
    }
}
