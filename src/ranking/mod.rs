//! # Ranking
//!
//! Scores every candidate with the composite formula, orders them, and
//! asks the generative source (if any) for an explanation. The formula
//! order is canonical; the model only ever contributes explanation text.

pub mod prompt;
pub mod score;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::causal::find_code;
use crate::config::PipelineConfig;
use crate::generative::{generate_within, ExplanationSource};
use crate::model::{CandidateSet, DagSnapshot, DiseaseCode, EvidenceSnippet, RankedPrediction};
use crate::sanitize::OutputSanitizer;
use crate::{Error, Result};

pub use prompt::ExplanationPromptBuilder;

/// What the ranking stage hands to the response assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingOutcome {
    pub predictions: Vec<RankedPrediction>,
    pub explanation: String,
    /// True when the explanation is the deterministic template.
    pub used_fallback: bool,
}

/// Prompt material that does not affect the scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptContext<'a> {
    pub patient_summary: &'a str,
    pub evidence: &'a [EvidenceSnippet],
    pub clinician_comment: Option<&'a str>,
}

/// The part of a model report the pipeline trusts.
#[derive(Debug, Deserialize)]
struct GenerativeReport {
    predictions: Vec<ReportedPrediction>,
    explanation: String,
}

#[derive(Debug, Deserialize)]
struct ReportedPrediction {
    code: DiseaseCode,
}

/// Shape check run on every block the sanitizer recovers, so a citation
/// like `[1]` ahead of the report is skipped.
fn looks_like_report(value: &Value) -> bool {
    value.get("predictions").is_some_and(Value::is_array) && value.get("explanation").is_some_and(Value::is_string)
}

pub struct RankingEngine<'a> {
    config: &'a PipelineConfig,
    prompts: ExplanationPromptBuilder,
}

impl<'a> RankingEngine<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config, prompts: ExplanationPromptBuilder::new() }
    }

    /// The fixed boost if a non-blank comment mentions the code, its
    /// vocabulary name or one of its keywords (see `causal::markers` for the
    /// matching rule); otherwise 0.
    pub fn clinician_boost(&self, code: &str, comment: Option<&str>) -> f64 {
        let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) else {
            return 0.0;
        };
        let comment = comment.to_lowercase();
        match find_code(&comment, code, self.config.vocabulary_entry(code)) {
            Some(_) => self.config.clinician_boost,
            None => 0.0,
        }
    }

    /// Formula ranking: score descending, ties by code ascending, truncated
    /// to `max_predictions`.
    pub fn rank_by_formula(&self, candidates: &CandidateSet, comment: Option<&str>) -> Vec<RankedPrediction> {
        let mut scored: Vec<(DiseaseCode, f64, crate::model::ScoreBreakdown)> = candidates
            .candidates
            .iter()
            .map(|candidate| {
                let mut candidate = candidate.clone();
                candidate.clinician_boost = self.clinician_boost(candidate.code.as_str(), comment);
                let inputs = score::breakdown(&candidate);
                (candidate.code, score::composite(&inputs, &self.config.weights), inputs)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(self.config.max_predictions);

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (code, score, score_breakdown))| RankedPrediction {
                code,
                score,
                rank: i as u32 + 1,
                score_breakdown,
            })
            .collect()
    }

    /// Rank, then explain. Generative failures of any kind fall back to the
    /// template explanation; this never fails.
    pub async fn rank(
        &self,
        candidates: &CandidateSet,
        dag: &DagSnapshot,
        context: PromptContext<'_>,
        source: Option<&dyn ExplanationSource>,
    ) -> RankingOutcome {
        let predictions = self.rank_by_formula(candidates, context.clinician_comment);

        if let Some(source) = source {
            match self.explain(candidates, dag, &predictions, context, source).await {
                Ok(explanation) => {
                    debug!(predictions = predictions.len(), "generative explanation accepted");
                    return RankingOutcome { predictions, explanation, used_fallback: false };
                }
                Err(e) => warn!(error = %e, "generative pass rejected, using template explanation"),
            }
        }

        let explanation = self.template_explanation(&predictions, context.clinician_comment);
        RankingOutcome { predictions, explanation, used_fallback: true }
    }

    async fn explain(
        &self,
        candidates: &CandidateSet,
        dag: &DagSnapshot,
        predictions: &[RankedPrediction],
        context: PromptContext<'_>,
        source: &dyn ExplanationSource,
    ) -> Result<String> {
        let prompt = self.prompts.build(
            context.patient_summary,
            predictions,
            dag,
            context.evidence,
            context.clinician_comment,
        );
        let raw = generate_within(source, &prompt, self.config.generative_timeout()).await?;
        let value = OutputSanitizer::extract_with(&raw, looks_like_report).into_value(&raw)?;
        let report: GenerativeReport = serde_json::from_value(value)
            .map_err(|e| Error::MalformedGenerativeOutput(format!("unexpected report shape: {e}")))?;

        if report.predictions.is_empty() {
            return Err(Error::MalformedGenerativeOutput("report has no predictions".into()));
        }
        if let Some(stray) = report.predictions.iter().find(|p| !candidates.contains(p.code.as_str())) {
            return Err(Error::MalformedGenerativeOutput(format!("code {} is not a candidate", stray.code)));
        }
        let explanation = report.explanation.trim();
        if explanation.is_empty() {
            return Err(Error::MalformedGenerativeOutput("blank explanation".into()));
        }
        Ok(cap_chars(explanation, self.config.explanation_chars))
    }

    /// Deterministic explanation built from the top prediction.
    pub fn template_explanation(&self, predictions: &[RankedPrediction], comment: Option<&str>) -> String {
        let Some(top) = predictions.first() else {
            return "No progression candidates available.".to_string();
        };
        let mut text = format!(
            "Based on transition probability ({:.2}) and evidence ({:.2}), {} is the most likely progression.",
            top.score_breakdown.transition, top.score_breakdown.doc_similarity, top.code
        );
        if let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) {
            text.push_str(&format!(" Clinician input considered: {comment}"));
        }
        cap_chars(&text, self.config.explanation_chars)
    }
}

/// First `max` characters of the text.
pub(crate) fn cap_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
