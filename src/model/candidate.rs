//! Prediction candidates.

use serde::{Deserialize, Serialize};

use super::DiseaseCode;

/// A disease code under consideration as the patient's next diagnosis.
///
/// Request scoped: created per prediction, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub code: DiseaseCode,
    pub transition_prob: f64,
    pub doc_similarity: f64,
    pub clinician_boost: f64,
}

impl Candidate {
    pub fn new(code: impl Into<DiseaseCode>) -> Self {
        Self {
            code: code.into(),
            transition_prob: 0.0,
            doc_similarity: 0.0,
            clinician_boost: 0.0,
        }
    }

    pub fn with_transition(mut self, prob: f64) -> Self {
        self.transition_prob = prob;
        self
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.doc_similarity = similarity;
        self
    }
}

/// Which level of the candidate chain produced the set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CandidateSource {
    /// Direct transitions out of the current state.
    Transitions,
    /// Knowledge-based complication map, keyed by the matching seed code.
    KnowledgeMap { seed: DiseaseCode },
    /// Generic chronic-disease complication placeholder.
    Generic,
}

/// Output of the candidate builder. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    pub source: CandidateSource,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.candidates.iter().any(|c| c.code.as_str() == code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &DiseaseCode> {
        self.candidates.iter().map(|c| &c.code)
    }

    pub fn is_fallback(&self) -> bool {
        !matches!(self.source, CandidateSource::Transitions)
    }
}
