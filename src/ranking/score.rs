//! Composite score.

use crate::config::ScoreWeights;
use crate::model::{Candidate, ScoreBreakdown};

/// Clamp to `[0, 1]`, NaN to 0.
pub(crate) fn unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// The candidate's clamped score inputs.
pub fn breakdown(candidate: &Candidate) -> ScoreBreakdown {
    ScoreBreakdown {
        transition: unit(candidate.transition_prob),
        doc_similarity: unit(candidate.doc_similarity),
        clinician_boost: unit(candidate.clinician_boost),
    }
}

/// `w.transition * t + w.doc_similarity * d + w.clinician * b`, clamped to
/// `[0, 1]`. Pure: equal inputs give bit-identical scores.
pub fn composite(inputs: &ScoreBreakdown, weights: &ScoreWeights) -> f64 {
    unit(
        weights.transition * inputs.transition
            + weights.doc_similarity * inputs.doc_similarity
            + weights.clinician * inputs.clinician_boost,
    )
}
