//! Candidate generation.
//!
//! Candidates come from transitions out of the patient's current state.
//! When there are none, a knowledge-based complication map is consulted,
//! and as a last resort a single generic placeholder is returned. The
//! builder never returns an empty set.

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::config::{FallbackRule, PipelineConfig};
use crate::model::{Candidate, CandidateSet, CandidateSource, DiseaseCode, PatientHistory, TransitionEdge};
use crate::ranking::score::unit;
use crate::{Error, Result};

pub struct CandidateSetBuilder<'a> {
    config: &'a PipelineConfig,
}

impl<'a> CandidateSetBuilder<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Build the candidate set for the patient's next diagnosis.
    pub fn build(&self, history: &PatientHistory, transitions: &[TransitionEdge], epsilon: f64) -> CandidateSet {
        match self.from_transitions(history, transitions, epsilon) {
            Ok(candidates) => {
                debug!(count = candidates.len(), "candidates from transitions");
                return CandidateSet { candidates, source: CandidateSource::Transitions };
            }
            Err(e) => debug!(error = %e, "falling back"),
        }

        if let Some((rule, candidates)) = self.from_knowledge_map(history) {
            debug!(seed = %rule.seed, count = candidates.len(), "candidates from knowledge map");
            return CandidateSet {
                candidates,
                source: CandidateSource::KnowledgeMap { seed: rule.seed.clone() },
            };
        }

        debug!(code = %self.config.generic_complication, "generic fallback candidate");
        CandidateSet {
            candidates: vec![Candidate::new(self.config.generic_complication.clone())],
            source: CandidateSource::Generic,
        }
    }

    fn from_transitions(
        &self,
        history: &PatientHistory,
        transitions: &[TransitionEdge],
        epsilon: f64,
    ) -> Result<Vec<Candidate>> {
        let current = history
            .current_state()
            .ok_or_else(|| Error::NoCandidatesAvailable("empty history".into()))?;

        let mut best: HashMap<&DiseaseCode, f64> = HashMap::new();
        for edge in transitions {
            if let Err(e) = edge.validate() {
                warn!(error = %e, "skipping transition row");
                continue;
            }
            if edge.from != *current || edge.probability < epsilon || history.contains(edge.to.as_str()) {
                continue;
            }
            let slot = best.entry(&edge.to).or_insert(edge.probability);
            *slot = slot.max(edge.probability);
        }

        if best.is_empty() {
            return Err(Error::NoCandidatesAvailable(format!(
                "no transition out of {current} with probability >= {epsilon}"
            )));
        }

        let candidates = best
            .into_iter()
            .map(|(code, prob)| Candidate::new(code.clone()).with_transition(prob))
            .collect();
        Ok(sorted(candidates))
    }

    /// First rule, in declaration order, seeded by a latest-visit code that
    /// still has a complication the patient does not already have.
    fn from_knowledge_map(&self, history: &PatientHistory) -> Option<(&FallbackRule, Vec<Candidate>)> {
        let latest = history.latest_visit_codes();
        if latest.is_empty() {
            return None;
        }

        self.config.fallback_map.iter().find_map(|rule| {
            if !latest.iter().any(|code| code.in_category(rule.seed.as_str())) {
                return None;
            }
            let mut best: HashMap<&DiseaseCode, f64> = HashMap::new();
            for complication in &rule.complications {
                if complication.code.is_empty() || history.contains(complication.code.as_str()) {
                    continue;
                }
                let prob = unit(complication.prob);
                let slot = best.entry(&complication.code).or_insert(prob);
                *slot = slot.max(prob);
            }
            if best.is_empty() {
                return None;
            }
            let candidates = best
                .into_iter()
                .map(|(code, prob)| Candidate::new(code.clone()).with_transition(prob))
                .collect();
            Some((rule, sorted(candidates)))
        })
    }
}

/// Probability descending, ties by code ascending.
fn sorted(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.transition_prob
            .total_cmp(&a.transition_prob)
            .then_with(|| a.code.cmp(&b.code))
    });
    candidates
}
