//! Initial progression graph.

use hashbrown::HashMap;
use tracing::debug;

use crate::config::{CyclePolicy, PipelineConfig};
use crate::model::{CandidateSet, CoOccurrenceEntry, DagSnapshot, DiseaseCode, EdgeOrigin, GraphEdge, PatientHistory};
use crate::ranking::score::unit;

/// Co-occurrence ratios keyed by unordered code pair.
struct FitIndex<'a> {
    ratios: HashMap<(&'a str, &'a str), f64>,
    floor: f64,
}

impl<'a> FitIndex<'a> {
    fn new(entries: &'a [CoOccurrenceEntry], floor: f64) -> Self {
        let mut ratios = HashMap::with_capacity(entries.len());
        for entry in entries {
            let slot = ratios.entry((entry.code_a.as_str(), entry.code_b.as_str())).or_insert(0.0_f64);
            *slot = slot.max(entry.ratio());
        }
        Self { ratios, floor }
    }

    fn ratio(&self, a: &str, b: &str) -> f64 {
        self.ratios
            .get(&(a, b))
            .or_else(|| self.ratios.get(&(b, a)))
            .copied()
            .unwrap_or(0.0)
    }

    /// `ln(ratio)`, floored. Monotone in the ratio.
    fn fit(&self, a: &str, b: &str) -> f64 {
        self.ratio(a, b).ln().max(self.floor)
    }
}

pub struct DagBuilder<'a> {
    config: &'a PipelineConfig,
}

impl<'a> DagBuilder<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Fresh graph: one transition edge from every history code to every
    /// candidate.
    pub fn build(
        &self,
        history: &PatientHistory,
        candidates: &CandidateSet,
        co_occurrence: &[CoOccurrenceEntry],
    ) -> DagSnapshot {
        self.extend(DagSnapshot::new(), history, candidates, co_occurrence)
    }

    /// Grow a loaded graph with the current history and candidates.
    ///
    /// Existing edges are kept as they are. Edges a clinician removed or
    /// reversed are not re-added.
    pub fn extend(
        &self,
        prior: DagSnapshot,
        history: &PatientHistory,
        candidates: &CandidateSet,
        co_occurrence: &[CoOccurrenceEntry],
    ) -> DagSnapshot {
        let fits = FitIndex::new(co_occurrence, self.config.fit_floor);
        let mut dag = prior;

        let sources: Vec<&DiseaseCode> = history.codes();
        for code in &sources {
            dag.ensure_node((*code).clone());
        }
        for candidate in &candidates.candidates {
            dag.ensure_node(candidate.code.clone());
        }

        let mut added = 0usize;
        for from in &sources {
            for candidate in &candidates.candidates {
                let (from, to) = (from.as_str(), candidate.code.as_str());
                if from == to || dag.has_edge(from, to) || dag.clinician_removed(from, to) {
                    continue;
                }
                if self.config.cycle_policy == CyclePolicy::Reject && dag.would_create_cycle(from, to) {
                    debug!(from, to, "transition edge would close a cycle, skipped");
                    continue;
                }
                let weight = unit(candidate.transition_prob);
                dag.upsert_edge(GraphEdge::new(from, to, weight, EdgeOrigin::Transition).with_fit(fits.fit(from, to)));
                added += 1;
            }
        }

        dag.recompute_global_fit();
        debug!(nodes = dag.node_count(), edges = dag.edge_count(), added, global_fit = dag.global_fit(), "graph built");
        dag
    }
}
