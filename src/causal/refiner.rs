//! Graph refinement: causal phrases in evidence text and clinician edits.
//!
//! Both paths take a snapshot by reference and hand back a new one; the
//! caller's snapshot is never touched, so a rejected edit leaves no trace.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::markers::{find_code, first_phrase};
use crate::config::{CyclePolicy, PipelineConfig};
use crate::model::{
    DagSnapshot, DiseaseCode, EdgeDescriptor, EdgeOrigin, EvidenceSnippet, GraphEdge, Modification,
    ModificationKind,
};
use crate::{Error, Result};

// ============================================================================
// Clinician edits
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    AddEdge,
    RemoveEdge,
    ReverseEdge,
}

impl EditAction {
    fn kind(self) -> ModificationKind {
        match self {
            EditAction::AddEdge => ModificationKind::AddEdge,
            EditAction::RemoveEdge => ModificationKind::RemoveEdge,
            EditAction::ReverseEdge => ModificationKind::ReverseEdge,
        }
    }
}

impl std::fmt::Display for EditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditAction::AddEdge => write!(f, "add_edge"),
            EditAction::RemoveEdge => write!(f, "remove_edge"),
            EditAction::ReverseEdge => write!(f, "reverse_edge"),
        }
    }
}

/// A clinician's structured correction to the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicianEdit {
    pub action: EditAction,
    pub from: DiseaseCode,
    pub to: DiseaseCode,
    #[serde(default)]
    pub reason: String,
}

impl ClinicianEdit {
    pub fn new(action: EditAction, from: impl Into<DiseaseCode>, to: impl Into<DiseaseCode>, reason: impl Into<String>) -> Self {
        Self { action, from: from.into(), to: to.into(), reason: reason.into() }
    }

    pub fn add(from: impl Into<DiseaseCode>, to: impl Into<DiseaseCode>, reason: impl Into<String>) -> Self {
        Self::new(EditAction::AddEdge, from, to, reason)
    }

    pub fn remove(from: impl Into<DiseaseCode>, to: impl Into<DiseaseCode>, reason: impl Into<String>) -> Self {
        Self::new(EditAction::RemoveEdge, from, to, reason)
    }

    pub fn reverse(from: impl Into<DiseaseCode>, to: impl Into<DiseaseCode>, reason: impl Into<String>) -> Self {
        Self::new(EditAction::ReverseEdge, from, to, reason)
    }

    fn reason_or_default(&self) -> String {
        if self.reason.trim().is_empty() {
            format!("clinician {}", self.action)
        } else {
            self.reason.trim().to_string()
        }
    }
}

// ============================================================================
// DagRefiner
// ============================================================================

pub struct DagRefiner<'a> {
    config: &'a PipelineConfig,
}

impl<'a> DagRefiner<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    fn rejects_cycles(&self) -> bool {
        self.config.cycle_policy == CyclePolicy::Reject
    }

    /// Create or strengthen edges named by causal phrases in the evidence.
    pub fn refine(&self, dag: &DagSnapshot, evidence: &[EvidenceSnippet]) -> DagSnapshot {
        let mut next = dag.clone();
        let mut changed = 0usize;

        for snippet in evidence {
            let iteration = next.next_iteration();
            let text = snippet.text.to_lowercase();

            let Some((phrase, phrase_at)) = first_phrase(&text, &self.config.causal_phrases) else {
                continue;
            };
            if !next.contains_node(snippet.code.as_str()) {
                continue;
            }

            let mentioned: Vec<(DiseaseCode, usize)> = next
                .nodes()
                .filter(|node| **node != snippet.code)
                .filter_map(|node| {
                    find_code(&text, node.as_str(), self.config.vocabulary_entry(node.as_str()))
                        .map(|at| (node.clone(), at))
                })
                .collect();

            for (other, at) in mentioned {
                let forward = (at > phrase_at) != phrase.reversed;
                let (from, to) = if forward {
                    (snippet.code.clone(), other)
                } else {
                    (other, snippet.code.clone())
                };
                let reason = format!("causal phrase '{}' found in {}", phrase.phrase, snippet.code);
                if self.strengthen(&mut next, iteration, from, to, reason) {
                    changed += 1;
                }
            }
        }

        next.recompute_global_fit();
        debug!(snippets = evidence.len(), changed, iteration = next.iteration(), "causal refinement");
        next
    }

    /// Returns true if the graph changed.
    fn strengthen(&self, dag: &mut DagSnapshot, iteration: u32, from: DiseaseCode, to: DiseaseCode, reason: String) -> bool {
        let target = self.config.causal_edge_weight;
        let existing = dag.edge(from.as_str(), to.as_str()).cloned();

        let edge = match existing {
            Some(ref old) if old.weight >= target => return false,
            Some(ref old) => {
                let mut edge = old.clone();
                edge.weight = target;
                if edge.origin != EdgeOrigin::ClinicianAdded {
                    edge.origin = EdgeOrigin::CausalPhrase;
                    edge.reason = Some(reason.clone());
                }
                edge
            }
            None => {
                if self.rejects_cycles() && dag.would_create_cycle(from.as_str(), to.as_str()) {
                    debug!(%from, %to, "causal edge would close a cycle, skipped");
                    return false;
                }
                GraphEdge::new(from.clone(), to.clone(), target, EdgeOrigin::CausalPhrase).with_reason(reason.clone())
            }
        };

        let descriptor = edge.descriptor();
        let new_weight = edge.weight;
        dag.upsert_edge(edge);
        dag.record(Modification {
            iteration,
            kind: ModificationKind::CausalPhrase,
            edge: descriptor,
            reason,
            old_weight: existing.map(|e| e.weight),
            new_weight: Some(new_weight),
        });
        true
    }

    /// Apply one clinician edit. Every successful call appends exactly one
    /// history entry, including no-op removals and reversals.
    pub fn apply_edit(&self, dag: &DagSnapshot, edit: &ClinicianEdit) -> Result<DagSnapshot> {
        self.validate(dag, edit)?;

        let (from, to) = (edit.from.as_str(), edit.to.as_str());
        let reason = edit.reason_or_default();
        let mut next = dag.clone();

        let (old_weight, new_weight) = match edit.action {
            EditAction::AddEdge => {
                if self.rejects_cycles() && !next.has_edge(from, to) && next.would_create_cycle(from, to) {
                    return Err(Error::invalid_edit(from, to, "edge would create a cycle"));
                }
                let weight = self.config.clinician_edge_weight;
                let fit = next.edge(from, to).map(|e| e.fit_score).unwrap_or(0.0);
                let edge = GraphEdge::new(from, to, weight, EdgeOrigin::ClinicianAdded)
                    .with_fit(fit)
                    .with_reason(reason.clone());
                let old = next.upsert_edge(edge);
                (old.map(|e| e.weight), Some(weight))
            }
            EditAction::RemoveEdge => match next.remove_edge(from, to) {
                Some(old) => (Some(old.weight), None),
                None => (None, None),
            },
            EditAction::ReverseEdge => match next.remove_edge(from, to) {
                Some(old) => {
                    if self.rejects_cycles() && next.would_create_cycle(to, from) {
                        return Err(Error::invalid_edit(from, to, "reversed edge would create a cycle"));
                    }
                    let reversed = GraphEdge::new(to, from, old.weight, EdgeOrigin::ClinicianAdded)
                        .with_fit(old.fit_score)
                        .with_reason(reason.clone());
                    next.upsert_edge(reversed);
                    (Some(old.weight), Some(old.weight))
                }
                None => (None, None),
            },
        };

        let iteration = next.next_iteration();
        next.record(Modification {
            iteration,
            kind: edit.action.kind(),
            edge: EdgeDescriptor::new(from, to),
            reason,
            old_weight,
            new_weight,
        });
        next.recompute_global_fit();

        if old_weight.is_none() && new_weight.is_none() {
            info!(action = %edit.action, from, to, "clinician edit on absent edge, logged as no-op");
        } else {
            info!(action = %edit.action, from, to, "clinician edit applied");
        }
        Ok(next)
    }

    fn validate(&self, dag: &DagSnapshot, edit: &ClinicianEdit) -> Result<()> {
        let (from, to) = (edit.from.as_str(), edit.to.as_str());
        if edit.from.is_empty() || edit.to.is_empty() {
            return Err(Error::invalid_edit(from, to, "empty disease code"));
        }
        if from == to {
            return Err(Error::invalid_edit(from, to, "self-loop"));
        }
        for code in [from, to] {
            if !dag.contains_node(code) && !self.config.is_known_code(code) {
                return Err(Error::invalid_edit(from, to, format!("unknown code '{code}'")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DagState;
    use pretty_assertions::assert_eq;

    fn dag_with(edges: &[(&str, &str, f64)]) -> DagSnapshot {
        let mut dag = DagSnapshot::new();
        for (from, to, weight) in edges {
            dag.upsert_edge(GraphEdge::new(*from, *to, *weight, EdgeOrigin::Transition));
        }
        dag
    }

    #[test]
    fn test_reverse_edge_keeps_weight() {
        let config = PipelineConfig::default();
        let dag = dag_with(&[("A", "B", 0.8)]);
        let next = DagRefiner::new(&config).apply_edit(&dag, &ClinicianEdit::reverse("A", "B", "wrong way")).unwrap();
        assert!(!next.has_edge("A", "B"));
        assert_eq!(next.edge("B", "A").map(|e| e.weight), Some(0.8));
        assert_eq!(next.history().len(), 1);
        assert_eq!(next.history()[0].kind, ModificationKind::ReverseEdge);
        // Caller's snapshot untouched
        assert!(dag.has_edge("A", "B"));
        assert_eq!(dag.state(), DagState::Initial);
    }

    #[test]
    fn test_add_edge_is_idempotent_on_edges() {
        let config = PipelineConfig::default();
        let refiner = DagRefiner::new(&config);
        let dag = dag_with(&[("A", "B", 0.5)]);
        let edit = ClinicianEdit::add("B", "C", "seen in clinic");
        // C is not a node and not in the vocabulary
        assert!(refiner.apply_edit(&dag, &edit).is_err());

        let edit = ClinicianEdit::add("A", "B", "confirmed");
        let once = refiner.apply_edit(&dag, &edit).unwrap();
        let twice = refiner.apply_edit(&once, &edit).unwrap();
        assert_eq!(once.edges(), twice.edges());
        assert_eq!(twice.history().len(), 2);
        let edge = twice.edge("A", "B").unwrap();
        assert_eq!(edge.weight, 0.8);
        assert_eq!(edge.origin, EdgeOrigin::ClinicianAdded);
        assert_eq!(edge.reason.as_deref(), Some("confirmed"));
    }

    #[test]
    fn test_add_edge_with_vocabulary_code() {
        let config = PipelineConfig::default();
        let dag = dag_with(&[("I10", "N18.3", 0.3)]);
        let next = DagRefiner::new(&config).apply_edit(&dag, &ClinicianEdit::add("N18.3", "I50.9", "")).unwrap();
        assert!(next.contains_node("I50.9"));
        assert_eq!(next.history()[0].reason, "clinician add_edge");
    }

    #[test]
    fn test_remove_absent_edge_is_logged_noop() {
        let config = PipelineConfig::default();
        let dag = dag_with(&[("A", "B", 0.5)]);
        let next = DagRefiner::new(&config).apply_edit(&dag, &ClinicianEdit::remove("B", "A", "")).unwrap();
        assert_eq!(next.edges(), dag.edges());
        assert_eq!(next.history().len(), 1);
        assert_eq!(next.history()[0].old_weight, None);
        assert_eq!(next.history()[0].new_weight, None);
    }

    #[test]
    fn test_invalid_edits() {
        let config = PipelineConfig::default();
        let refiner = DagRefiner::new(&config);
        let dag = dag_with(&[("A", "B", 0.5), ("B", "C", 0.5)]);

        for edit in [
            ClinicianEdit::add("A", "A", ""),
            ClinicianEdit::add("", "B", ""),
            ClinicianEdit::add("A", "Z99", ""),
            ClinicianEdit::add("C", "A", "closes a cycle"),
        ] {
            match refiner.apply_edit(&dag, &edit) {
                Err(Error::InvalidClinicianEdit { from, to, .. }) => {
                    assert_eq!(from, edit.from.as_str());
                    assert_eq!(to, edit.to.as_str());
                }
                other => panic!("expected InvalidClinicianEdit, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_cycles_allowed_by_policy() {
        let config = PipelineConfig { cycle_policy: CyclePolicy::Allow, ..PipelineConfig::default() };
        let dag = dag_with(&[("A", "B", 0.5)]);
        let next = DagRefiner::new(&config).apply_edit(&dag, &ClinicianEdit::add("B", "A", "")).unwrap();
        assert!(next.has_edge("A", "B") && next.has_edge("B", "A"));
    }

    #[test]
    fn test_causal_phrase_creates_edge() {
        let config = PipelineConfig::default();
        let dag = dag_with(&[("I10", "N18.3", 0.3), ("I10", "I50.9", 0.2)]);
        let evidence = vec![EvidenceSnippet::new(
            "N18.3",
            "Chronic kidney disease often leads to heart failure in older adults.",
            0.7,
        )];
        let next = DagRefiner::new(&config).refine(&dag, &evidence);
        let edge = next.edge("N18.3", "I50.9").unwrap();
        assert_eq!(edge.weight, 0.9);
        assert_eq!(edge.origin, EdgeOrigin::CausalPhrase);
        assert_eq!(next.history().len(), 1);
        assert_eq!(next.history()[0].reason, "causal phrase 'leads to' found in N18.3");
        assert_eq!(next.iteration(), 1);
    }

    #[test]
    fn test_reversed_phrase_flips_direction() {
        let config = PipelineConfig::default();
        let dag = dag_with(&[("I10", "I50.9", 0.2)]);
        let evidence = vec![EvidenceSnippet::new("I50.9", "Heart failure is frequently caused by hypertension.", 0.5)];
        let next = DagRefiner::new(&config).refine(&dag, &evidence);
        assert_eq!(next.edge("I10", "I50.9").map(|e| e.weight), Some(0.9));
        assert!(!next.has_edge("I50.9", "I10"));
    }

    #[test]
    fn test_causal_phrase_strengthens_without_touching_clinician_origin() {
        let config = PipelineConfig::default();
        let mut dag = dag_with(&[]);
        dag.upsert_edge(GraphEdge::new("I10", "N18.3", 0.8, EdgeOrigin::ClinicianAdded));
        let evidence = vec![
            EvidenceSnippet::new("I10", "Hypertension is a risk factor for CKD stage 3.", 0.6),
            EvidenceSnippet::new("I10", "Hypertension leads to CKD stage 3.", 0.6),
        ];
        let next = DagRefiner::new(&config).refine(&dag, &evidence);
        let edge = next.edge("I10", "N18.3").unwrap();
        assert_eq!(edge.weight, 0.9);
        assert_eq!(edge.origin, EdgeOrigin::ClinicianAdded);
        // Second match changes nothing and is not logged
        assert_eq!(next.history().len(), 1);
        assert_eq!(next.iteration(), 2);
    }

    #[test]
    fn test_no_phrase_no_change() {
        let config = PipelineConfig::default();
        let dag = dag_with(&[("I10", "N18.3", 0.3)]);
        let evidence = vec![EvidenceSnippet::new("I10", "Hypertension and CKD stage 3 were both noted.", 0.6)];
        let next = DagRefiner::new(&config).refine(&dag, &evidence);
        assert_eq!(next.edges(), dag.edges());
        assert_eq!(next.state(), DagState::Initial);
    }
}
