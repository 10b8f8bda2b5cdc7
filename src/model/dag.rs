//! Disease-progression graph snapshot.
//!
//! A `DagSnapshot` is the unit that is loaded from storage, transformed by
//! the causal stages, and handed back to the caller for persistence.
//!
//! ## Invariants
//!
//! - At most one edge per ordered `(from, to)` pair. Writes to an existing
//!   pair overwrite weight, origin and reason.
//! - Both endpoints of every edge are nodes.
//!
//! "Acyclic" is a goal enforced by the refiner's cycle policy, not by this
//! type: with `CyclePolicy::Allow` a snapshot may contain cycles.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::DiseaseCode;

/// Where an edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeOrigin {
    Transition,
    CausalPhrase,
    ClinicianAdded,
}

impl EdgeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeOrigin::Transition => "transition",
            EdgeOrigin::CausalPhrase => "causal_phrase",
            EdgeOrigin::ClinicianAdded => "clinician",
        }
    }
}

impl std::fmt::Display for EdgeOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, weighted edge between two disease codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: DiseaseCode,
    pub to: DiseaseCode,
    pub weight: f64,
    /// Diagnostic co-occurrence fit; never used as a ranking weight.
    pub fit_score: f64,
    pub origin: EdgeOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GraphEdge {
    pub fn new(from: impl Into<DiseaseCode>, to: impl Into<DiseaseCode>, weight: f64, origin: EdgeOrigin) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            weight,
            fit_score: 0.0,
            origin,
            reason: None,
        }
    }

    pub fn with_fit(mut self, fit_score: f64) -> Self {
        self.fit_score = fit_score;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn connects(&self, from: &str, to: &str) -> bool {
        self.from.as_str() == from && self.to.as_str() == to
    }

    pub fn descriptor(&self) -> EdgeDescriptor {
        EdgeDescriptor { from: self.from.clone(), to: self.to.clone() }
    }
}

/// Ordered `(from, to)` pair naming an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    pub from: DiseaseCode,
    pub to: DiseaseCode,
}

impl EdgeDescriptor {
    pub fn new(from: impl Into<DiseaseCode>, to: impl Into<DiseaseCode>) -> Self {
        Self { from: from.into(), to: to.into() }
    }
}

impl std::fmt::Display for EdgeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// What kind of mutation a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModificationKind {
    CausalPhrase,
    AddEdge,
    RemoveEdge,
    ReverseEdge,
}

impl ModificationKind {
    pub fn is_clinician(&self) -> bool {
        !matches!(self, ModificationKind::CausalPhrase)
    }
}

/// One entry of a snapshot's append-only modification log.
///
/// `old_weight`/`new_weight` are `None` where the edge did not exist
/// before/after (a removal has no new weight, a no-op has neither).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modification {
    pub iteration: u32,
    pub kind: ModificationKind,
    pub edge: EdgeDescriptor,
    pub reason: String,
    pub old_weight: Option<f64>,
    pub new_weight: Option<f64>,
}

/// Lifecycle state of a snapshot, derived from its modification log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DagState {
    /// Freshly built, never mutated.
    Initial,
    /// At least one causal-phrase or clinician mutation applied.
    Refined,
}

// ============================================================================
// DagSnapshot
// ============================================================================

/// Nodes, edges, fit and mutation log of one patient's progression graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagSnapshot {
    nodes: BTreeSet<DiseaseCode>,
    edges: Vec<GraphEdge>,
    global_fit: f64,
    modification_history: Vec<Modification>,
    /// Refinement steps taken so far, across sessions.
    #[serde(default)]
    iteration: u32,
}

impl DagSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-establish the invariants on a snapshot from an untrusted source:
    /// duplicate pairs collapse to the last written edge and missing
    /// endpoints become nodes.
    pub fn normalized(mut self) -> Self {
        let edges = std::mem::take(&mut self.edges);
        for edge in edges {
            self.upsert_edge(edge);
        }
        self.recompute_global_fit();
        self
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn nodes(&self) -> impl Iterator<Item = &DiseaseCode> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, code: &str) -> bool {
        self.nodes.contains(code)
    }

    /// Add a node if absent. Returns true if it was inserted.
    pub fn ensure_node(&mut self, code: impl Into<DiseaseCode>) -> bool {
        self.nodes.insert(code.into())
    }

    // ========================================================================
    // Edges
    // ========================================================================

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| e.connects(from, to))
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edge(from, to).is_some()
    }

    /// Outgoing edges of a node.
    pub fn outgoing<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.from.as_str() == code)
    }

    /// Insert or overwrite the edge for its `(from, to)` pair.
    /// Returns the edge it replaced, if any.
    pub fn upsert_edge(&mut self, edge: GraphEdge) -> Option<GraphEdge> {
        self.nodes.insert(edge.from.clone());
        self.nodes.insert(edge.to.clone());
        match self.edges.iter_mut().find(|e| e.connects(edge.from.as_str(), edge.to.as_str())) {
            Some(slot) => Some(std::mem::replace(slot, edge)),
            None => {
                self.edges.push(edge);
                None
            }
        }
    }

    /// Remove the edge for `(from, to)`. Nodes are kept.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> Option<GraphEdge> {
        let idx = self.edges.iter().position(|e| e.connects(from, to))?;
        Some(self.edges.remove(idx))
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Whether `to` is reachable from `from` along directed edges.
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        self.causal_path(from, to).is_some()
    }

    /// Whether adding `from -> to` would close a directed cycle.
    pub fn would_create_cycle(&self, from: &str, to: &str) -> bool {
        from == to || self.reaches(to, from)
    }

    /// Shortest (fewest hops) directed path from `from` to `to`, inclusive.
    pub fn causal_path(&self, from: &str, to: &str) -> Option<Vec<DiseaseCode>> {
        let start = self.nodes.get(from)?;
        if from == to {
            return Some(vec![start.clone()]);
        }

        // BFS, remembering each node's predecessor
        let mut parent: hashbrown::HashMap<&str, &str> = hashbrown::HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(start.as_str());

        while let Some(tip) = queue.pop_front() {
            for edge in self.outgoing(tip) {
                let next = edge.to.as_str();
                if next == start.as_str() || parent.contains_key(next) {
                    continue;
                }
                parent.insert(next, tip);
                if next == to {
                    let mut path = vec![edge.to.clone()];
                    let mut cursor = tip;
                    loop {
                        path.push(DiseaseCode::from(cursor));
                        match parent.get(cursor) {
                            Some(prev) => cursor = *prev,
                            None => break,
                        }
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    // ========================================================================
    // Fit
    // ========================================================================

    /// Sum of edge fit scores.
    pub fn global_fit(&self) -> f64 {
        self.global_fit
    }

    pub fn recompute_global_fit(&mut self) {
        self.global_fit = self.edges.iter().map(|e| e.fit_score).sum();
    }

    // ========================================================================
    // Modification log
    // ========================================================================

    pub fn history(&self) -> &[Modification] {
        &self.modification_history
    }

    pub fn state(&self) -> DagState {
        if self.modification_history.is_empty() {
            DagState::Initial
        } else {
            DagState::Refined
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Advance the refinement counter, returning the new step number.
    pub(crate) fn next_iteration(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    pub(crate) fn record(&mut self, modification: Modification) {
        self.modification_history.push(modification);
    }

    /// Whether the clinician's latest word on `(from, to)` was to take the
    /// edge out (a removal or a reversal of an existing edge).
    pub fn clinician_removed(&self, from: &str, to: &str) -> bool {
        self.modification_history
            .iter()
            .rev()
            .find(|m| m.kind.is_clinician() && m.edge.from.as_str() == from && m.edge.to.as_str() == to)
            .is_some_and(|m| {
                matches!(m.kind, ModificationKind::RemoveEdge | ModificationKind::ReverseEdge)
                    && m.old_weight.is_some()
            })
    }
}
