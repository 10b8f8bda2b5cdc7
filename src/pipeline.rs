//! Pure entry points.
//!
//! `predict` and `refine` are functions of their inputs and the model
//! context; persistence is the caller's business (see [`crate::Predictor`]).

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::candidates::CandidateSetBuilder;
use crate::causal::{ClinicianEdit, DagBuilder, DagRefiner};
use crate::config::PipelineConfig;
use crate::evidence::KnowledgeRetriever;
use crate::generative::ModelContext;
use crate::model::{
    Candidate, CandidateSet, CoOccurrenceEntry, DagSnapshot, DiseaseCode, EvidenceSnippet, PatientHistory,
    PipelineResult, TransitionEdge,
};
use crate::ranking::{score::unit, PromptContext, RankingEngine};
use crate::response::ResponseAssembler;
use crate::Result;

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PredictRequest {
    pub history: PatientHistory,
    pub transitions: Vec<TransitionEdge>,
    pub co_occurrence: Vec<CoOccurrenceEntry>,
    /// Retrieved evidence. When empty, the context's knowledge index is searched.
    pub evidence: Vec<EvidenceSnippet>,
    pub prior_dag: Option<DagSnapshot>,
    pub clinician_comment: Option<String>,
}

impl PredictRequest {
    pub fn new(history: PatientHistory) -> Self {
        Self { history, ..Self::default() }
    }

    pub fn with_transitions(mut self, transitions: Vec<TransitionEdge>) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn with_co_occurrence(mut self, co_occurrence: Vec<CoOccurrenceEntry>) -> Self {
        self.co_occurrence = co_occurrence;
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<EvidenceSnippet>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_prior_dag(mut self, dag: DagSnapshot) -> Self {
        self.prior_dag = Some(dag);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.clinician_comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineRequest {
    #[serde(default)]
    pub history: PatientHistory,
    #[serde(default)]
    pub transitions: Vec<TransitionEdge>,
    #[serde(default)]
    pub co_occurrence: Vec<CoOccurrenceEntry>,
    #[serde(default)]
    pub evidence: Vec<EvidenceSnippet>,
    /// Graph to edit. When absent, a fresh one is built from the history.
    #[serde(default)]
    pub dag: Option<DagSnapshot>,
    #[serde(rename = "clinicianFeedback")]
    pub edit: ClinicianEdit,
    #[serde(default)]
    pub clinician_comment: Option<String>,
}

impl RefineRequest {
    pub fn new(history: PatientHistory, edit: ClinicianEdit) -> Self {
        Self {
            history,
            transitions: Vec::new(),
            co_occurrence: Vec::new(),
            evidence: Vec::new(),
            dag: None,
            edit,
            clinician_comment: None,
        }
    }

    pub fn with_transitions(mut self, transitions: Vec<TransitionEdge>) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<EvidenceSnippet>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_dag(mut self, dag: DagSnapshot) -> Self {
        self.dag = Some(dag);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.clinician_comment = Some(comment.into());
        self
    }
}

// ============================================================================
// predict
// ============================================================================

/// Candidates, graph, causal refinement, ranking, assembly. Never fails:
/// every stage has a deterministic fallback.
pub async fn predict(config: &PipelineConfig, ctx: &ModelContext, request: PredictRequest) -> PipelineResult {
    let PredictRequest { history, transitions, co_occurrence, evidence, prior_dag, clinician_comment } = request;

    let mut candidates = CandidateSetBuilder::new(config).build(&history, &transitions, config.epsilon);

    let builder = DagBuilder::new(config);
    let dag = match prior_dag {
        Some(prior) => builder.extend(prior.normalized(), &history, &candidates, &co_occurrence),
        None => builder.build(&history, &candidates, &co_occurrence),
    };

    let evidence = gather_evidence(config, ctx, &history, &candidates, evidence).await;
    let dag = DagRefiner::new(config).refine(&dag, &evidence);
    apply_similarity(&mut candidates, &evidence);

    info!(
        history = history.len(),
        candidates = candidates.len(),
        source = ?candidates.source,
        fallback = candidates.is_fallback(),
        evidence = evidence.len(),
        "predicting"
    );

    let summary = history.summary();
    let context = PromptContext {
        patient_summary: &summary,
        evidence: &evidence,
        clinician_comment: clinician_comment.as_deref(),
    };
    let outcome = RankingEngine::new(config)
        .rank(&candidates, &dag, context, ctx.explanation.as_deref())
        .await;

    ResponseAssembler::new(config).assemble(outcome, dag, &evidence)
}

// ============================================================================
// refine
// ============================================================================

/// Apply one clinician edit and re-rank. Only `InvalidClinicianEdit`
/// surfaces; everything downstream of the edit falls back as in `predict`.
pub async fn refine(config: &PipelineConfig, ctx: &ModelContext, request: RefineRequest) -> Result<PipelineResult> {
    let RefineRequest { history, transitions, co_occurrence, evidence, dag, edit, clinician_comment } = request;

    let mut candidates = CandidateSetBuilder::new(config).build(&history, &transitions, config.epsilon);

    let base = match dag {
        Some(dag) => dag.normalized(),
        None => DagBuilder::new(config).build(&history, &candidates, &co_occurrence),
    };
    let mut dag = DagRefiner::new(config).apply_edit(&base, &edit)?;

    add_graph_candidates(&mut candidates, &dag, &history);
    for candidate in &candidates.candidates {
        dag.ensure_node(candidate.code.clone());
    }

    let evidence = gather_evidence(config, ctx, &history, &candidates, evidence).await;
    apply_similarity(&mut candidates, &evidence);

    info!(
        action = %edit.action,
        from = %edit.from,
        to = %edit.to,
        candidates = candidates.len(),
        "re-ranking after clinician edit"
    );

    let comment = clinician_comment.or_else(|| Some(edit.reason.clone()).filter(|r| !r.trim().is_empty()));
    let summary = history.summary();
    let context = PromptContext {
        patient_summary: &summary,
        evidence: &evidence,
        clinician_comment: comment.as_deref(),
    };
    let outcome = RankingEngine::new(config)
        .rank(&candidates, &dag, context, ctx.explanation.as_deref())
        .await;

    Ok(ResponseAssembler::new(config).assemble(outcome, dag, &evidence))
}

// ============================================================================
// Shared steps
// ============================================================================

/// Request evidence, or the knowledge index's best matches when there is none.
async fn gather_evidence(
    config: &PipelineConfig,
    ctx: &ModelContext,
    history: &PatientHistory,
    candidates: &CandidateSet,
    evidence: Vec<EvidenceSnippet>,
) -> Vec<EvidenceSnippet> {
    if !evidence.is_empty() {
        return evidence;
    }
    match (ctx.embedder.as_deref(), ctx.knowledge.as_deref()) {
        (Some(embedder), Some(knowledge)) => {
            let query = KnowledgeRetriever::generate_query(history, candidates);
            debug!(%query, "retrieving evidence");
            knowledge.retrieve(embedder, &query, config.max_evidence).await
        }
        _ => Vec::new(),
    }
}

/// Each candidate's doc similarity is the best similarity among the
/// evidence snippets about its code.
fn apply_similarity(candidates: &mut CandidateSet, evidence: &[EvidenceSnippet]) {
    let mut best: HashMap<&str, f64> = HashMap::new();
    for snippet in evidence {
        let slot = best.entry(snippet.code.as_str()).or_insert(0.0);
        *slot = slot.max(unit(snippet.similarity));
    }
    for candidate in &mut candidates.candidates {
        if let Some(similarity) = best.get(candidate.code.as_str()) {
            candidate.doc_similarity = *similarity;
        }
    }
}

/// Targets of edges leaving a history code become candidates too, with the
/// strongest such edge weight as their transition probability.
fn add_graph_candidates(candidates: &mut CandidateSet, dag: &DagSnapshot, history: &PatientHistory) {
    let mut supported: Vec<(DiseaseCode, f64)> = Vec::new();
    for source in history.codes() {
        for edge in dag.outgoing(source.as_str()) {
            if history.contains(edge.to.as_str()) || candidates.contains(edge.to.as_str()) {
                continue;
            }
            match supported.iter_mut().find(|(code, _)| *code == edge.to) {
                Some((_, weight)) => *weight = weight.max(edge.weight),
                None => supported.push((edge.to.clone(), edge.weight)),
            }
        }
    }
    if !supported.is_empty() {
        debug!(count = supported.len(), "graph-supported candidates added");
    }
    candidates
        .candidates
        .extend(supported.into_iter().map(|(code, weight)| Candidate::new(code).with_transition(unit(weight))));
}
