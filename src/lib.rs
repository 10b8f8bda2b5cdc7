//! # prognos: Disease Progression Prediction
//!
//! Predicts a patient's next likely diagnoses from structured history, a
//! disease-transition table and free-text medical evidence, and explains the
//! ranking. The result is reproducible even when the generative model is
//! missing, slow, or returns garbage.
//!
//! ## Design Principles
//!
//! 1. **Pure core**: candidate generation, graph construction/refinement and
//!    ranking are functions of their inputs
//! 2. **Clean DTOs**: `PatientHistory`, `DagSnapshot`, `PipelineResult` cross all boundaries
//! 3. **Fallback, never fail**: the generative pass is optional; the formula ranking is canonical
//! 4. **Trait-first persistence**: `SnapshotStore` is the contract between pipeline and storage
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use prognos::{Predictor, PredictRequest, PatientHistory, HistoryEntry, TransitionEdge, PatientId};
//!
//! # async fn example() -> prognos::Result<()> {
//! let predictor = Predictor::open_memory();
//!
//! let t0 = chrono::Utc::now();
//! let history = PatientHistory::new(vec![HistoryEntry::new("I10", t0)]);
//! let request = PredictRequest::new(history)
//!     .with_transitions(vec![TransitionEdge::new("I10", "N18.3", 0.3)]);
//!
//! let result = predictor.predict(PatientId(7), request).await?;
//! println!("{}", result.explanation);
//! # Ok(())
//! # }
//! ```
//!
//! ## Stages
//!
//! | Stage | Module | Description |
//! |-------|--------|-------------|
//! | Candidates | `candidates` | Transitions out of the current state, deterministic fallbacks |
//! | Graph | `causal` | Progression DAG, causal-phrase refinement, clinician edits |
//! | Ranking | `ranking` | Composite score, optional generative explanation |
//! | Sanitizer | `sanitize` | Structured data from raw model text |
//! | Response | `response` | Final `PipelineResult` |

use tracing::{debug, warn};

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod candidates;
pub mod causal;
pub mod ranking;
pub mod sanitize;
pub mod generative;
pub mod evidence;
pub mod response;
pub mod pipeline;
pub mod storage;
pub mod tx;
pub mod export;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    DiseaseCode, HistoryEntry, PatientHistory, TransitionEdge, CoOccurrenceEntry,
    Candidate, CandidateSet, CandidateSource,
    DagSnapshot, DagState, GraphEdge, EdgeOrigin, Modification, ModificationKind,
    RankedPrediction, ScoreBreakdown, EvidenceSnippet, EvidenceRef, PipelineResult,
};

// ============================================================================
// Re-exports: Pipeline
// ============================================================================

pub use config::{PipelineConfig, CyclePolicy, ScoreWeights};
pub use candidates::CandidateSetBuilder;
pub use causal::{DagBuilder, DagRefiner, ClinicianEdit, EditAction};
pub use ranking::{RankingEngine, RankingOutcome};
pub use sanitize::{OutputSanitizer, Extraction, ExtractionStage};
pub use generative::{ExplanationSource, ModelContext};
pub use evidence::{Embedder, KnowledgeDocument, KnowledgeRetriever};
pub use response::ResponseAssembler;
pub use pipeline::{PredictRequest, RefineRequest};

// ============================================================================
// Re-exports: Storage & Transactions
// ============================================================================

pub use storage::{SnapshotStore, MemoryStore, PatientId, PredictionRecord};
pub use tx::{Transaction, TxMode, TxId};

// ============================================================================
// Top-level Predictor handle
// ============================================================================

/// The primary entry point. A `Predictor` wraps a snapshot store and runs
/// each prediction or refinement inside one read-write transaction.
pub struct Predictor<S: SnapshotStore> {
    store: S,
    config: PipelineConfig,
    ctx: ModelContext,
}

impl<S: SnapshotStore> Predictor<S> {
    /// Create a Predictor over the given store with the default configuration
    /// and no model handles.
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            config: PipelineConfig::default(),
            ctx: ModelContext::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_context(mut self, ctx: ModelContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Access the underlying store (for advanced use).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Predict the patient's next diagnoses.
    ///
    /// Without a `prior_dag` in the request, the stored snapshot (if any) is
    /// extended. The resulting snapshot and prediction are persisted.
    pub async fn predict(&self, patient: PatientId, mut request: PredictRequest) -> Result<PipelineResult> {
        let mut tx = self.store.begin_tx(TxMode::ReadWrite).await?;

        let staged = async {
            if request.prior_dag.is_none() {
                request.prior_dag = self.store.load_snapshot(&tx, patient).await?;
            }
            let result = pipeline::predict(&self.config, &self.ctx, request).await;
            self.persist(&mut tx, patient, &result).await?;
            Ok::<_, Error>(result)
        }
        .await;

        self.finish(tx, patient, staged).await
    }

    /// Apply one clinician edit to the patient's graph and re-rank.
    pub async fn refine(&self, patient: PatientId, mut request: RefineRequest) -> Result<PipelineResult> {
        let mut tx = self.store.begin_tx(TxMode::ReadWrite).await?;

        let staged = async {
            if request.dag.is_none() {
                request.dag = self.store.load_snapshot(&tx, patient).await?;
            }
            let result = pipeline::refine(&self.config, &self.ctx, request).await?;
            self.persist(&mut tx, patient, &result).await?;
            Ok::<_, Error>(result)
        }
        .await;

        self.finish(tx, patient, staged).await
    }

    /// The stored progression graph of a patient.
    pub async fn dag(&self, patient: PatientId) -> Result<Option<DagSnapshot>> {
        let tx = self.store.begin_tx(TxMode::ReadOnly).await?;
        let snapshot = self.store.load_snapshot(&tx, patient).await;
        self.store.commit_tx(tx).await?;
        snapshot
    }

    /// Every prediction recorded for a patient, oldest first.
    pub async fn predictions(&self, patient: PatientId) -> Result<Vec<PredictionRecord>> {
        let tx = self.store.begin_tx(TxMode::ReadOnly).await?;
        let records = self.store.predictions(&tx, patient).await;
        self.store.commit_tx(tx).await?;
        records
    }

    /// Write the patient's stored graph as a Cypher script. Returns false if
    /// the patient has no graph yet.
    pub async fn export_cypher(&self, patient: PatientId, writer: &mut dyn std::io::Write) -> Result<bool> {
        match self.dag(patient).await? {
            Some(dag) => {
                export::export_cypher_dump(&dag, &self.config.vocabulary, writer)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn persist(&self, tx: &mut S::Tx, patient: PatientId, result: &PipelineResult) -> Result<()> {
        self.store.save_snapshot(tx, patient, result.dag.clone()).await?;
        self.store
            .record_prediction(tx, patient, PredictionRecord::from_result(result))
            .await
    }

    async fn finish(&self, tx: S::Tx, patient: PatientId, staged: Result<PipelineResult>) -> Result<PipelineResult> {
        match staged {
            Ok(result) => {
                self.store.commit_tx(tx).await?;
                debug!(patient = patient.0, predictions = result.predictions.len(), "committed");
                Ok(result)
            }
            Err(e) => {
                warn!(patient = patient.0, error = %e, "rolling back");
                self.store.rollback_tx(tx).await?;
                Err(e)
            }
        }
    }
}

/// In-memory predictor for testing and embedding.
impl Predictor<MemoryStore> {
    pub fn open_memory() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid clinician edit {from} -> {to}: {reason}")]
    InvalidClinicianEdit { from: String, to: String, reason: String },

    #[error("Unknown transition format: {0}")]
    UnknownTransitionFormat(String),

    #[error("Malformed generative output: {0}")]
    MalformedGenerativeOutput(String),

    #[error("No candidates available: {0}")]
    NoCandidatesAvailable(String),

    #[error("Unknown code: {0}")]
    UnknownCode(String),

    #[error("Generative source error: {0}")]
    GenerativeSource(String),

    #[error("Generative source timed out after {0:?}")]
    GenerativeTimeout(std::time::Duration),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_edit(from: &str, to: &str, reason: impl Into<String>) -> Self {
        Error::InvalidClinicianEdit {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
