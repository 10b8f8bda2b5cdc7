//! # Snapshot Store Trait
//!
//! The contract between the predictor and any persistence engine. A store
//! keeps, per patient, the latest progression-graph snapshot and the log of
//! predictions made from it.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory, for testing and embedding |

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DagSnapshot, PipelineResult, RankedPrediction};
use crate::tx::{Transaction, TxMode};
use crate::Result;

pub use memory::MemoryStore;

/// Opaque patient identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatientId(pub u64);

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "patient:{}", self.0)
    }
}

/// One persisted prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub predictions: Vec<RankedPrediction>,
    pub explanation: String,
    pub used_fallback: bool,
    pub recorded_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn from_result(result: &PipelineResult) -> Self {
        Self {
            predictions: result.predictions.clone(),
            explanation: result.explanation.clone(),
            used_fallback: result.used_fallback,
            recorded_at: Utc::now(),
        }
    }
}

// ============================================================================
// SnapshotStore Trait
// ============================================================================

/// Transactional per-patient snapshot persistence.
///
/// Writes are staged on the transaction and become visible to other
/// transactions at commit. Reads inside a transaction see its own staged
/// writes. Concurrent writers to the same patient are last-write-wins.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    /// The transaction type for this store.
    type Tx: Transaction;

    // ========================================================================
    // Transactions
    // ========================================================================

    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Apply the transaction's staged writes.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Discard the transaction's staged writes.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Latest snapshot of the patient's graph. None if never saved.
    async fn load_snapshot(&self, tx: &Self::Tx, patient: PatientId) -> Result<Option<DagSnapshot>>;

    /// Replace the patient's snapshot. Fails on a read-only transaction.
    async fn save_snapshot(&self, tx: &mut Self::Tx, patient: PatientId, dag: DagSnapshot) -> Result<()>;

    /// Number of committed snapshot writes for the patient.
    async fn version(&self, tx: &Self::Tx, patient: PatientId) -> Result<u64>;

    // ========================================================================
    // Prediction log
    // ========================================================================

    async fn record_prediction(&self, tx: &mut Self::Tx, patient: PatientId, record: PredictionRecord) -> Result<()>;

    /// Recorded predictions, oldest first.
    async fn predictions(&self, tx: &Self::Tx, patient: PatientId) -> Result<Vec<PredictionRecord>>;
}
