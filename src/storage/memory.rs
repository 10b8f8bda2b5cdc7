//! In-memory snapshot store.
//!
//! This is the reference implementation of `SnapshotStore`.
//! It uses HashMaps protected by RwLock.
//!
//! ## Semantics
//!
//! - **Staged writes**: a transaction buffers its writes and applies them at
//!   `commit_tx()`; `rollback_tx()` drops them.
//! - **Last write wins**: there is no conflict detection. Two transactions
//!   writing the same patient both commit; the later commit's snapshot is
//!   the one that stays, and the patient's version counts both.
//! - **No durability**: everything is lost when the store is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::debug;

use super::{PatientId, PredictionRecord, SnapshotStore};
use crate::model::DagSnapshot;
use crate::tx::{Transaction, TxId, TxMode};
use crate::{Error, Result};

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    snapshots: RwLock<HashMap<PatientId, VersionedSnapshot>>,
    predictions: RwLock<HashMap<PatientId, Vec<PredictionRecord>>>,
    next_tx_id: AtomicU64,
}

#[derive(Debug, Clone)]
struct VersionedSnapshot {
    dag: DagSnapshot,
    version: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patients with a committed snapshot.
    pub fn patient_count(&self) -> usize {
        self.inner.snapshots.read().len()
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

#[derive(Debug)]
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    snapshots: HashMap<PatientId, DagSnapshot>,
    predictions: Vec<(PatientId, PredictionRecord)>,
}

impl MemoryTx {
    fn writable(&mut self) -> Result<&mut Self> {
        if self.is_read_only() {
            return Err(Error::TxError(format!("write in read-only transaction {}", self.id.0)));
        }
        Ok(self)
    }

    /// Number of staged writes.
    pub fn pending(&self) -> usize {
        self.snapshots.len() + self.predictions.len()
    }
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// SnapshotStore impl
// ============================================================================

#[async_trait]
impl SnapshotStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed) + 1);
        Ok(MemoryTx { id, mode, snapshots: HashMap::new(), predictions: Vec::new() })
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        let staged = tx.pending();
        if !tx.snapshots.is_empty() {
            let mut snapshots = self.inner.snapshots.write();
            for (patient, dag) in tx.snapshots {
                let version = snapshots.get(&patient).map_or(0, |s| s.version) + 1;
                snapshots.insert(patient, VersionedSnapshot { dag, version });
            }
        }
        if !tx.predictions.is_empty() {
            let mut predictions = self.inner.predictions.write();
            for (patient, record) in tx.predictions {
                predictions.entry(patient).or_default().push(record);
            }
        }
        debug!(tx = tx.id.0, staged, "memory tx committed");
        Ok(())
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        debug!(tx = tx.id.0, discarded = tx.pending(), "memory tx rolled back");
        Ok(())
    }

    async fn load_snapshot(&self, tx: &MemoryTx, patient: PatientId) -> Result<Option<DagSnapshot>> {
        if let Some(staged) = tx.snapshots.get(&patient) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.inner.snapshots.read().get(&patient).map(|s| s.dag.clone()))
    }

    async fn save_snapshot(&self, tx: &mut MemoryTx, patient: PatientId, dag: DagSnapshot) -> Result<()> {
        tx.writable()?.snapshots.insert(patient, dag);
        Ok(())
    }

    async fn version(&self, _tx: &MemoryTx, patient: PatientId) -> Result<u64> {
        Ok(self.inner.snapshots.read().get(&patient).map_or(0, |s| s.version))
    }

    async fn record_prediction(&self, tx: &mut MemoryTx, patient: PatientId, record: PredictionRecord) -> Result<()> {
        tx.writable()?.predictions.push((patient, record));
        Ok(())
    }

    async fn predictions(&self, tx: &MemoryTx, patient: PatientId) -> Result<Vec<PredictionRecord>> {
        let mut records = self.inner.predictions.read().get(&patient).cloned().unwrap_or_default();
        records.extend(tx.predictions.iter().filter(|(p, _)| *p == patient).map(|(_, r)| r.clone()));
        Ok(records)
    }
}

// ============================================================================
// Tests
// ============================================================================
