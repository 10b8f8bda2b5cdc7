//! # Progression Model
//!
//! DTOs shared by every stage: history and statistical tables in, DAG
//! snapshots and ranked predictions out.
//!
//! Design rule: this module is pure data. No I/O, no async, no config.

pub mod code;
pub mod history;
pub mod tables;
pub mod candidate;
pub mod dag;
pub mod prediction;

pub use code::DiseaseCode;
pub use history::{HistoryEntry, PatientHistory};
pub use tables::{TransitionEdge, CoOccurrenceEntry};
pub use candidate::{Candidate, CandidateSet, CandidateSource};
pub use dag::{
    DagSnapshot, DagState, GraphEdge, EdgeOrigin, EdgeDescriptor,
    Modification, ModificationKind,
};
pub use prediction::{
    RankedPrediction, ScoreBreakdown, EvidenceSnippet, EvidenceRef, PipelineResult,
};
