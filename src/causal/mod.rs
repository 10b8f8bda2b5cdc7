//! # Causal Graph
//!
//! Builds the per-patient progression graph and refines it, first from
//! causal connectives in evidence text, then from clinician corrections.
//!
//! Graph construction is rule based. There is no statistical discovery
//! (no conditional-independence testing); co-occurrence only feeds the
//! diagnostic fit score.

pub mod builder;
pub mod refiner;
mod markers;

pub use builder::DagBuilder;
pub use refiner::{ClinicianEdit, DagRefiner, EditAction};

pub(crate) use markers::find_code;
