//! External statistical tables: disease transitions and co-occurrence.
//!
//! Rows arrive from an external collaborator and are validated row by row.
//! A malformed row is rejected individually; it never invalidates the table.

use serde::{Deserialize, Serialize};

use super::DiseaseCode;
use crate::{Error, Result};

/// Historical probability that `from` is followed by `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEdge {
    pub from: DiseaseCode,
    pub to: DiseaseCode,
    pub probability: f64,
    /// Signed so that corrupt negative counts are detectable rather than
    /// failing deserialisation of the whole table.
    #[serde(default)]
    pub support_count: i64,
}

impl TransitionEdge {
    pub fn new(from: impl Into<DiseaseCode>, to: impl Into<DiseaseCode>, probability: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            probability,
            support_count: 0,
        }
    }

    pub fn with_support(mut self, support_count: i64) -> Self {
        self.support_count = support_count;
        self
    }

    /// Check the row is usable. Returns `UnknownTransitionFormat` otherwise.
    pub fn validate(&self) -> Result<()> {
        if self.from.is_empty() || self.to.is_empty() {
            return Err(Error::UnknownTransitionFormat(format!(
                "empty code in transition '{}' -> '{}'", self.from, self.to
            )));
        }
        if !self.probability.is_finite() || !(0.0..=1.0).contains(&self.probability) {
            return Err(Error::UnknownTransitionFormat(format!(
                "probability {} out of range for {} -> {}", self.probability, self.from, self.to
            )));
        }
        if self.support_count < 0 {
            return Err(Error::UnknownTransitionFormat(format!(
                "negative support count {} for {} -> {}", self.support_count, self.from, self.to
            )));
        }
        Ok(())
    }
}

/// How often two diseases were diagnosed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoOccurrenceEntry {
    pub code_a: DiseaseCode,
    pub code_b: DiseaseCode,
    pub count: u64,
    /// Total observations the count was drawn from.
    pub total: u64,
}

impl CoOccurrenceEntry {
    pub fn new(code_a: impl Into<DiseaseCode>, code_b: impl Into<DiseaseCode>, count: u64, total: u64) -> Self {
        Self { code_a: code_a.into(), code_b: code_b.into(), count, total }
    }

    /// `count / total` clamped to `[0, 1]`; zero when there are no observations.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.count as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}
