//! Ranked predictions, evidence, and the externally visible result.

use serde::{Deserialize, Serialize};

use super::{DagSnapshot, DiseaseCode};
use crate::{Error, Result};

/// The three weighted inputs behind a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub transition: f64,
    pub doc_similarity: f64,
    pub clinician_boost: f64,
}

/// A scored, ranked candidate. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPrediction {
    pub code: DiseaseCode,
    pub score: f64,
    /// 1-based position in the canonical order.
    pub rank: u32,
    pub score_breakdown: ScoreBreakdown,
}

/// A piece of retrieved medical text attached to a disease code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceSnippet {
    pub code: DiseaseCode,
    pub text: String,
    pub similarity: f64,
}

impl EvidenceSnippet {
    pub fn new(code: impl Into<DiseaseCode>, text: impl Into<String>, similarity: f64) -> Self {
        Self { code: code.into(), text: text.into(), similarity }
    }
}

/// Evidence as reported in the result: a trimmed snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRef {
    pub code: DiseaseCode,
    pub snippet: String,
    pub similarity: f64,
}

/// Everything a prediction or refinement call returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub predictions: Vec<RankedPrediction>,
    pub explanation: String,
    pub evidence: Vec<EvidenceRef>,
    pub dag: DagSnapshot,
    pub used_fallback: bool,
}

impl PipelineResult {
    pub fn top(&self) -> Option<&RankedPrediction> {
        self.predictions.first()
    }

    /// Check that every predicted code and every edge endpoint is a DAG node.
    pub fn validate(&self) -> Result<()> {
        for prediction in &self.predictions {
            if !self.dag.contains_node(prediction.code.as_str()) {
                return Err(Error::UnknownCode(prediction.code.to_string()));
            }
        }
        for edge in self.dag.edges() {
            for code in [&edge.from, &edge.to] {
                if !self.dag.contains_node(code.as_str()) {
                    return Err(Error::UnknownCode(code.to_string()));
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
