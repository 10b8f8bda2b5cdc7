//! Pipeline configuration.
//!
//! The domain tables the pipeline consults (causal phrases, the fallback
//! map and the disease vocabulary) are data here, not code. `PipelineConfig::default()` carries a small cardio-renal-metabolic
//! seed set; deployments load their own tables with
//! [`PipelineConfig::from_path`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::DiseaseCode;
use crate::{Error, Result};

// ============================================================================
// Scoring
// ============================================================================

/// Weights of the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoreWeights {
    pub transition: f64,
    pub doc_similarity: f64,
    pub clinician: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            transition: 0.6,
            doc_similarity: 0.3,
            clinician: 0.1,
        }
    }
}

// ============================================================================
// Causal phrases
// ============================================================================

/// A connective phrase treated as a causal signal in free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalPhrase {
    /// Lower-case phrase, matched as a substring.
    pub phrase: String,
    /// Passive forms ("caused by") name the effect first.
    #[serde(default)]
    pub reversed: bool,
}

impl CausalPhrase {
    pub fn forward(phrase: &str) -> Self {
        Self { phrase: phrase.to_string(), reversed: false }
    }

    pub fn reversed(phrase: &str) -> Self {
        Self { phrase: phrase.to_string(), reversed: true }
    }
}

fn default_causal_phrases() -> Vec<CausalPhrase> {
    // Longer phrases first: "caused by" must win over "cause".
    vec![
        CausalPhrase::reversed("caused by"),
        CausalPhrase::forward("leads to"),
        CausalPhrase::forward("lead to"),
        CausalPhrase::forward("results in"),
        CausalPhrase::forward("result in"),
        CausalPhrase::forward("progression to"),
        CausalPhrase::forward("progresses to"),
        CausalPhrase::forward("risk factors"),
        CausalPhrase::forward("risk factor"),
        CausalPhrase::forward("associated with"),
        CausalPhrase::forward("association with"),
        CausalPhrase::forward("causes"),
        CausalPhrase::forward("cause"),
    ]
}

// ============================================================================
// Fallback tables
// ============================================================================

/// A typical complication of a seed disease, with a prior probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complication {
    pub code: DiseaseCode,
    pub prob: f64,
}

/// One entry of the knowledge-based fallback map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRule {
    /// Seed code, matched exactly or as an ICD category (`E11` matches `E11.9`).
    pub seed: DiseaseCode,
    pub complications: Vec<Complication>,
}

impl FallbackRule {
    fn new(seed: &str, complications: &[(&str, f64)]) -> Self {
        Self {
            seed: DiseaseCode::from(seed),
            complications: complications
                .iter()
                .map(|(code, prob)| Complication { code: DiseaseCode::from(*code), prob: *prob })
                .collect(),
        }
    }
}

fn default_fallback_map() -> Vec<FallbackRule> {
    vec![
        FallbackRule::new("I21.9", &[("I50.9", 0.5), ("I25.2", 0.3)]),
        FallbackRule::new("I25.10", &[("I21.9", 0.4), ("I50.9", 0.3)]),
        FallbackRule::new("N18.4", &[("N18.5", 0.5), ("I50.9", 0.4), ("D63.1", 0.3)]),
        FallbackRule::new("N18.3", &[("N18.4", 0.5), ("I50.9", 0.3)]),
        FallbackRule::new("I10", &[("N18.3", 0.3), ("I25.10", 0.3), ("I63.9", 0.2)]),
        FallbackRule::new("E11", &[("N18.3", 0.4), ("I25.10", 0.3), ("G63.2", 0.2)]),
    ]
}

/// Vocabulary entry: lets free text refer to a code by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub code: DiseaseCode,
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl VocabularyEntry {
    fn new(code: &str, name: &str, keywords: &[&str]) -> Self {
        Self {
            code: DiseaseCode::from(code),
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Lower-case terms (code, name, keywords) that identify this entry in text.
    pub fn terms(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.code.as_str())
            .chain(std::iter::once(self.name.as_str()))
            .chain(self.keywords.iter().map(String::as_str))
            .filter(|t| !t.trim().is_empty())
            .map(str::to_lowercase)
    }
}

fn default_vocabulary() -> Vec<VocabularyEntry> {
    vec![
        VocabularyEntry::new("I10", "Essential hypertension", &["hypertension"]),
        VocabularyEntry::new("E11", "Type 2 diabetes mellitus", &["type 2 diabetes"]),
        VocabularyEntry::new("I21.9", "Acute myocardial infarction", &["myocardial infarction", "heart attack"]),
        VocabularyEntry::new("I25.10", "Atherosclerotic heart disease", &["coronary artery disease"]),
        VocabularyEntry::new("I25.2", "Old myocardial infarction", &[]),
        VocabularyEntry::new("I50.9", "Heart failure", &["heart failure"]),
        VocabularyEntry::new("I63.9", "Cerebral infarction", &["stroke"]),
        VocabularyEntry::new("N18.3", "Chronic kidney disease, stage 3", &["ckd stage 3"]),
        VocabularyEntry::new("N18.4", "Chronic kidney disease, stage 4", &["ckd stage 4"]),
        VocabularyEntry::new("N18.5", "Chronic kidney disease, stage 5", &["ckd stage 5", "end-stage renal"]),
        VocabularyEntry::new("D63.1", "Anemia in chronic kidney disease", &["renal anemia"]),
        VocabularyEntry::new("G63.2", "Diabetic polyneuropathy", &["diabetic neuropathy"]),
    ]
}

// ============================================================================
// Cycle policy
// ============================================================================

/// Whether graph mutations may close a directed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CyclePolicy {
    /// Cycle-closing clinician edits fail with `InvalidClinicianEdit`;
    /// cycle-closing causal-phrase edges are skipped.
    #[default]
    Reject,
    /// The graph is treated as merely directed.
    Allow,
}

// ============================================================================
// PipelineConfig
// ============================================================================

/// All tunables and domain tables of the prediction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Minimum transition probability for a candidate.
    pub epsilon: f64,
    pub weights: ScoreWeights,
    /// Boost given to candidates a clinician comment refers to.
    pub clinician_boost: f64,
    /// Weight of edges created or strengthened by causal phrases.
    pub causal_edge_weight: f64,
    /// Weight of clinician-added edges.
    pub clinician_edge_weight: f64,
    /// Fit score given to pairs with no co-occurrence signal.
    pub fit_floor: f64,
    pub causal_phrases: Vec<CausalPhrase>,
    pub fallback_map: Vec<FallbackRule>,
    /// Placeholder candidate when nothing else applies.
    pub generic_complication: DiseaseCode,
    pub vocabulary: Vec<VocabularyEntry>,
    pub cycle_policy: CyclePolicy,
    pub max_predictions: usize,
    pub max_evidence: usize,
    pub snippet_chars: usize,
    pub explanation_chars: usize,
    /// Upper bound on a generative call, in milliseconds.
    pub generative_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            weights: ScoreWeights::default(),
            clinician_boost: 0.2,
            causal_edge_weight: 0.9,
            clinician_edge_weight: 0.8,
            fit_floor: -10.0,
            causal_phrases: default_causal_phrases(),
            fallback_map: default_fallback_map(),
            generic_complication: DiseaseCode::from("CHRONIC_COMPLICATION"),
            vocabulary: default_vocabulary(),
            cycle_policy: CyclePolicy::Reject,
            max_predictions: 10,
            max_evidence: 5,
            snippet_chars: 150,
            explanation_chars: 800,
            generative_timeout_ms: 30_000,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject settings that would break the score range or the fallback chain.
    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.epsilon) {
            return Err(Error::ConfigError(format!("epsilon {} not in [0, 1]", self.epsilon)));
        }
        let w = self.weights;
        if [w.transition, w.doc_similarity, w.clinician].iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::ConfigError("score weights must be finite and non-negative".into()));
        }
        for (name, value) in [
            ("clinicianBoost", self.clinician_boost),
            ("causalEdgeWeight", self.causal_edge_weight),
            ("clinicianEdgeWeight", self.clinician_edge_weight),
        ] {
            if !unit.contains(&value) {
                return Err(Error::ConfigError(format!("{name} {value} not in [0, 1]")));
            }
        }
        if !self.fit_floor.is_finite() || self.fit_floor > 0.0 {
            return Err(Error::ConfigError(format!("fitFloor {} must be finite and <= 0", self.fit_floor)));
        }
        if self.generic_complication.is_empty() {
            return Err(Error::ConfigError("genericComplication must be a non-empty code".into()));
        }
        if self.causal_phrases.iter().any(|p| p.phrase.trim().is_empty()) {
            return Err(Error::ConfigError("causal phrases must be non-empty".into()));
        }
        if self.max_predictions == 0 {
            return Err(Error::ConfigError("maxPredictions must be at least 1".into()));
        }
        Ok(())
    }

    pub fn generative_timeout(&self) -> Duration {
        Duration::from_millis(self.generative_timeout_ms)
    }

    pub fn vocabulary_entry(&self, code: &str) -> Option<&VocabularyEntry> {
        self.vocabulary.iter().find(|v| v.code.as_str() == code)
    }

    /// Codes a clinician may reference even when absent from the graph.
    pub fn is_known_code(&self, code: &str) -> bool {
        self.vocabulary_entry(code).is_some()
            || self.generic_complication.as_str() == code
            || self.fallback_map.iter().any(|rule| {
                rule.seed.as_str() == code || rule.complications.iter().any(|c| c.code.as_str() == code)
            })
    }
}
