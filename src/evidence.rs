//! Knowledge retrieval: turns an indexed document collection into evidence
//! snippets for the current patient.
//!
//! Retrieval is best effort. An embedder failure yields no evidence, never
//! a pipeline error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{CandidateSet, DiseaseCode, EvidenceSnippet, PatientHistory};
use crate::ranking::score::unit;
use crate::Result;

/// Maximum characters of an extractive summary.
const SUMMARY_CHARS: usize = 200;

/// A text-embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A medical text about one disease, with its precomputed embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub code: DiseaseCode,
    pub text: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl KnowledgeDocument {
    pub fn new(code: impl Into<DiseaseCode>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self { code: code.into(), text: text.into(), embedding }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeRetriever {
    documents: Vec<KnowledgeDocument>,
}

impl KnowledgeRetriever {
    pub fn new(documents: Vec<KnowledgeDocument>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Embed and index a document.
    pub async fn index(&mut self, embedder: &dyn Embedder, code: impl Into<DiseaseCode>, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        let embedding = embedder.embed(&text).await?;
        self.documents.push(KnowledgeDocument::new(code, text, embedding));
        Ok(())
    }

    /// Retrieval query from the last three history codes and the top five
    /// candidates.
    pub fn generate_query(history: &PatientHistory, candidates: &CandidateSet) -> String {
        let entries = history.entries();
        let recent: Vec<&str> = entries[entries.len().saturating_sub(3)..].iter().map(|e| e.code.as_str()).collect();
        let top: Vec<&str> = candidates.codes().take(5).map(|c| c.as_str()).collect();
        format!("patient history {} risk factors progression {}", recent.join(" "), top.join(" "))
    }

    /// Top-k documents by cosine similarity to the query, as snippets.
    pub async fn retrieve(&self, embedder: &dyn Embedder, query: &str, top_k: usize) -> Vec<EvidenceSnippet> {
        if self.documents.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let query_vec = match embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, continuing without evidence");
                return Vec::new();
            }
        };

        let mut scored: Vec<(&KnowledgeDocument, f64)> = self
            .documents
            .iter()
            .map(|doc| (doc, cosine_similarity(&query_vec, &doc.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.code.cmp(&b.0.code)));
        scored.truncate(top_k);

        debug!(documents = self.documents.len(), returned = scored.len(), "evidence retrieved");
        scored
            .into_iter()
            .map(|(doc, similarity)| EvidenceSnippet::new(doc.code.clone(), extractive_summary(&doc.text), similarity))
            .collect()
    }
}

/// Cosine similarity clamped to `[0, 1]`. Mismatched or empty vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON || !denom.is_finite() {
        0.0
    } else {
        unit(dot / denom)
    }
}

/// First 200 characters, cut back to the last sentence end if there is one,
/// otherwise marked with `...`.
pub fn extractive_summary(text: &str) -> String {
    let text = text.trim();
    let Some((cut, _)) = text.char_indices().nth(SUMMARY_CHARS) else {
        return text.to_string();
    };
    let head = &text[..cut];
    match head.rfind(['.', '!', '?']) {
        Some(end) => head[..=end].to_string(),
        None => format!("{}...", head.trim_end()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, CandidateSource, HistoryEntry};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    /// Toy embedder: one dimension per keyword.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let text = text.to_lowercase();
            Ok(["kidney", "heart", "diabetes"]
                .iter()
                .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
                .collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl Embedder for Broken {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(crate::Error::GenerativeSource("offline".into()))
        }
    }

    #[test]
    fn test_generate_query() {
        let t = |h: i64| Utc.timestamp_opt(1_700_000_000 + h * 3_600, 0).unwrap();
        let history = PatientHistory::new(
            ["A", "B", "C", "D"].iter().enumerate().map(|(i, c)| HistoryEntry::new(*c, t(i as i64))).collect(),
        );
        let candidates = CandidateSet {
            candidates: ["E", "F", "G", "H", "I", "J"].iter().map(|c| Candidate::new(*c)).collect(),
            source: CandidateSource::Transitions,
        };
        assert_eq!(
            KnowledgeRetriever::generate_query(&history, &candidates),
            "patient history B C D risk factors progression E F G H I"
        );
    }

    #[test]
    fn test_cosine_clamped() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_extractive_summary() {
        assert_eq!(extractive_summary("Short text."), "Short text.");
        let long = format!("First sentence. {}", "x".repeat(300));
        assert_eq!(extractive_summary(&long), "First sentence.");
        let no_stop = "y".repeat(300);
        assert_eq!(extractive_summary(&no_stop), format!("{}...", "y".repeat(200)));
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_similarity() {
        let mut retriever = KnowledgeRetriever::default();
        retriever.index(&KeywordEmbedder, "N18.3", "Kidney decline.").await.unwrap();
        retriever.index(&KeywordEmbedder, "I50.9", "Heart failure and kidney disease.").await.unwrap();
        retriever.index(&KeywordEmbedder, "E11", "Diabetes care.").await.unwrap();

        let hits = retriever.retrieve(&KeywordEmbedder, "heart kidney", 2).await;
        let codes: Vec<&str> = hits.iter().map(|h| h.code.as_str()).collect();
        assert_eq!(codes, vec!["I50.9", "N18.3"]);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn test_embedder_failure_yields_no_evidence() {
        let retriever = KnowledgeRetriever::new(vec![KnowledgeDocument::new("A", "text", vec![1.0])]);
        assert!(retriever.retrieve(&Broken, "q", 5).await.is_empty());
    }
}
