//! Prompt for the generative explanation pass.

use crate::model::{DagSnapshot, EvidenceSnippet, RankedPrediction};

/// Builder for strict-JSON explanation prompts.
#[derive(Debug, Clone)]
pub struct ExplanationPromptBuilder {
    /// Maximum characters per evidence snippet.
    max_content_length: usize,
    /// Candidates listed in the prompt.
    max_candidates: usize,
    /// Evidence snippets listed in the prompt.
    max_evidence: usize,
}

impl Default for ExplanationPromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplanationPromptBuilder {
    pub fn new() -> Self {
        Self {
            max_content_length: 100,
            max_candidates: 5,
            max_evidence: 3,
        }
    }

    pub fn with_max_content_length(mut self, length: usize) -> Self {
        self.max_content_length = length;
        self
    }

    pub fn build(
        &self,
        patient_summary: &str,
        ranked: &[RankedPrediction],
        dag: &DagSnapshot,
        evidence: &[EvidenceSnippet],
        clinician_comment: Option<&str>,
    ) -> String {
        let candidates = ranked
            .iter()
            .take(self.max_candidates)
            .map(|p| format!("{} ({:.2})", p.code, p.score))
            .collect::<Vec<_>>()
            .join(", ");

        let graph = dag
            .edges()
            .iter()
            .filter(|e| ranked.iter().take(self.max_candidates).any(|p| p.code == e.to))
            .map(|e| format!("{} -> {} ({:.2})", e.from, e.to, e.weight))
            .collect::<Vec<_>>()
            .join("; ");

        let evidence = evidence
            .iter()
            .take(self.max_evidence)
            .map(|s| format!("{}: {}", s.code, self.truncate_content(&s.text)))
            .collect::<Vec<_>>()
            .join(" ");

        let mut prompt = format!(
            r#"You are a medical AI assistant.

CRITICAL: Respond with STRICT JSON ONLY. No extra text before or after JSON.

Patient: {patient_summary}
Candidate diseases: {candidates}
Progression graph: {graph}
Medical evidence: {evidence}"#
        );

        if let Some(comment) = clinician_comment.filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!("\nClinician note: {}", comment.trim()));
        }

        prompt.push_str(Self::output_contract());
        prompt
    }

    fn truncate_content(&self, content: &str) -> String {
        match content.char_indices().nth(self.max_content_length) {
            None => content.to_string(),
            Some((cut, _)) => {
                let truncated = &content[..cut];
                match truncated.rfind(' ') {
                    Some(last_space) => format!("{}...", &truncated[..last_space]),
                    None => format!("{truncated}..."),
                }
            }
        }
    }

    const fn output_contract() -> &'static str {
        r#"

Output ONLY this JSON structure (no other text):
{
  "predictions": [
    {"code": "DISEASE_CODE", "score": 0.XX, "rank": 1}
  ],
  "explanation": "Brief clinical reasoning in 1-2 sentences",
  "evidence": [
    {"code": "CODE", "snippet": "relevant text"}
  ]
}

IMPORTANT:
- Use double quotes for all strings
- No trailing commas
- Only use codes from the candidate list
- Keep explanation under 200 characters

JSON:"#
    }
}
