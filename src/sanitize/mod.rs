//! # Output Sanitizer
//!
//! Turns raw generative text into a JSON value, or reports it malformed.
//!
//! Stages, each tried only if the previous one failed:
//!
//! | Stage | What it tries |
//! |-------|---------------|
//! | `Direct` | parse the trimmed text |
//! | `Unwrapped` | strip code fences, labels and chat tokens, re-parse |
//! | `Balanced` | parse the first balanced `{…}` / `[…]` block |
//! | `Repaired` | fix quotes, control chars, trailing commas, stray closers |
//!
//! Only objects and arrays count as structured. The sanitizer is a pure
//! function: it never panics and the same input always yields the same
//! result.

mod repair;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{Error, Result};

/// Which stage produced the structured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionStage {
    Direct,
    Unwrapped,
    Balanced,
    Repaired,
}

/// Outcome of sanitizing one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Structured(Value, ExtractionStage),
    /// No stage recovered an object or array.
    Malformed,
}

impl Extraction {
    pub fn is_structured(&self) -> bool {
        matches!(self, Extraction::Structured(..))
    }

    pub fn stage(&self) -> Option<ExtractionStage> {
        match self {
            Extraction::Structured(_, stage) => Some(*stage),
            Extraction::Malformed => None,
        }
    }

    /// The value, or `MalformedGenerativeOutput` with a preview of the input.
    pub fn into_value(self, raw: &str) -> Result<Value> {
        match self {
            Extraction::Structured(value, _) => Ok(value),
            Extraction::Malformed => Err(Error::MalformedGenerativeOutput(preview(raw))),
        }
    }
}

/// Longest completion the sanitizer looks at. Longer text is malformed.
pub const MAX_INPUT_BYTES: usize = 256 * 1024;

/// Balanced blocks tried per stage before giving up.
const MAX_SPANS: usize = 64;

pub struct OutputSanitizer;

impl OutputSanitizer {
    /// First object or array the stages recover.
    pub fn extract(raw: &str) -> Extraction {
        Self::extract_with(raw, |_| true)
    }

    /// First object or array the stages recover that `accept` also takes.
    /// A value the predicate rejects does not end the search: the balanced
    /// stages move on to the next block.
    pub fn extract_with(raw: &str, accept: impl Fn(&Value) -> bool) -> Extraction {
        if raw.len() > MAX_INPUT_BYTES {
            debug!(len = raw.len(), max = MAX_INPUT_BYTES, "generative output too long");
            return Extraction::Malformed;
        }
        let extraction = Self::run_stages(raw, &accept);
        match extraction.stage() {
            Some(stage) => debug!(?stage, "generative output parsed"),
            None => debug!(len = raw.len(), "generative output malformed"),
        }
        extraction
    }

    fn run_stages(raw: &str, accept: &dyn Fn(&Value) -> bool) -> Extraction {
        let parse = |text: &str| parse_structured(text).filter(|v| accept(v));

        if let Some(value) = parse(raw.trim()) {
            return Extraction::Structured(value, ExtractionStage::Direct);
        }

        let unwrapped = repair::strip_wrappers(raw);
        if let Some(value) = parse(&unwrapped) {
            return Extraction::Structured(value, ExtractionStage::Unwrapped);
        }

        if let Some(value) = first_balanced(&unwrapped, &parse) {
            return Extraction::Structured(value, ExtractionStage::Balanced);
        }

        let cleaned = repair::drop_trailing_commas(&repair::promote_single_quotes(&repair::strip_control(
            &repair::normalize_quotes(&unwrapped),
        )));
        let truncated = repair::truncate_unmatched(&cleaned);
        if let Some(value) = parse(truncated).or_else(|| first_balanced(&cleaned, &parse)) {
            return Extraction::Structured(value, ExtractionStage::Repaired);
        }

        Extraction::Malformed
    }
}

fn parse_structured(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

fn first_balanced(text: &str, parse: &dyn Fn(&str) -> Option<Value>) -> Option<Value> {
    repair::balanced_spans(text).into_iter().take(MAX_SPANS).find_map(parse)
}

fn preview(raw: &str) -> String {
    const MAX: usize = 120;
    match raw.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}
