//! Patient diagnosis history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DiseaseCode;

/// One recorded diagnosis. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub code: DiseaseCode,
    pub visit_timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(code: impl Into<DiseaseCode>, visit_timestamp: DateTime<Utc>) -> Self {
        Self { code: code.into(), visit_timestamp }
    }
}

/// A patient's diagnoses ordered by visit timestamp.
///
/// Sorting is stable: entries sharing a timestamp keep their input order,
/// so the last of them is the "current state".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<HistoryEntry>", into = "Vec<HistoryEntry>")]
pub struct PatientHistory {
    entries: Vec<HistoryEntry>,
}

impl PatientHistory {
    pub fn new(mut entries: Vec<HistoryEntry>) -> Self {
        entries.sort_by_key(|e| e.visit_timestamp);
        Self { entries }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent diagnosis code.
    pub fn current_state(&self) -> Option<&DiseaseCode> {
        self.entries.last().map(|e| &e.code)
    }

    /// All codes recorded at the most recent visit timestamp.
    pub fn latest_visit_codes(&self) -> Vec<&DiseaseCode> {
        let Some(last) = self.entries.last() else {
            return Vec::new();
        };
        let mut codes: Vec<&DiseaseCode> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.visit_timestamp == last.visit_timestamp) {
            if !codes.contains(&&entry.code) {
                codes.push(&entry.code);
            }
        }
        codes
    }

    /// Distinct codes in first-seen order.
    pub fn codes(&self) -> Vec<&DiseaseCode> {
        let mut seen = hashbrown::HashSet::new();
        self.entries
            .iter()
            .map(|e| &e.code)
            .filter(|c| seen.insert(*c))
            .collect()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.iter().any(|e| e.code.as_str() == code)
    }

    /// Short prose summary over the last three diagnoses.
    pub fn summary(&self) -> String {
        let start = self.entries.len().saturating_sub(3);
        let recent: Vec<&str> = self.entries[start..].iter().map(|e| e.code.as_str()).collect();
        if recent.is_empty() {
            "Patient with no recorded history".to_string()
        } else {
            format!("Patient with history of {}", recent.join(", "))
        }
    }
}

impl From<Vec<HistoryEntry>> for PatientHistory {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        Self::new(entries)
    }
}

impl From<PatientHistory> for Vec<HistoryEntry> {
    fn from(history: PatientHistory) -> Self {
        history.entries
    }
}
