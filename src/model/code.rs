//! Disease code: the node identity of the progression graph.

use serde::{Deserialize, Serialize};

/// Opaque disease identifier from the domain vocabulary (e.g. an ICD-10 code).
///
/// Equality, hashing and ordering are by value. The code is never
/// normalised: `"i10"` and `"I10"` are different codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiseaseCode(pub String);

impl DiseaseCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// ICD-style category match: `E11.9` belongs to the `E11` category.
    pub fn in_category(&self, category: &str) -> bool {
        self.0 == category
            || self.0.strip_prefix(category).is_some_and(|rest| rest.starts_with('.'))
    }
}

impl std::fmt::Display for DiseaseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DiseaseCode {
    fn from(v: &str) -> Self { DiseaseCode(v.to_owned()) }
}

impl From<String> for DiseaseCode {
    fn from(v: String) -> Self { DiseaseCode(v) }
}

impl std::borrow::Borrow<str> for DiseaseCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}
