//! Term matching over lower-cased text.
//!
//! A term matches where it starts a word and is not followed by a digit.
//! It may run on into letters, so `heart failure` matches "heart failures"
//! and `ckd stage 3` matches "ckd stage 3a", while `i10` does not match
//! inside "i100" and `cause` does not match inside "because". Causal
//! phrases, code mentions and the clinician boost all use this rule.

use crate::config::{CausalPhrase, VocabularyEntry};

/// Byte offset of the first occurrence of `term` in `haystack` that starts
/// a word and is not followed by a digit. Both must already be lower-cased.
pub(crate) fn find_term(haystack: &str, term: &str) -> Option<usize> {
    if term.is_empty() {
        return None;
    }
    haystack.match_indices(term).map(|(idx, _)| idx).find(|&idx| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + term.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(|c| c.is_ascii_digit())
    })
}

/// First configured phrase present in the text, with its offset.
pub(crate) fn first_phrase<'p>(text: &str, phrases: &'p [CausalPhrase]) -> Option<(&'p CausalPhrase, usize)> {
    phrases
        .iter()
        .find_map(|p| find_term(text, &p.phrase.to_lowercase()).map(|idx| (p, idx)))
}

/// Earliest mention of a code in the text: the code itself, or its
/// vocabulary name or keywords.
pub(crate) fn find_code(text: &str, code: &str, vocabulary: Option<&VocabularyEntry>) -> Option<usize> {
    let direct = find_term(text, &code.to_lowercase());
    let named = vocabulary.and_then(|entry| entry.terms().filter_map(|t| find_term(text, &t)).min());
    match (direct, named) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
