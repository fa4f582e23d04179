//! Address text normalization used for cache keys and suggestion merging.
//!
//! Matching on normalized text is a best-effort heuristic. Two distinct
//! addresses can normalize to the same string, and formatting variants the
//! rules do not anticipate (unit prefixes such as "2/14" vs "unit 2 14") will
//! not merge. Rules are data, so deployments can extend them.

use crate::model::Query;
use crate::service::AggregateError;

/// Longest raw query accepted, in characters.
pub const MAX_QUERY_CHARS: usize = 200;
/// Shortest normalized query accepted, in characters.
pub const MIN_QUERY_CHARS: usize = 3;

const DEFAULT_RULES: &[(&str, &str)] = &[
    ("street", "st"),
    ("avenue", "ave"),
    ("road", "rd"),
    ("drive", "dr"),
    ("place", "pl"),
    ("court", "ct"),
    ("crescent", "cres"),
    ("parade", "pde"),
    ("lane", "ln"),
    ("close", "cl"),
    ("terrace", "tce"),
    ("highway", "hwy"),
    ("boulevard", "blvd"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
/// Whole-word rewrite applied after lower-casing.
pub struct NormalizationRule {
    /// Word to replace.
    pub word: String,
    /// Canonical replacement.
    pub canonical: String,
}

#[derive(Debug, Clone)]
/// Pure text normalizer with an ordered list of word rules.
pub struct Normalizer {
    rules: Vec<NormalizationRule>,
}

impl Default for Normalizer {
    fn default() -> Self {
        let mut normalizer = Self::empty();
        for (word, canonical) in DEFAULT_RULES {
            normalizer = normalizer.with_rule(*word, *canonical);
        }
        normalizer
    }
}

impl Normalizer {
    /// Normalizer without any word rules.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a whole-word rule. A later rule for the same word replaces the earlier one.
    ///
    /// An empty canonical form removes the word entirely.
    #[must_use]
    pub fn with_rule<W: Into<String>, C: Into<String>>(mut self, word: W, canonical: C) -> Self {
        let word = word.into().to_lowercase();
        let canonical = canonical.into().to_lowercase();
        self.rules.retain(|rule| rule.word != word);
        self.rules.push(NormalizationRule { word, canonical });
        self
    }

    /// Configured rules in insertion order.
    #[must_use]
    pub fn rules(&self) -> &[NormalizationRule] {
        &self.rules
    }

    /// Normalize free text: lower-case, drop apostrophes, turn other
    /// punctuation into spaces, collapse whitespace, and apply word rules.
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        let cleaned: String = text
            .chars()
            .filter(|ch| !matches!(ch, '\'' | '\u{2019}'))
            .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
            .collect::<String>()
            .to_lowercase();

        cleaned
            .split_whitespace()
            .map(|word| self.canonical(word))
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Validate and normalize caller input.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::InvalidQuery`] when the trimmed text is longer
    /// than [`MAX_QUERY_CHARS`] or normalizes to fewer than [`MIN_QUERY_CHARS`].
    pub fn parse_query(&self, raw: &str) -> Result<Query, AggregateError> {
        let trimmed = raw.trim();
        if trimmed.chars().count() > MAX_QUERY_CHARS {
            return Err(AggregateError::InvalidQuery(format!(
                "address must be at most {MAX_QUERY_CHARS} characters"
            )));
        }

        let normalized = self.normalize(trimmed);
        if normalized.chars().count() < MIN_QUERY_CHARS {
            return Err(AggregateError::InvalidQuery(format!(
                "address must be at least {MIN_QUERY_CHARS} characters"
            )));
        }

        Ok(Query {
            raw: trimmed.to_owned(),
            normalized,
        })
    }

    fn canonical<'word>(&'word self, word: &'word str) -> &'word str {
        self.rules
            .iter()
            .find(|rule| rule.word == word)
            .map_or(word, |rule| rule.canonical.as_str())
    }
}
