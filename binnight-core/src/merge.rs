//! Deduplication of address suggestions coming from several providers.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::model::{AddressSuggestion, RawSuggestion};
use crate::normalize::Normalizer;

/// Suggestions from one provider together with that provider's merge priority.
#[derive(Debug, Clone)]
pub struct SuggestionBatch {
    /// Merge priority of the producing provider; lower wins.
    pub priority: u8,
    /// Raw suggestions in provider order.
    pub suggestions: Vec<RawSuggestion>,
}

/// Groups raw suggestions by normalized text.
#[derive(Debug, Clone, Default)]
pub struct AddressMerger {
    normalizer: Normalizer,
}

impl AddressMerger {
    /// Create a merger using the given normalization rules.
    #[must_use]
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    /// Normalizer used for grouping.
    #[must_use]
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Merge batches into one list ordered by first appearance.
    ///
    /// Batches are visited in the order given, so callers pass them in a
    /// deterministic order (the registry's priority order). The display text
    /// of a group comes from its lowest-priority-value contributor; ties keep
    /// the first seen. When one provider returns several entries that normalize
    /// identically, the first id is kept for that provider. Text that
    /// normalizes to nothing is grouped under its trimmed raw form; only
    /// blank text is skipped.
    #[must_use]
    pub fn merge<I>(&self, batches: I) -> Vec<AddressSuggestion>
    where
        I: IntoIterator<Item = SuggestionBatch>,
    {
        let mut merged: Vec<AddressSuggestion> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for batch in batches {
            for raw in batch.suggestions {
                let mut normalized = self.normalizer.normalize(&raw.text);
                if normalized.is_empty() {
                    normalized = raw.text.trim().to_owned();
                }
                if normalized.is_empty() {
                    debug!(provider = %raw.provider, address_id = %raw.address_id, "skipping blank suggestion");
                    continue;
                }

                if let Some(entry) = positions
                    .get(&normalized)
                    .and_then(|&index| merged.get_mut(index))
                {
                    entry
                        .source_ids
                        .entry(raw.provider)
                        .or_insert(raw.address_id);
                    if batch.priority < entry.priority {
                        entry.display_text = raw.text;
                        entry.priority = batch.priority;
                    }
                    continue;
                }

                positions.insert(normalized.clone(), merged.len());
                merged.push(AddressSuggestion {
                    display_text: raw.text,
                    normalized,
                    source_ids: BTreeMap::from([(raw.provider, raw.address_id)]),
                    priority: batch.priority,
                });
            }
        }

        merged
    }
}
