//! Domain data structures for providers, address suggestions, and bin schedules.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ports::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Built-in upstream providers.
pub enum Providers {
    /// Maitland City Council, general waste.
    Maitland,
    /// Hunter Resource Recovery, recycling.
    Hrr,
    /// Solo Resource Recovery, food and garden organics.
    Solo,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Identifier for an upstream provider known to binnight.
pub struct ProviderId(pub String);

impl fmt::Display for Providers {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            Providers::Maitland => "maitland",
            Providers::Hrr => "hrr",
            Providers::Solo => "solo",
        };
        write!(formatter, "{slug}")
    }
}

impl From<Providers> for ProviderId {
    fn from(provider: Providers) -> Self {
        ProviderId(provider.to_string())
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Kerbside bin colours, one per waste stream.
pub enum BinKind {
    /// General waste.
    Red,
    /// Recycling.
    Yellow,
    /// Food and garden organics.
    Green,
}

impl fmt::Display for BinKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BinKind::Red => "red",
            BinKind::Yellow => "yellow",
            BinKind::Green => "green",
        };
        formatter.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How a provider takes part in a unified request.
pub enum ProviderKind {
    /// Performs network calls, contributes suggestions, needs its own address id.
    Live,
    /// Serves fixed content without I/O and is never searched.
    StaticFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Metadata describing a provider.
pub struct ProviderMeta {
    /// Unique identifier.
    pub id: ProviderId,
    /// Human-friendly provider name.
    pub name: String,
    /// Bin this provider reports on.
    pub bin_kind: BinKind,
    /// Merge priority; lower values win display-text conflicts.
    pub priority: u8,
    /// Live or static fallback.
    pub kind: ProviderKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Opaque provider-specific identifier for an address.
pub struct ProviderAddressId(pub String);

impl fmt::Display for ProviderAddressId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Free-text address submitted by a caller together with its normalized form.
///
/// Built through [`crate::Normalizer::parse_query`].
pub struct Query {
    /// Text exactly as the caller typed it, trimmed.
    pub raw: String,
    /// Normalized text used for cache and merge keys.
    pub normalized: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Single unmerged suggestion as returned by one provider.
pub struct RawSuggestion {
    /// Provider that produced the suggestion.
    pub provider: ProviderId,
    /// Identifier the provider expects when fetching a schedule.
    pub address_id: ProviderAddressId,
    /// Address text as formatted by the provider.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Address suggestion merged across providers.
pub struct AddressSuggestion {
    /// Display text taken from the highest-priority contributing provider.
    pub display_text: String,
    /// Normalized form shared by every contributing suggestion.
    pub normalized: String,
    /// Identifier per provider that recognised this address.
    pub source_ids: BTreeMap<ProviderId, ProviderAddressId>,
    /// Priority of the provider whose display text won.
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Collection schedule for a single bin as reported by one provider.
pub struct BinSchedule {
    /// Provider the schedule came from.
    pub provider_id: ProviderId,
    /// Bin the schedule applies to.
    pub bin_kind: BinKind,
    /// Human-readable service name, e.g. "Yellow Recycling Bin".
    pub service_type: String,
    /// Next known collection, if the provider publishes dates.
    pub next_collection_date: Option<NaiveDate>,
    /// All upcoming dates the provider returned, in provider order.
    pub upcoming: Vec<NaiveDate>,
    /// Standing instructions for the bin.
    pub instructions: Vec<String>,
    /// Optional provider note.
    pub note: Option<String>,
    /// Provider payload the schedule was parsed from.
    pub raw_payload: serde_json::Value,
}

impl BinSchedule {
    /// Next collection date formatted like "Wednesday August 20, 2025".
    #[must_use]
    pub fn display_date(&self) -> Option<String> {
        self.next_collection_date
            .map(|date| date.format("%A %B %d, %Y").to_string())
    }
}

/// Parse a provider date given as `YYYY-MM-DD` or as an ISO 8601 timestamp.
///
/// Timestamps keep the calendar date as written, without converting zones.
#[must_use]
pub fn parse_collection_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|stamp| stamp.date())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Terminal state of a unified request that produced data.
pub enum Outcome {
    /// Every queried provider returned usable data.
    FullSuccess,
    /// At least one provider failed; its error is listed.
    PartialSuccess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Unified schedule spanning every bin kind for one address.
pub struct UnifiedResult {
    /// Display text of the selected address.
    pub address: String,
    /// Schedules by bin, present only for providers that succeeded.
    pub schedules: BTreeMap<BinKind, BinSchedule>,
    /// Failed providers in priority order.
    pub errors: Vec<ProviderError>,
    /// Whether any provider failed.
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Merged suggestions for one query plus the live providers that failed.
pub struct SuggestionResult {
    /// Query the suggestions answer.
    pub query: Query,
    /// Deduplicated suggestions, ordered by first appearance.
    pub suggestions: Vec<AddressSuggestion>,
    /// Failed providers in priority order.
    pub errors: Vec<ProviderError>,
}
