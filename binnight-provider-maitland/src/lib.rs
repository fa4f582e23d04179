//! Provider implementation for Maitland City Council using the `WasteTrack` API.
//!
//! Maitland publishes the red general waste bin. Addresses are looked up by
//! free text and schedules by the numeric property id the search returns.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use binnight_core::{
    config::ProviderSettings,
    model::{
        BinKind, BinSchedule, ProviderAddressId, ProviderId, ProviderKind, ProviderMeta,
        Providers, Query, RawSuggestion, parse_collection_date,
    },
    plugin::ProviderPlugin,
    ports::{AddressPort, ProviderError, SchedulePort},
};

/// Production `WasteTrack` endpoint.
pub const DEFAULT_BASE_URL: &str = "https://integration.maitland.nsw.gov.au/api/wastetrack";

const SERVICE_TYPE: &str = "Red General Waste Bin";

/// Connection settings for the Maitland API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaitlandConfig {
    /// API base URL without the endpoint path.
    pub base_url: String,
}

impl Default for MaitlandConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }
}

impl MaitlandConfig {
    /// Apply overrides from the application settings.
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        settings
            .maitland_base_url
            .as_ref()
            .map_or_else(Self::default, |base_url| Self {
                base_url: base_url.clone(),
            })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Property ids arrive as numbers or strings depending on the record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Identifier {
    Number(u64),
    Text(String),
}

impl Identifier {
    fn into_text(self) -> String {
        match self {
            Identifier::Number(number) => number.to_string(),
            Identifier::Text(text) => text.trim().to_owned(),
        }
    }
}

/// Single match from /search-bin
#[derive(Debug, Deserialize)]
struct PropertyEntry {
    #[serde(default)]
    property_id: Option<Identifier>,
    #[serde(default)]
    full_address: Option<String>,
}

/// /bin-collection answers with a list or, for some properties, a bare object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CollectionPayload {
    Many(Vec<CollectionEntry>),
    One(CollectionEntry),
}

impl CollectionPayload {
    fn into_entries(self) -> Vec<CollectionEntry> {
        match self {
            CollectionPayload::Many(entries) => entries,
            CollectionPayload::One(entry) => vec![entry],
        }
    }
}

#[derive(Debug, Deserialize)]
struct CollectionEntry {
    #[serde(
        default,
        alias = "collectionDate",
        alias = "next_collection",
        alias = "date"
    )]
    collection_date: Option<String>,
}

/// Address search implementation for Maitland.
pub struct MaitlandAddressPort {
    client: Client,
    config: MaitlandConfig,
    meta: ProviderMeta,
}

impl MaitlandAddressPort {
    /// Create a new address port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, config: MaitlandConfig) -> Self {
        Self {
            client,
            config,
            meta: provider_meta(),
        }
    }
}

#[async_trait]
impl AddressPort for MaitlandAddressPort {
    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn search(&self, query: &Query) -> Result<Vec<RawSuggestion>, ProviderError> {
        // The upstream query breaks on bare single quotes.
        let address_text = query.raw.trim().replace('\'', "''");

        let req = self
            .client
            .get(self.config.endpoint("search-bin"))
            .query(&[("addressText", address_text.as_str())]);

        debug!(provider = %self.meta.id, query = %query.normalized, "searching Maitland properties");
        let entries = fetch_json::<Vec<PropertyEntry>>(&self.meta.id, req).await?;

        let suggestions = entries
            .into_iter()
            .filter_map(|entry| {
                let property_id = entry.property_id?.into_text();
                let full_address = entry.full_address?.trim().to_owned();
                if property_id.is_empty() || full_address.is_empty() {
                    return None;
                }
                Some(RawSuggestion {
                    provider: self.meta.id.clone(),
                    address_id: ProviderAddressId(property_id),
                    text: full_address,
                })
            })
            .collect();

        Ok(suggestions)
    }
}

/// Collection schedule implementation for Maitland.
pub struct MaitlandSchedulePort {
    client: Client,
    config: MaitlandConfig,
    meta: ProviderMeta,
}

impl MaitlandSchedulePort {
    /// Create a new schedule port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, config: MaitlandConfig) -> Self {
        Self {
            client,
            config,
            meta: provider_meta(),
        }
    }
}

#[async_trait]
impl SchedulePort for MaitlandSchedulePort {
    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn schedule(&self, address_id: &ProviderAddressId) -> Result<BinSchedule, ProviderError> {
        let property_id = address_id.0.trim();
        if property_id.is_empty() || !property_id.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(ProviderError::bad_response(
                self.meta.id.clone(),
                format!("property id must be numeric, got {property_id:?}"),
            ));
        }

        let req = self
            .client
            .get(self.config.endpoint("bin-collection"))
            .query(&[("propertyId", property_id)]);

        debug!(provider = %self.meta.id, property_id, "fetching Maitland collection");
        let payload = fetch_json::<serde_json::Value>(&self.meta.id, req).await?;
        let entries = CollectionPayload::deserialize(&payload)
            .map_err(|err| ProviderError::from_json(self.meta.id.clone(), &err))?
            .into_entries();

        let mut dates: Vec<_> = entries
            .into_iter()
            .filter_map(|entry| entry.collection_date)
            .filter_map(|raw| parse_collection_date(&raw))
            .collect();
        dates.sort_unstable();
        dates.dedup();

        let Some(next) = dates.first().copied() else {
            return Err(ProviderError::bad_response(
                self.meta.id.clone(),
                "response contained no collection dates",
            ));
        };

        Ok(BinSchedule {
            provider_id: self.meta.id.clone(),
            bin_kind: self.meta.bin_kind,
            service_type: SERVICE_TYPE.to_owned(),
            next_collection_date: Some(next),
            upcoming: dates,
            instructions: Vec::new(),
            note: None,
            raw_payload: payload,
        })
    }
}

/// Build the plugin bundle for the Maitland provider.
#[must_use]
pub fn plugin(client: Client, config: MaitlandConfig) -> ProviderPlugin {
    let address_port = Arc::new(MaitlandAddressPort::new(client.clone(), config.clone()));
    let schedule_port = Arc::new(MaitlandSchedulePort::new(client, config));

    ProviderPlugin {
        meta: provider_meta(),
        address_port,
        schedule_port,
    }
}

/// Static metadata for Maitland.
#[must_use]
pub fn provider_meta() -> ProviderMeta {
    ProviderMeta {
        id: ProviderId::from(Providers::Maitland),
        name: String::from("Maitland City Council"),
        bin_kind: BinKind::Red,
        priority: 1,
        kind: ProviderKind::Live,
    }
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(
    provider: &ProviderId,
    req: RequestBuilder,
) -> Result<T, ProviderError> {
    let classify = |err: reqwest::Error| ProviderError::from_reqwest(provider.clone(), &err);
    req.send()
        .await
        .map_err(classify)?
        .error_for_status()
        .map_err(classify)?
        .json()
        .await
        .map_err(classify)
}
