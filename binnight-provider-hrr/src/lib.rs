//! Provider implementation for Hunter Resource Recovery (yellow recycling bin).
//!
//! Address search goes through HRR's public Elasticsearch index; collection
//! dates come from the resident portal endpoint keyed by customer number.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
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

/// Public address search index.
pub const DEFAULT_SEARCH_URL: &str = "https://www5.wastedge.com/publicaddresssearch_549/_search";
/// Collection-date lookup endpoint.
pub const DEFAULT_COLLECTION_URL: &str =
    "https://www5.wastedge.com/web/wsrms/we_resportal/HRRCollectionval.p";
/// Static id HRR's own portal sends with every collection lookup.
pub const DEFAULT_API_ID: &str = "e347cd965f6a92ef2ccd61ded7c597b9";
/// Public credentials of the search index.
pub const DEFAULT_USERNAME: &str = "addresssearch";
/// See [`DEFAULT_USERNAME`].
pub const DEFAULT_PASSWORD: &str = "addresssearch";

const SERVICE_TYPE: &str = "Yellow Recycling Bin";

/// Endpoints and credentials for HRR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HrrConfig {
    /// Elasticsearch `_search` URL.
    pub search_url: String,
    /// Collection-date endpoint.
    pub collection_url: String,
    /// Value of the `ID` query parameter.
    pub api_id: String,
    /// Basic-auth user for the search index.
    pub username: String,
    /// Basic-auth password for the search index.
    pub password: String,
}

impl Default for HrrConfig {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_owned(),
            collection_url: DEFAULT_COLLECTION_URL.to_owned(),
            api_id: DEFAULT_API_ID.to_owned(),
            username: DEFAULT_USERNAME.to_owned(),
            password: DEFAULT_PASSWORD.to_owned(),
        }
    }
}

impl HrrConfig {
    /// Apply overrides from the application settings.
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let defaults = Self::default();
        Self {
            search_url: settings.hrr_search_url.clone().unwrap_or(defaults.search_url),
            collection_url: settings
                .hrr_collection_url
                .clone()
                .unwrap_or(defaults.collection_url),
            api_id: settings.hrr_api_id.clone().unwrap_or(defaults.api_id),
            username: settings.hrr_username.clone().unwrap_or(defaults.username),
            password: settings.hrr_password.clone().unwrap_or(defaults.password),
        }
    }
}

/// Customer numbers are numeric in some index records and strings in others.
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

/// Elasticsearch search response
#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: HitList,
}

#[derive(Debug, Default, Deserialize)]
struct HitList {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source", default)]
    source: Option<AddressSource>,
}

#[derive(Debug, Deserialize)]
struct AddressSource {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    cust_number: Option<Identifier>,
}

/// Response from the collection endpoint
#[derive(Debug, Deserialize)]
struct CollectionResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    records: Vec<CollectionRecord>,
}

#[derive(Debug, Deserialize)]
struct CollectionRecord {
    #[serde(rename = "ServiceDate", default)]
    service_date: Option<String>,
}

/// Address search implementation for HRR.
pub struct HrrAddressPort {
    client: Client,
    config: HrrConfig,
    meta: ProviderMeta,
}

impl HrrAddressPort {
    /// Create a new address port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, config: HrrConfig) -> Self {
        Self {
            client,
            config,
            meta: provider_meta(),
        }
    }
}

#[async_trait]
impl AddressPort for HrrAddressPort {
    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn search(&self, query: &Query) -> Result<Vec<RawSuggestion>, ProviderError> {
        let body = json!({
            "query": {
                "bool": {
                    "should": {"match_phrase_prefix": {"address": query.raw.trim().to_lowercase()}},
                    "must_not": {"match_phrase": {"st": "T"}}
                }
            }
        });

        let req = self
            .client
            .post(&self.config.search_url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&body);

        debug!(provider = %self.meta.id, query = %query.normalized, "searching HRR address index");
        let response = fetch_json::<SearchResponse>(&self.meta.id, req).await?;

        let suggestions = response
            .hits
            .hits
            .into_iter()
            .filter_map(|hit| {
                let source = hit.source?;
                let address = source.address?.trim().to_owned();
                let cust_number = source.cust_number?.into_text();
                if address.is_empty() || cust_number.is_empty() {
                    return None;
                }
                Some(RawSuggestion {
                    provider: self.meta.id.clone(),
                    address_id: ProviderAddressId(cust_number),
                    text: address,
                })
            })
            .collect();

        Ok(suggestions)
    }
}

/// Collection schedule implementation for HRR.
pub struct HrrSchedulePort {
    client: Client,
    config: HrrConfig,
    meta: ProviderMeta,
}

impl HrrSchedulePort {
    /// Create a new schedule port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, config: HrrConfig) -> Self {
        Self {
            client,
            config,
            meta: provider_meta(),
        }
    }
}

#[async_trait]
impl SchedulePort for HrrSchedulePort {
    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn schedule(&self, address_id: &ProviderAddressId) -> Result<BinSchedule, ProviderError> {
        let cust_number = address_id.0.trim();
        if cust_number.is_empty() {
            return Err(ProviderError::bad_response(
                self.meta.id.clone(),
                "customer number is empty",
            ));
        }

        let req = self.client.get(&self.config.collection_url).query(&[
            ("ID", self.config.api_id.as_str()),
            ("custNo", cust_number),
        ]);

        debug!(provider = %self.meta.id, cust_number, "fetching HRR collection dates");
        let payload = fetch_json::<serde_json::Value>(&self.meta.id, req).await?;
        let response = CollectionResponse::deserialize(&payload)
            .map_err(|err| ProviderError::from_json(self.meta.id.clone(), &err))?;

        match response.message.as_deref() {
            Some("WARNING") => {
                return Err(ProviderError::bad_response(
                    self.meta.id.clone(),
                    "no collection record found for this address",
                ));
            }
            Some("ERROR") => {
                return Err(ProviderError::bad_response(
                    self.meta.id.clone(),
                    "collection service reported an error",
                ));
            }
            _ => {}
        }

        let upcoming: Vec<_> = response
            .records
            .into_iter()
            .filter_map(|record| record.service_date)
            .filter_map(|raw| {
                let parsed = parse_collection_date(&raw);
                if parsed.is_none() {
                    debug!(provider = %self.meta.id, raw = %raw, "skipping unparseable service date");
                }
                parsed
            })
            .collect();

        let Some(next) = upcoming.first().copied() else {
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
            upcoming,
            instructions: Vec::new(),
            note: None,
            raw_payload: payload,
        })
    }
}

/// Build the plugin bundle for the HRR provider.
#[must_use]
pub fn plugin(client: Client, config: HrrConfig) -> ProviderPlugin {
    let address_port = Arc::new(HrrAddressPort::new(client.clone(), config.clone()));
    let schedule_port = Arc::new(HrrSchedulePort::new(client, config));

    ProviderPlugin {
        meta: provider_meta(),
        address_port,
        schedule_port,
    }
}

/// Static metadata for HRR.
#[must_use]
pub fn provider_meta() -> ProviderMeta {
    ProviderMeta {
        id: ProviderId::from(Providers::Hrr),
        name: String::from("Hunter Resource Recovery"),
        bin_kind: BinKind::Yellow,
        priority: 2,
        kind: ProviderKind::Live,
    }
}

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
