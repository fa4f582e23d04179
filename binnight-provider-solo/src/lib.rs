//! Static fallback for Solo Resource Recovery's green organics (FOGO) bin.
//!
//! Solo's live API sits behind a captcha, so this provider never performs I/O
//! and always answers with the standing service information.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use binnight_core::{
    model::{
        BinKind, BinSchedule, ProviderAddressId, ProviderId, ProviderKind, ProviderMeta,
        Providers, Query, RawSuggestion,
    },
    plugin::ProviderPlugin,
    ports::{AddressPort, ProviderError, SchedulePort},
};

const SERVICE_TYPE: &str = "Green Organics Bin (FOGO)";

/// Standing information about the organics service.
#[derive(Debug, Serialize)]
struct OrganicsGuide {
    provider: &'static str,
    service_type: &'static str,
    collection_schedule: &'static str,
    coverage_areas: &'static [&'static str],
    instructions: &'static [&'static str],
    what_goes_in: &'static [&'static str],
    what_stays_out: &'static [&'static str],
    website: &'static str,
    contact_note: &'static str,
}

const GUIDE: OrganicsGuide = OrganicsGuide {
    provider: "Solo Resource Recovery",
    service_type: SERVICE_TYPE,
    collection_schedule: "Weekly collection",
    coverage_areas: &["Cessnock", "Maitland", "Singleton"],
    instructions: &[
        "Use your kitchen caddy for food scraps",
        "Empty caddy contents into green organics bin",
        "Include both cooked and raw food scraps",
        "Add garden clippings and organic waste",
        "Use compostable liner bags provided by council",
    ],
    what_goes_in: &[
        "All food scraps (cooked and raw)",
        "Fruit and vegetable scraps",
        "Meat, fish, bones",
        "Dairy products",
        "Bread, pasta, rice",
        "Coffee grounds and tea bags",
        "Garden clippings and leaves",
        "Small branches and prunings",
    ],
    what_stays_out: &[
        "Plastic bags (except compostable liners)",
        "Glass, metal, or plastic containers",
        "Cat litter and pet waste",
        "Nappies",
        "Large branches",
        "Treated timber",
    ],
    website: "https://www.yourorganicsbin.com.au/",
    contact_note: "Weekly collection. Contact your local council for specific collection dates.",
};

/// Fallback ports for Solo. One value serves both traits.
pub struct SoloFallbackPort {
    meta: ProviderMeta,
}

impl SoloFallbackPort {
    /// Create the fallback port.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: provider_meta(),
        }
    }
}

impl Default for SoloFallbackPort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressPort for SoloFallbackPort {
    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    /// Solo has no address index; the fallback never suggests addresses.
    async fn search(&self, _query: &Query) -> Result<Vec<RawSuggestion>, ProviderError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl SchedulePort for SoloFallbackPort {
    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn schedule(&self, address_id: &ProviderAddressId) -> Result<BinSchedule, ProviderError> {
        debug!(provider = %self.meta.id, address = %address_id, "serving organics fallback");
        let raw_payload = serde_json::to_value(&GUIDE)
            .map_err(|err| ProviderError::from_json(self.meta.id.clone(), &err))?;

        Ok(BinSchedule {
            provider_id: self.meta.id.clone(),
            bin_kind: self.meta.bin_kind,
            service_type: SERVICE_TYPE.to_owned(),
            next_collection_date: None,
            upcoming: Vec::new(),
            instructions: GUIDE.instructions.iter().map(|line| (*line).to_owned()).collect(),
            note: Some(GUIDE.contact_note.to_owned()),
            raw_payload,
        })
    }
}

/// Build the plugin bundle for the Solo fallback.
#[must_use]
pub fn plugin() -> ProviderPlugin {
    let port = Arc::new(SoloFallbackPort::new());

    ProviderPlugin {
        meta: provider_meta(),
        address_port: Arc::clone(&port) as Arc<dyn AddressPort>,
        schedule_port: port,
    }
}

/// Static metadata for Solo.
#[must_use]
pub fn provider_meta() -> ProviderMeta {
    ProviderMeta {
        id: ProviderId::from(Providers::Solo),
        name: String::from("Solo Resource Recovery"),
        bin_kind: BinKind::Green,
        priority: 3,
        kind: ProviderKind::StaticFallback,
    }
}
