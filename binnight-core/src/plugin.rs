//! Registry for all provider plugins and their ports.

use std::sync::Arc;

use crate::model::{ProviderKind, ProviderMeta};
use crate::ports::{AddressPort, SchedulePort};

/// Collection of ports implementing a single upstream provider.
pub struct ProviderPlugin {
    /// Static metadata describing the provider.
    pub meta: ProviderMeta,
    /// Implementation for searching addresses.
    pub address_port: Arc<dyn AddressPort>,
    /// Implementation for fetching schedules.
    pub schedule_port: Arc<dyn SchedulePort>,
}

/// Registry that resolves plugins by provider identifier.
///
/// Plugins are kept sorted by merge priority so every iteration is deterministic.
pub struct ProviderRegistry {
    plugins: Vec<ProviderPlugin>,
}

impl ProviderRegistry {
    /// Build a registry from the provided plugin list.
    ///
    /// A later plugin with an id already present replaces the earlier one.
    #[must_use]
    pub fn new(plugins: Vec<ProviderPlugin>) -> Self {
        let mut unique: Vec<ProviderPlugin> = Vec::with_capacity(plugins.len());
        for plugin in plugins {
            unique.retain(|existing| existing.meta.id != plugin.meta.id);
            unique.push(plugin);
        }
        unique.sort_by(|left, right| {
            left.meta
                .priority
                .cmp(&right.meta.priority)
                .then_with(|| left.meta.id.cmp(&right.meta.id))
        });
        Self { plugins: unique }
    }

    /// Return metadata for all registered providers in priority order.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderMeta> {
        self.plugins.iter().map(|plugin| plugin.meta.clone()).collect()
    }

    /// Iterator over all plugins in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderPlugin> {
        self.plugins.iter()
    }

    /// Iterator over plugins that perform live lookups.
    pub fn live(&self) -> impl Iterator<Item = &ProviderPlugin> {
        self.plugins
            .iter()
            .filter(|plugin| plugin.meta.kind == ProviderKind::Live)
    }
}
