//! Configuration consumed by the aggregator and provider wiring.

use std::collections::HashMap;
use std::env::VarError;
use std::time::Duration;

use crate::model::{ProviderId, Providers};
use crate::rate_limit::RateLimitPolicy;

/// Suggestion lists change rarely.
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(1800);
/// Schedules roll over daily.
pub const DEFAULT_SCHEDULE_TTL: Duration = Duration::from_secs(3600);
/// Bound on the whole collecting phase of one request.
pub const DEFAULT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(12);
/// Per-request HTTP timeout for provider clients.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Burst of outbound calls allowed per live provider.
pub const DEFAULT_RATE_LIMIT_CAPACITY: u32 = 5;
/// Time for a live provider to regain one call.
pub const DEFAULT_RATE_LIMIT_REFILL: Duration = Duration::from_secs(2);
/// Default user agent for provider clients.
pub const DEFAULT_USER_AGENT: &str = "binnight/0.1";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
/// Errors raised while reading configuration.
pub enum ConfigError {
    /// A variable was present but could not be parsed.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar {
        /// Variable name.
        var: String,
        /// Parser message.
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Cache, timeout, and rate-limit settings of the aggregator.
pub struct AggregatorConfig {
    /// How long merged-search inputs stay cached.
    pub search_ttl: Duration,
    /// How long schedules stay cached.
    pub schedule_ttl: Duration,
    /// Wall-clock bound on collecting provider results.
    pub collection_timeout: Duration,
    /// Policy for live providers without an explicit entry.
    pub live_rate_limit: RateLimitPolicy,
    /// Per-provider policy overrides.
    pub rate_limits: HashMap<ProviderId, RateLimitPolicy>,
    /// Longest wait for a rate-limit token.
    pub rate_limit_max_wait: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            search_ttl: DEFAULT_SEARCH_TTL,
            schedule_ttl: DEFAULT_SCHEDULE_TTL,
            collection_timeout: DEFAULT_COLLECTION_TIMEOUT,
            live_rate_limit: RateLimitPolicy::Limited {
                capacity: DEFAULT_RATE_LIMIT_CAPACITY,
                refill_every: DEFAULT_RATE_LIMIT_REFILL,
            },
            rate_limits: HashMap::new(),
            rate_limit_max_wait: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Endpoint and credential overrides for the live providers.
///
/// `None` keeps the provider crate's built-in value.
pub struct ProviderSettings {
    /// Maitland `WasteTrack` API base URL.
    pub maitland_base_url: Option<String>,
    /// HRR Elasticsearch address search URL.
    pub hrr_search_url: Option<String>,
    /// HRR collection-date endpoint URL.
    pub hrr_collection_url: Option<String>,
    /// Static id HRR expects on collection lookups.
    pub hrr_api_id: Option<String>,
    /// HRR search basic-auth user.
    pub hrr_username: Option<String>,
    /// HRR search basic-auth password.
    pub hrr_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Complete configuration for a binnight process.
pub struct AppConfig {
    /// Aggregator tuning.
    pub aggregator: AggregatorConfig,
    /// Provider endpoints and credentials.
    pub providers: ProviderSettings,
    /// HTTP timeout for a single upstream request.
    pub request_timeout: Duration,
    /// User agent sent upstream.
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            aggregator: AggregatorConfig::default(),
            providers: ProviderSettings::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

/// Load configuration from the process environment.
///
/// Does not read `.env` files; binaries call `dotenvy` first.
///
/// # Errors
///
/// Returns [`ConfigError`] when a variable holds an unparseable value.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build configuration through an arbitrary variable lookup.
///
/// # Errors
///
/// Returns [`ConfigError`] when a variable holds an unparseable value.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let optional = |var: &str| lookup(var).ok().filter(|value| !value.trim().is_empty());

    let parse_u64 = |var: &str| -> Result<Option<u64>, ConfigError> {
        optional(var)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|err| ConfigError::InvalidEnvVar {
                        var: var.to_owned(),
                        reason: err.to_string(),
                    })
            })
            .transpose()
    };
    let secs = |var: &str, default: Duration| -> Result<Duration, ConfigError> {
        Ok(parse_u64(var)?.map_or(default, Duration::from_secs))
    };
    let millis = |var: &str, default: Duration| -> Result<Duration, ConfigError> {
        Ok(parse_u64(var)?.map_or(default, Duration::from_millis))
    };
    // Rate limits must stay enforceable: no empty buckets, no frozen refills.
    let positive = |var: &str| -> Result<Option<u64>, ConfigError> {
        match parse_u64(var)? {
            Some(0) => Err(ConfigError::InvalidEnvVar {
                var: var.to_owned(),
                reason: "must be greater than zero".to_owned(),
            }),
            value => Ok(value),
        }
    };
    let capacity = |var: &str| -> Result<Option<u32>, ConfigError> {
        positive(var)?
            .map(|value| {
                u32::try_from(value).map_err(|err| ConfigError::InvalidEnvVar {
                    var: var.to_owned(),
                    reason: err.to_string(),
                })
            })
            .transpose()
    };
    let refill = |var: &str| -> Result<Option<Duration>, ConfigError> {
        Ok(positive(var)?.map(Duration::from_millis))
    };

    let defaults = AggregatorConfig::default();
    let live_capacity =
        capacity("BINNIGHT_RATE_LIMIT_CAPACITY")?.unwrap_or(DEFAULT_RATE_LIMIT_CAPACITY);
    let live_refill = refill("BINNIGHT_RATE_LIMIT_REFILL_MS")?.unwrap_or(DEFAULT_RATE_LIMIT_REFILL);

    let mut rate_limits = HashMap::new();
    for provider in [Providers::Maitland, Providers::Hrr] {
        let prefix = format!("BINNIGHT_{}", provider.to_string().to_uppercase());
        let provider_capacity = capacity(&format!("{prefix}_RATE_LIMIT_CAPACITY"))?;
        let provider_refill = refill(&format!("{prefix}_RATE_LIMIT_REFILL_MS"))?;
        if provider_capacity.is_none() && provider_refill.is_none() {
            continue;
        }
        rate_limits.insert(
            ProviderId::from(provider),
            RateLimitPolicy::Limited {
                capacity: provider_capacity.unwrap_or(live_capacity),
                refill_every: provider_refill.unwrap_or(live_refill),
            },
        );
    }

    let aggregator = AggregatorConfig {
        search_ttl: secs("BINNIGHT_SEARCH_TTL_SECS", defaults.search_ttl)?,
        schedule_ttl: secs("BINNIGHT_SCHEDULE_TTL_SECS", defaults.schedule_ttl)?,
        collection_timeout: millis("BINNIGHT_COLLECTION_TIMEOUT_MS", defaults.collection_timeout)?,
        live_rate_limit: RateLimitPolicy::Limited {
            capacity: live_capacity,
            refill_every: live_refill,
        },
        rate_limits,
        rate_limit_max_wait: millis("BINNIGHT_RATE_LIMIT_MAX_WAIT_MS", defaults.rate_limit_max_wait)?,
    };

    let providers = ProviderSettings {
        maitland_base_url: optional("BINNIGHT_MAITLAND_BASE_URL"),
        hrr_search_url: optional("BINNIGHT_HRR_SEARCH_URL"),
        hrr_collection_url: optional("BINNIGHT_HRR_COLLECTION_URL"),
        hrr_api_id: optional("BINNIGHT_HRR_API_ID"),
        hrr_username: optional("BINNIGHT_HRR_USERNAME"),
        hrr_password: optional("BINNIGHT_HRR_PASSWORD"),
    };

    Ok(AppConfig {
        aggregator,
        providers,
        request_timeout: secs("BINNIGHT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT)?,
        user_agent: optional("BINNIGHT_USER_AGENT")
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
    })
}
