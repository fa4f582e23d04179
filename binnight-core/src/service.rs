//! Aggregating service facade combining all providers.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStats, Operation, SingleFlightCache};
use crate::config::AggregatorConfig;
use crate::merge::{AddressMerger, SuggestionBatch};
use crate::model::{
    AddressSuggestion, BinSchedule, Outcome, ProviderAddressId, ProviderId, ProviderKind,
    ProviderMeta, Query, RawSuggestion, SuggestionResult, UnifiedResult,
};
use crate::normalize::Normalizer;
use crate::plugin::{ProviderPlugin, ProviderRegistry};
use crate::ports::{ProviderError, ProviderErrorKind};
use crate::rate_limit::{RateLimitError, RateLimitPolicy, RateLimiter};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors that cross the service boundary.
pub enum AggregateError {
    /// The query was rejected before any provider was contacted.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// Every queried provider failed.
    #[error("All providers failed: {}", summarize(.0))]
    TotalFailure(Vec<ProviderError>),
}

fn summarize(errors: &[ProviderError]) -> String {
    if errors.is_empty() {
        return "no provider is registered".to_owned();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Cache that stores raw per-provider suggestion lists.
pub type SearchCache = SingleFlightCache<Vec<RawSuggestion>, ProviderError>;
/// Cache that stores per-provider schedules.
pub type ScheduleCache = SingleFlightCache<BinSchedule, ProviderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Occupancy of both caches.
pub struct ServiceStats {
    /// Suggestion search cache.
    pub search: CacheStats,
    /// Schedule cache.
    pub schedule: CacheStats,
}

/// Public entry point for address suggestions and unified schedules.
///
/// Each provider call runs through the cache first; only a miss takes a
/// rate-limit token and reaches the provider. All calls of one request share a
/// single deadline.
pub struct BinNightService {
    registry: Arc<ProviderRegistry>,
    merger: AddressMerger,
    limiter: Arc<RateLimiter>,
    search_cache: SearchCache,
    schedule_cache: ScheduleCache,
    config: AggregatorConfig,
}

impl BinNightService {
    /// Create a service with fresh caches and a rate limiter derived from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError`] when a configured rate limit cannot be enforced.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: AggregatorConfig,
    ) -> Result<Self, RateLimitError> {
        let limiter = Arc::new(rate_limiter_for(&registry, &config)?);
        Ok(Self {
            registry,
            merger: AddressMerger::default(),
            limiter,
            search_cache: SearchCache::new(),
            schedule_cache: ScheduleCache::new(),
            config,
        })
    }

    /// Replace the normalization rules used for queries and merging.
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.merger = AddressMerger::new(normalizer);
        self
    }

    /// Share an existing rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Share existing caches.
    #[must_use]
    pub fn with_caches(mut self, search: SearchCache, schedule: ScheduleCache) -> Self {
        self.search_cache = search;
        self.schedule_cache = schedule;
        self
    }

    /// Registered providers in priority order.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderMeta> {
        self.registry.providers()
    }

    /// Cache occupancy.
    #[must_use]
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            search: self.search_cache.stats(),
            schedule: self.schedule_cache.stats(),
        }
    }

    /// Periodically purge expired entries from both caches.
    #[must_use]
    pub fn spawn_cache_purge(&self, period: Duration) -> [JoinHandle<()>; 2] {
        [
            self.search_cache.spawn_purge_task(period),
            self.schedule_cache.spawn_purge_task(period),
        ]
    }

    /// Search every live provider and merge their suggestions.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::InvalidQuery`] for unusable input and
    /// [`AggregateError::TotalFailure`] when every live provider failed.
    pub async fn search_suggestions(&self, raw: &str) -> Result<SuggestionResult, AggregateError> {
        let query = self.merger.normalizer().parse_query(raw)?;
        let deadline = deadline_after(self.config.collection_timeout);

        let calls = self.registry.live().map(|plugin| {
            let query = &query;
            async move {
                let result = self.search_one(plugin, query, deadline).await;
                (plugin.meta.id.clone(), result)
            }
        });
        let mut settled: BTreeMap<ProviderId, Result<Vec<RawSuggestion>, ProviderError>> =
            join_all(calls).await.into_iter().collect();

        let mut batches = Vec::new();
        let mut errors = Vec::new();
        for plugin in self.registry.live() {
            match settled.remove(&plugin.meta.id) {
                Some(Ok(suggestions)) => batches.push(SuggestionBatch {
                    priority: plugin.meta.priority,
                    suggestions,
                }),
                Some(Err(err)) => {
                    warn!(provider = %err.provider, kind = %err.kind, error = %err.message, "address search failed");
                    errors.push(err);
                }
                None => {}
            }
        }

        if batches.is_empty() {
            return Err(AggregateError::TotalFailure(errors));
        }

        let suggestions = self.merger.merge(batches);
        info!(
            query = %query.normalized,
            suggestions = suggestions.len(),
            failed = errors.len(),
            "suggestion search settled"
        );

        Ok(SuggestionResult {
            query,
            suggestions,
            errors,
        })
    }

    /// Fetch schedules for the selected address from every provider.
    ///
    /// Failed providers are listed in `errors` and left out of `schedules`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::InvalidQuery`] when the suggestion's text is
    /// unusable and [`AggregateError::TotalFailure`] when no provider produced
    /// a schedule.
    pub async fn get_unified_schedule(
        &self,
        selected: &AddressSuggestion,
    ) -> Result<UnifiedResult, AggregateError> {
        let query = self.merger.normalizer().parse_query(&selected.display_text)?;
        let deadline = deadline_after(self.config.collection_timeout);

        let calls = self.registry.iter().map(|plugin| {
            let query = &query;
            async move {
                let result = match address_id_for(plugin, selected, query) {
                    Some(address_id) => self.schedule_one(plugin, address_id, deadline).await,
                    None => Err(ProviderError::new(
                        plugin.meta.id.clone(),
                        ProviderErrorKind::UnknownAddress,
                        "address was not offered by this provider",
                    )),
                };
                (plugin.meta.id.clone(), result)
            }
        });
        let mut settled: BTreeMap<ProviderId, Result<BinSchedule, ProviderError>> =
            join_all(calls).await.into_iter().collect();

        let mut schedules = BTreeMap::new();
        let mut errors = Vec::new();
        for plugin in self.registry.iter() {
            let Some(result) = settled.remove(&plugin.meta.id) else {
                continue;
            };
            match result.and_then(|schedule| usable(plugin, schedule)) {
                Ok(schedule) => {
                    schedules.entry(schedule.bin_kind).or_insert(schedule);
                }
                Err(err) => {
                    warn!(provider = %err.provider, kind = %err.kind, error = %err.message, "schedule fetch failed");
                    errors.push(err);
                }
            }
        }

        if schedules.is_empty() {
            return Err(AggregateError::TotalFailure(errors));
        }

        let outcome = if errors.is_empty() {
            Outcome::FullSuccess
        } else {
            Outcome::PartialSuccess
        };
        info!(
            address = %query.normalized,
            schedules = schedules.len(),
            failed = errors.len(),
            ?outcome,
            "schedule lookup settled"
        );

        Ok(UnifiedResult {
            address: selected.display_text.clone(),
            schedules,
            errors,
            outcome,
        })
    }

    async fn search_one(
        &self,
        plugin: &ProviderPlugin,
        query: &Query,
        deadline: Instant,
    ) -> Result<Vec<RawSuggestion>, ProviderError> {
        let provider = plugin.meta.id.clone();
        let key = CacheKey::new(Operation::Search, provider.clone(), query.normalized.clone());
        let port = Arc::clone(&plugin.address_port);
        let limiter = Arc::clone(&self.limiter);
        let bound = self.config.collection_timeout;
        let owned_query = query.clone();
        let call_provider = provider.clone();

        let call = self
            .search_cache
            .get_or_compute(&key, self.config.search_ttl, move || {
                bounded(call_provider.clone(), bound, async move {
                    limiter.acquire(&call_provider).await?;
                    debug!(provider = %call_provider, "searching provider");
                    port.search(&owned_query).await
                })
            });
        until(provider, deadline, call).await
    }

    async fn schedule_one(
        &self,
        plugin: &ProviderPlugin,
        address_id: ProviderAddressId,
        deadline: Instant,
    ) -> Result<BinSchedule, ProviderError> {
        let provider = plugin.meta.id.clone();
        let key = CacheKey::new(Operation::Schedule, provider.clone(), address_id.0.clone());
        let port = Arc::clone(&plugin.schedule_port);
        let limiter = Arc::clone(&self.limiter);
        let bound = self.config.collection_timeout;
        let call_provider = provider.clone();

        let call = self
            .schedule_cache
            .get_or_compute(&key, self.config.schedule_ttl, move || {
                bounded(call_provider.clone(), bound, async move {
                    limiter.acquire(&call_provider).await?;
                    debug!(provider = %call_provider, %address_id, "fetching schedule");
                    port.schedule(&address_id).await
                })
            });
        until(provider, deadline, call).await
    }
}

fn rate_limiter_for(
    registry: &ProviderRegistry,
    config: &AggregatorConfig,
) -> Result<RateLimiter, RateLimitError> {
    registry
        .iter()
        .try_fold(RateLimiter::new(config.rate_limit_max_wait), |limiter, plugin| {
            let policy = config.rate_limits.get(&plugin.meta.id).copied().unwrap_or(
                match plugin.meta.kind {
                    ProviderKind::Live => config.live_rate_limit,
                    ProviderKind::StaticFallback => RateLimitPolicy::Unlimited,
                },
            );
            limiter.with_policy(plugin.meta.id.clone(), policy)
        })
}

fn address_id_for(
    plugin: &ProviderPlugin,
    selected: &AddressSuggestion,
    query: &Query,
) -> Option<ProviderAddressId> {
    match plugin.meta.kind {
        ProviderKind::Live => selected.source_ids.get(&plugin.meta.id).cloned(),
        ProviderKind::StaticFallback => Some(ProviderAddressId(query.normalized.clone())),
    }
}

fn usable(plugin: &ProviderPlugin, schedule: BinSchedule) -> Result<BinSchedule, ProviderError> {
    if plugin.meta.kind == ProviderKind::Live && schedule.next_collection_date.is_none() {
        return Err(ProviderError::bad_response(
            plugin.meta.id.clone(),
            "schedule has no collection date",
        ));
    }
    Ok(schedule)
}

// Bounds too large to represent are clamped to roughly thirty years.
fn deadline_after(bound: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(bound)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

fn timed_out(provider: ProviderId, bound: Duration) -> ProviderError {
    ProviderError::new(
        provider,
        ProviderErrorKind::Timeout,
        format!("no answer within {}ms", bound.as_millis()),
    )
}

// Bounds the shared computation so a hung provider frees its cache slot.
fn bounded<T, Fut>(
    provider: ProviderId,
    bound: Duration,
    call: Fut,
) -> impl Future<Output = Result<T, ProviderError>> + Send + 'static
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
{
    async move {
        timeout(bound, call)
            .await
            .unwrap_or_else(|_elapsed| Err(timed_out(provider, bound)))
    }
}

// Bounds one request's wait without cancelling the shared computation.
async fn until<T, Fut>(provider: ProviderId, deadline: Instant, call: Fut) -> Result<T, ProviderError>
where
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let started = Instant::now();
    match timeout_at(deadline, call).await {
        Ok(result) => result,
        Err(_elapsed) => Err(timed_out(provider, deadline.saturating_duration_since(started))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::model::{BinKind, Providers};
    use crate::ports::{AddressPort, SchedulePort};

    #[derive(Clone)]
    enum Reply {
        Date(NaiveDate),
        Info,
        Fail(ProviderErrorKind),
        Hang,
    }

    struct FakeProvider {
        meta: ProviderMeta,
        suggestions: Vec<(String, String)>,
        reply: Reply,
        delay: Duration,
        search_calls: AtomicU32,
        schedule_calls: AtomicU32,
    }

    impl FakeProvider {
        fn new(provider: Providers, bin_kind: BinKind, priority: u8, kind: ProviderKind) -> Self {
            let id = ProviderId::from(provider);
            Self {
                meta: ProviderMeta {
                    name: id.0.clone(),
                    id,
                    bin_kind,
                    priority,
                    kind,
                },
                suggestions: Vec::new(),
                reply: Reply::Info,
                delay: Duration::ZERO,
                search_calls: AtomicU32::new(0),
                schedule_calls: AtomicU32::new(0),
            }
        }

        fn suggests(mut self, id: &str, text: &str) -> Self {
            self.suggestions.push((id.to_owned(), text.to_owned()));
            self
        }

        fn replies(mut self, reply: Reply) -> Self {
            self.reply = reply;
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl AddressPort for FakeProvider {
        fn provider(&self) -> &ProviderMeta {
            &self.meta
        }

        async fn search(&self, _query: &Query) -> Result<Vec<RawSuggestion>, ProviderError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if let Reply::Fail(kind) = self.reply {
                return Err(ProviderError::new(self.meta.id.clone(), kind, "fake failure"));
            }
            Ok(self
                .suggestions
                .iter()
                .map(|(id, text)| RawSuggestion {
                    provider: self.meta.id.clone(),
                    address_id: ProviderAddressId(id.clone()),
                    text: text.clone(),
                })
                .collect())
        }
    }

    #[async_trait]
    impl SchedulePort for FakeProvider {
        fn provider(&self) -> &ProviderMeta {
            &self.meta
        }

        async fn schedule(&self, _address_id: &ProviderAddressId) -> Result<BinSchedule, ProviderError> {
            self.schedule_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let next_collection_date = match self.reply.clone() {
                Reply::Date(date) => Some(date),
                Reply::Info => None,
                Reply::Fail(kind) => {
                    return Err(ProviderError::new(self.meta.id.clone(), kind, "fake failure"));
                }
                Reply::Hang => std::future::pending().await,
            };
            Ok(BinSchedule {
                provider_id: self.meta.id.clone(),
                bin_kind: self.meta.bin_kind,
                service_type: self.meta.name.clone(),
                next_collection_date,
                upcoming: next_collection_date.into_iter().collect(),
                instructions: vec!["Put the bin out the night before".to_owned()],
                note: None,
                raw_payload: serde_json::Value::Null,
            })
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 20).expect("valid date")
    }

    fn maitland() -> FakeProvider {
        FakeProvider::new(Providers::Maitland, BinKind::Red, 1, ProviderKind::Live)
            .suggests("1001", "12 High Street")
            .replies(Reply::Date(date()))
    }

    fn hrr() -> FakeProvider {
        FakeProvider::new(Providers::Hrr, BinKind::Yellow, 2, ProviderKind::Live)
            .suggests("C-77", "12 high st")
            .replies(Reply::Date(date()))
    }

    fn solo() -> FakeProvider {
        FakeProvider::new(Providers::Solo, BinKind::Green, 3, ProviderKind::StaticFallback)
    }

    fn plugin(fake: &Arc<FakeProvider>) -> ProviderPlugin {
        ProviderPlugin {
            meta: fake.meta.clone(),
            address_port: Arc::clone(fake) as Arc<dyn AddressPort>,
            schedule_port: Arc::clone(fake) as Arc<dyn SchedulePort>,
        }
    }

    fn build_service(fakes: &[&Arc<FakeProvider>], config: AggregatorConfig) -> BinNightService {
        let registry = ProviderRegistry::new(fakes.iter().map(|fake| plugin(fake)).collect());
        BinNightService::new(Arc::new(registry), config).expect("valid rate limits")
    }

    fn relaxed_config() -> AggregatorConfig {
        AggregatorConfig {
            collection_timeout: Duration::from_secs(2),
            live_rate_limit: RateLimitPolicy::Unlimited,
            ..AggregatorConfig::default()
        }
    }

    fn suggestion(ids: &[(Providers, &str)]) -> AddressSuggestion {
        AddressSuggestion {
            display_text: "12 High Street".to_owned(),
            normalized: "12 high st".to_owned(),
            source_ids: ids
                .iter()
                .map(|(provider, id)| (ProviderId::from(*provider), ProviderAddressId((*id).to_owned())))
                .collect(),
            priority: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_search_is_served_from_cache() {
        let (council, recovery, fallback) =
            (Arc::new(maitland()), Arc::new(hrr()), Arc::new(solo()));
        let service = build_service(&[&council, &recovery, &fallback], relaxed_config());

        let first = service.search_suggestions("12 High Street").await.expect("search succeeds");
        let second = service.search_suggestions("12 high st.").await.expect("search succeeds");

        assert_eq!(first.suggestions, second.suggestions);
        assert_eq!(council.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(recovery.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_ttl_and_timeout_still_serve_requests() {
        let (council, recovery) = (Arc::new(maitland()), Arc::new(hrr()));
        let config = AggregatorConfig {
            search_ttl: Duration::from_secs(u64::MAX),
            collection_timeout: Duration::from_secs(u64::MAX),
            ..relaxed_config()
        };
        let service = build_service(&[&council, &recovery], config);

        service.search_suggestions("12 high").await.expect("search succeeds");
        service.search_suggestions("12 high").await.expect("search succeeds");

        assert_eq!(council.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.stats().search.active_entries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn search_merges_suggestions_across_providers() {
        let (council, recovery, fallback) =
            (Arc::new(maitland()), Arc::new(hrr()), Arc::new(solo()));
        let service = build_service(&[&recovery, &fallback, &council], relaxed_config());

        let result = service.search_suggestions("12 high").await.expect("search succeeds");

        assert!(result.errors.is_empty());
        assert_eq!(result.suggestions.len(), 1);
        let merged = &result.suggestions[0];
        assert_eq!(merged.display_text, "12 High Street");
        assert_eq!(merged.source_ids.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn search_reports_failed_provider_and_keeps_the_rest() {
        let council = Arc::new(maitland());
        let recovery = Arc::new(hrr().replies(Reply::Fail(ProviderErrorKind::NetworkFailure)));
        let service = build_service(&[&council, &recovery], relaxed_config());

        let result = service.search_suggestions("12 high").await.expect("partial search succeeds");

        assert_eq!(result.suggestions.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].provider, ProviderId::from(Providers::Hrr));
    }

    #[tokio::test(start_paused = true)]
    async fn search_with_every_live_provider_failing_is_total_failure() {
        let council = Arc::new(maitland().replies(Reply::Fail(ProviderErrorKind::Timeout)));
        let recovery = Arc::new(hrr().replies(Reply::Fail(ProviderErrorKind::NetworkFailure)));
        let fallback = Arc::new(solo());
        let service = build_service(&[&council, &recovery, &fallback], relaxed_config());

        let err = service.search_suggestions("12 high").await.expect_err("nothing succeeded");

        let AggregateError::TotalFailure(errors) = err else {
            panic!("expected total failure, got {err:?}");
        };
        let failed: Vec<ProviderId> = errors.iter().map(|error| error.provider.clone()).collect();
        assert_eq!(failed, [ProviderId::from(Providers::Maitland), ProviderId::from(Providers::Hrr)]);
        assert_eq!(fallback.search_calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.stats().search, CacheStats::default());
    }

    #[test]
    fn zero_refill_period_is_rejected() {
        let council = Arc::new(maitland());
        let registry = ProviderRegistry::new(vec![plugin(&council)]);
        let config = AggregatorConfig {
            live_rate_limit: RateLimitPolicy::Limited {
                capacity: 1,
                refill_every: Duration::ZERO,
            },
            ..AggregatorConfig::default()
        };

        let err = BinNightService::new(Arc::new(registry), config)
            .err()
            .expect("limit cannot be enforced");

        assert_eq!(err, RateLimitError::ZeroRefill(ProviderId::from(Providers::Maitland)));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_query_touches_no_provider() {
        let council = Arc::new(maitland());
        let service = build_service(&[&council], relaxed_config());

        let err = service.search_suggestions(" - ").await.expect_err("query is too short");

        assert!(matches!(err, AggregateError::InvalidQuery(_)));
        assert_eq!(council.search_calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.stats().search, CacheStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_schedule_requests_share_upstream_calls() {
        let council = Arc::new(maitland().slow(Duration::from_millis(300)));
        let recovery = Arc::new(hrr().slow(Duration::from_millis(300)));
        let fallback = Arc::new(solo().slow(Duration::from_millis(300)));
        let service = build_service(&[&council, &recovery, &fallback], relaxed_config());
        let selected = suggestion(&[(Providers::Maitland, "1001"), (Providers::Hrr, "C-77")]);

        let requests = (0..6).map(|_| service.get_unified_schedule(&selected));
        let results = join_all(requests).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(council.schedule_calls.load(Ordering::SeqCst), 1);
        assert_eq!(recovery.schedule_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.schedule_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_provider_yields_partial_success() {
        let council = Arc::new(maitland());
        let recovery = Arc::new(hrr().replies(Reply::Fail(ProviderErrorKind::NetworkFailure)));
        let fallback = Arc::new(solo());
        let service = build_service(&[&council, &recovery, &fallback], relaxed_config());
        let selected = suggestion(&[(Providers::Maitland, "1001"), (Providers::Hrr, "C-77")]);

        let result = service.get_unified_schedule(&selected).await.expect("partial success");

        assert_eq!(result.outcome, Outcome::PartialSuccess);
        assert_eq!(
            result.schedules.keys().copied().collect::<Vec<_>>(),
            [BinKind::Red, BinKind::Green]
        );
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].provider, ProviderId::from(Providers::Hrr));
        assert_eq!(result.errors[0].kind, ProviderErrorKind::NetworkFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn every_provider_answering_is_full_success() {
        let (council, recovery, fallback) =
            (Arc::new(maitland()), Arc::new(hrr()), Arc::new(solo()));
        let service = build_service(&[&council, &recovery, &fallback], relaxed_config());
        let selected = suggestion(&[(Providers::Maitland, "1001"), (Providers::Hrr, "C-77")]);

        let result = service.get_unified_schedule(&selected).await.expect("full success");

        assert_eq!(result.outcome, Outcome::FullSuccess);
        assert_eq!(result.schedules.len(), 3);
        let green = result.schedules.get(&BinKind::Green).expect("fallback schedule present");
        assert!(green.next_collection_date.is_none());
        assert!(!green.instructions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_provider_times_out_without_blocking_others() {
        let council = Arc::new(maitland());
        let recovery = Arc::new(hrr().replies(Reply::Hang));
        let fallback = Arc::new(solo());
        let config = AggregatorConfig {
            collection_timeout: Duration::from_millis(500),
            ..relaxed_config()
        };
        let service = build_service(&[&council, &recovery, &fallback], config);
        let selected = suggestion(&[(Providers::Maitland, "1001"), (Providers::Hrr, "C-77")]);

        let started = Instant::now();
        let result = service.get_unified_schedule(&selected).await.expect("partial success");

        assert!(started.elapsed() <= Duration::from_millis(600));
        assert_eq!(result.outcome, Outcome::PartialSuccess);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ProviderErrorKind::Timeout);
        assert_eq!(result.schedules.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn all_providers_failing_is_total_failure() {
        let council = Arc::new(maitland().replies(Reply::Fail(ProviderErrorKind::BadResponse)));
        let recovery = Arc::new(hrr().replies(Reply::Fail(ProviderErrorKind::NetworkFailure)));
        let service = build_service(&[&council, &recovery], relaxed_config());
        let selected = suggestion(&[(Providers::Maitland, "1001"), (Providers::Hrr, "C-77")]);

        let err = service.get_unified_schedule(&selected).await.expect_err("nothing succeeded");

        let AggregateError::TotalFailure(errors) = err else {
            panic!("expected total failure, got {err:?}");
        };
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_without_id_is_reported_and_not_called() {
        let (council, recovery, fallback) =
            (Arc::new(maitland()), Arc::new(hrr()), Arc::new(solo()));
        let service = build_service(&[&council, &recovery, &fallback], relaxed_config());
        let selected = suggestion(&[(Providers::Maitland, "1001")]);

        let result = service.get_unified_schedule(&selected).await.expect("partial success");

        assert_eq!(recovery.schedule_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ProviderErrorKind::UnknownAddress);
    }

    #[tokio::test(start_paused = true)]
    async fn live_schedule_without_date_is_not_usable() {
        let council = Arc::new(maitland().replies(Reply::Info));
        let fallback = Arc::new(solo());
        let service = build_service(&[&council, &fallback], relaxed_config());
        let selected = suggestion(&[(Providers::Maitland, "1001")]);

        let result = service.get_unified_schedule(&selected).await.expect("fallback still answers");

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ProviderErrorKind::BadResponse);
        assert!(result.schedules.contains_key(&BinKind::Green));
        assert!(!result.schedules.contains_key(&BinKind::Red));
    }

    #[tokio::test]
    async fn exhausted_bucket_only_affects_its_provider() {
        let (council, recovery, fallback) =
            (Arc::new(maitland()), Arc::new(hrr()), Arc::new(solo()));
        let mut config = relaxed_config();
        config.rate_limit_max_wait = Duration::from_millis(20);
        config.rate_limits.insert(
            ProviderId::from(Providers::Maitland),
            RateLimitPolicy::Limited {
                capacity: 1,
                refill_every: Duration::from_secs(60),
            },
        );
        let service = build_service(&[&council, &recovery, &fallback], config);

        let first = suggestion(&[(Providers::Maitland, "1001"), (Providers::Hrr, "C-77")]);
        service.get_unified_schedule(&first).await.expect("first lookup succeeds");

        let second = AddressSuggestion {
            display_text: "14 High Street".to_owned(),
            normalized: "14 high st".to_owned(),
            ..suggestion(&[(Providers::Maitland, "1002"), (Providers::Hrr, "C-78")])
        };
        let result = service.get_unified_schedule(&second).await.expect("partial success");

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].provider, ProviderId::from(Providers::Maitland));
        assert_eq!(result.errors[0].kind, ProviderErrorKind::RateLimited);
        assert!(result.schedules.contains_key(&BinKind::Yellow));
        assert!(result.schedules.contains_key(&BinKind::Green));
        assert_eq!(council.schedule_calls.load(Ordering::SeqCst), 1);
    }
}
