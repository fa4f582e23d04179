//! Per-provider outbound rate limiting.
//!
//! Every provider gets its own bucket, so exhausting one provider never slows
//! calls to another. Buckets are GCRA limiters from `governor`, which behave
//! like a token bucket holding `capacity` tokens and regaining one every
//! `refill_every`.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use governor::{Quota, RateLimiter as GovernorLimiter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::ProviderId;
use crate::ports::{ProviderError, ProviderErrorKind};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Outbound call budget for one provider.
pub enum RateLimitPolicy {
    /// No limit, used for providers that perform no I/O.
    Unlimited,
    /// Token bucket.
    Limited {
        /// Burst size.
        capacity: u32,
        /// Time to regain one token.
        refill_every: Duration,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// A [`RateLimitPolicy::Limited`] that cannot be turned into a bucket.
pub enum RateLimitError {
    /// The bucket would hold no tokens.
    #[error("rate limit for {0} needs a capacity of at least one")]
    ZeroCapacity(ProviderId),
    /// The bucket would never refill.
    #[error("rate limit for {0} needs a non-zero refill period")]
    ZeroRefill(ProviderId),
}

impl RateLimitPolicy {
    fn quota(self, provider: &ProviderId) -> Result<Option<Quota>, RateLimitError> {
        match self {
            RateLimitPolicy::Unlimited => Ok(None),
            RateLimitPolicy::Limited {
                capacity,
                refill_every,
            } => {
                let burst = NonZeroU32::new(capacity)
                    .ok_or_else(|| RateLimitError::ZeroCapacity(provider.clone()))?;
                let quota = Quota::with_period(refill_every)
                    .ok_or_else(|| RateLimitError::ZeroRefill(provider.clone()))?;
                Ok(Some(quota.allow_burst(burst)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Proof that a token was taken for an outbound call.
pub struct Permit {
    /// Provider the token belongs to.
    pub provider: ProviderId,
}

/// Independent token buckets keyed by provider.
///
/// The bucket map is fixed at construction; each bucket synchronizes itself
/// with atomics, so acquisitions for different providers never contend.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: HashMap<ProviderId, Arc<DirectLimiter>>,
    policies: HashMap<ProviderId, RateLimitPolicy>,
    max_wait: Duration,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RateLimiter")
            .field("policies", &self.policies)
            .field("max_wait", &self.max_wait)
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter without buckets; every provider is unlimited until configured.
    #[must_use]
    pub fn new(max_wait: Duration) -> Self {
        Self {
            buckets: HashMap::new(),
            policies: HashMap::new(),
            max_wait,
        }
    }

    /// Configure the policy for one provider, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError`] for a limited policy with a zero capacity or
    /// a zero refill period.
    pub fn with_policy(
        mut self,
        provider: ProviderId,
        policy: RateLimitPolicy,
    ) -> Result<Self, RateLimitError> {
        match policy.quota(&provider)? {
            Some(quota) => {
                self.buckets
                    .insert(provider.clone(), Arc::new(GovernorLimiter::direct(quota)));
            }
            None => {
                self.buckets.remove(&provider);
            }
        }
        self.policies.insert(provider, policy);
        Ok(self)
    }

    /// Policy in force for a provider.
    #[must_use]
    pub fn policy(&self, provider: &ProviderId) -> RateLimitPolicy {
        self.policies
            .get(provider)
            .copied()
            .unwrap_or(RateLimitPolicy::Unlimited)
    }

    /// Longest time [`RateLimiter::acquire`] waits for a token.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Take a token for `provider`, waiting up to the configured bound.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderErrorKind::RateLimited`] error when no token became
    /// available in time.
    pub async fn acquire(&self, provider: &ProviderId) -> Result<Permit, ProviderError> {
        let permit = Permit {
            provider: provider.clone(),
        };
        let Some(bucket) = self.buckets.get(provider) else {
            return Ok(permit);
        };

        if bucket.check().is_ok() {
            return Ok(permit);
        }

        debug!(%provider, max_wait_ms = self.max_wait.as_millis(), "waiting for rate limit token");
        match tokio::time::timeout(self.max_wait, bucket.until_ready()).await {
            Ok(()) => Ok(permit),
            Err(_elapsed) => Err(ProviderError::new(
                provider.clone(),
                ProviderErrorKind::RateLimited,
                format!(
                    "no request budget available within {}ms",
                    self.max_wait.as_millis()
                ),
            )),
        }
    }
}
