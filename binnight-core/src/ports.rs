//! Traits describing provider capabilities and the provider error type.

use std::fmt;

use async_trait::async_trait;
use reqwest::Error as ReqwestError;
use serde::{Deserialize, Serialize};

use crate::model::{BinSchedule, ProviderAddressId, ProviderId, ProviderMeta, Query, RawSuggestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Classification of a provider failure.
pub enum ProviderErrorKind {
    /// Connection failed or the provider answered with a non-success status.
    NetworkFailure,
    /// The provider answered but the payload had an unexpected shape.
    BadResponse,
    /// No rate-limit token became available in time.
    RateLimited,
    /// The call did not settle before the collection deadline.
    Timeout,
    /// The provider did not recognise the selected address.
    UnknownAddress,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderErrorKind::NetworkFailure => "network failure",
            ProviderErrorKind::BadResponse => "bad response",
            ProviderErrorKind::RateLimited => "rate limited",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::UnknownAddress => "unknown address",
        };
        formatter.write_str(label)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{provider}: {kind}: {message}")]
/// Failure of a single provider call.
pub struct ProviderError {
    /// Provider that failed.
    pub provider: ProviderId,
    /// What went wrong.
    pub kind: ProviderErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ProviderError {
    /// Build an error for the given provider.
    #[must_use]
    pub fn new<M: Into<String>>(provider: ProviderId, kind: ProviderErrorKind, message: M) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    /// Payload did not match the provider's parsing contract.
    #[must_use]
    pub fn bad_response<M: Into<String>>(provider: ProviderId, message: M) -> Self {
        Self::new(provider, ProviderErrorKind::BadResponse, message)
    }

    /// Classify a transport error.
    ///
    /// Decode failures count as [`ProviderErrorKind::BadResponse`], timeouts as
    /// [`ProviderErrorKind::Timeout`], everything else (including non-success
    /// statuses) as [`ProviderErrorKind::NetworkFailure`].
    #[must_use]
    pub fn from_reqwest(provider: ProviderId, err: &ReqwestError) -> Self {
        let kind = if err.is_decode() {
            ProviderErrorKind::BadResponse
        } else if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else {
            ProviderErrorKind::NetworkFailure
        };
        Self::new(provider, kind, err.to_string())
    }

    /// Classify a JSON parse error.
    #[must_use]
    pub fn from_json(provider: ProviderId, err: &serde_json::Error) -> Self {
        Self::bad_response(provider, err.to_string())
    }
}

#[async_trait]
/// Trait for provider-specific address search backends.
pub trait AddressPort: Send + Sync {
    /// Metadata describing the provider handled by this port.
    fn provider(&self) -> &ProviderMeta;

    /// Search the provider for addresses matching the query.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the provider request fails or its
    /// payload cannot be parsed.
    async fn search(&self, query: &Query) -> Result<Vec<RawSuggestion>, ProviderError>;
}

#[async_trait]
/// Trait for provider-specific collection schedule backends.
pub trait SchedulePort: Send + Sync {
    /// Metadata describing the provider handled by this port.
    fn provider(&self) -> &ProviderMeta;

    /// Fetch the collection schedule for an address known to this provider.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the provider request fails, rejects the
    /// address, or returns an unparseable payload.
    async fn schedule(&self, address_id: &ProviderAddressId) -> Result<BinSchedule, ProviderError>;
}
