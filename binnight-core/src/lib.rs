//! Core types and service wiring for the binnight collection schedule aggregator.

/// Response cache with single-flight de-duplication.
pub mod cache;
/// Environment-driven configuration.
pub mod config;
/// Merging of per-provider address suggestions.
pub mod merge;
/// Domain models and identifiers shared by all providers.
pub mod model;
/// Query normalization rules.
pub mod normalize;
/// Registry for plugging upstream providers into the service.
pub mod plugin;
/// Traits describing the provider interfaces.
pub mod ports;
/// Per-provider outbound rate limiting.
pub mod rate_limit;
/// Aggregating service facade used by clients.
pub mod service;

pub use cache::*;
pub use config::*;
pub use merge::*;
pub use model::*;
pub use normalize::*;
pub use plugin::*;
pub use ports::*;
pub use rate_limit::*;
pub use service::*;
