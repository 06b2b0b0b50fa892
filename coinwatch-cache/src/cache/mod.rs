//! # Stale-While-Revalidate Response Cache
//!
//! This module implements the caching layer in front of upstream market-data
//! providers.
//!
//! ## Features
//!
//! - **Freshness Tiers**: fresh, stale and expired, configured per resource kind
//! - **Background Refresh**: stale data is served immediately while a refresh runs
//! - **Single-Flight**: concurrent requests for one key share a single fetch
//! - **Error Fallback**: expired data backs a failed refetch up to a ceiling
//! - **Invalidation**: by key, glob pattern, full clear, or periodic sweep
//!
//! ## Layout
//!
//! - [`freshness`]: pure classification of an entry's age
//! - [`store`]: key to last successful fetch
//! - [`inflight`]: key to outstanding shared fetch
//! - [`orchestrator`]: the get-or-fetch decision procedure
//! - [`integration`]: key construction and the request-level facade

pub mod config;
pub mod entry;
pub mod freshness;
pub mod inflight;
pub mod integration;
pub mod invalidation;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder, FreshnessWindows};
pub use entry::CacheEntry;
pub use freshness::Freshness;
pub use inflight::InFlightTracker;
pub use integration::{CacheKeyBuilder, ResourceCache};
pub use invalidation::{InvalidationEvent, InvalidationReason, KeyPattern};
pub use orchestrator::{start_auto_sweep, Cache, CachedResponse};
pub use store::EntryStore;
pub use types::{CacheKey, CacheStats, EntryAge, Provenance, ResourceKind};
