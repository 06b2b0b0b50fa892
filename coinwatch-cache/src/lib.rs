//! # Coinwatch Response Cache (coinwatch-cache)
//!
//! An in-process, stale-while-revalidate cache for market-data API responses,
//! fronting unreliable upstream providers through an ordered fallback chain.
//!
//! ## Features
//!
//! - Per-resource freshness windows (fresh, stale, error ceiling)
//! - Background refresh of stale entries, never blocking the caller
//! - Single-flight coalescing of concurrent fetches for the same key
//! - Serving expired data when a refetch fails, up to a hard ceiling
//! - Provider fallback chain with per-provider timeouts
//! - Manual invalidation by key or glob pattern, and a periodic sweep
//!
//! ## Serving through a provider chain
//!
//! ```no_run
//! use async_trait::async_trait;
//! use coinwatch_cache::{
//!     Cache, CacheConfig, DataProvider, ProviderChain, ProviderError, ProviderId,
//!     ResourceCache, ResourceRequest,
//! };
//! use std::sync::Arc;
//!
//! struct Upstream;
//!
//! #[async_trait]
//! impl DataProvider<String> for Upstream {
//!     fn id(&self) -> ProviderId {
//!         ProviderId::new("upstream")
//!     }
//!
//!     async fn fetch(&self, request: &ResourceRequest) -> Result<String, ProviderError> {
//!         Ok(format!("payload for {}", request.kind()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> coinwatch_cache::Result<()> {
//!     let chain = ProviderChain::new(vec![Arc::new(Upstream) as Arc<dyn DataProvider<String>>]);
//!     let cache = ResourceCache::new(Cache::new(CacheConfig::from_env()?), chain);
//!
//!     let response = cache.get(&ResourceRequest::coin_detail("bitcoin")).await?;
//!     println!("{} ({}, served by {})", response.data, response.x_cache(), response.source);
//!     Ok(())
//! }
//! ```
//!
//! ## Raw keys
//!
//! [`Cache::get_or_fetch`] works on any key with explicit windows and a
//! fetch closure.
//!
//! ```no_run
//! use coinwatch_cache::{Cache, CacheConfig, CacheKey, FreshnessWindows, ProviderId, ProviderResult};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> coinwatch_cache::Result<()> {
//!     let cache: Cache<u64> = Cache::new(CacheConfig::default());
//!     let windows = FreshnessWindows::new(Duration::from_secs(60), Duration::from_secs(300));
//!
//!     let response = cache
//!         .get_or_fetch(&CacheKey::from("block_height"), &windows, || async {
//!             Ok(ProviderResult::new(840_000, ProviderId::new("node")))
//!         })
//!         .await?;
//!     println!("height {} ({})", response.data, response.provenance);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod error;
pub mod provider;

// Re-export main types for convenience
pub use cache::{
    start_auto_sweep, Cache, CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey,
    CacheKeyBuilder, CacheStats, CachedResponse, EntryAge, Freshness, FreshnessWindows,
    InvalidationEvent, InvalidationReason, Provenance, ResourceCache, ResourceKind,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, ProviderError, Result};
pub use provider::{
    DataProvider, FailedAttempt, ProviderChain, ProviderId, ProviderResult, ResourceRequest,
    DEFAULT_PROVIDER_TIMEOUT,
};
