//! Integration points between resource requests, providers and the cache
//!
//! This module ties the pieces together for callers that speak in
//! [`ResourceRequest`]s rather than raw keys:
//! - Deterministic cache key construction
//! - A per-kind cache facade that validates, keys, picks windows and binds
//!   the provider chain as the fetcher

use crate::cache::config::FreshnessWindows;
use crate::cache::orchestrator::{Cache, CachedResponse};
use crate::cache::types::{CacheKey, ResourceKind};
use crate::error::Result;
use crate::provider::{ProviderChain, ResourceRequest};
use std::sync::Arc;
use tracing::debug;

/// Cache key builder for resource requests
///
/// Produces `kind`, `kind:identifier`, or either followed by
/// `?name=value&...` with parameters sorted by name.
pub struct CacheKeyBuilder {
    kind: ResourceKind,
    identifier: Option<String>,
    params: Vec<(String, String)>,
}

impl CacheKeyBuilder {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            identifier: None,
            params: Vec::new(),
        }
    }

    /// Set the primary identifier
    pub fn identifier(mut self, id: impl Into<String>) -> Self {
        self.identifier = Some(id.into());
        self
    }

    /// Add a parameter to the key
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Build the cache key
    pub fn build(mut self) -> CacheKey {
        let mut key = self.kind.as_str().to_string();

        if let Some(id) = &self.identifier {
            key.push(':');
            key.push_str(id);
        }

        if !self.params.is_empty() {
            self.params.sort();
            let params_str: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push('?');
            key.push_str(&params_str.join("&"));
        }

        CacheKey::new(key)
    }
}

/// Response cache bound to a provider chain
///
/// Callers hand in a [`ResourceRequest`]; the facade validates it, derives
/// the key, looks up the windows for its kind and fetches the canonical form
/// through the chain when the cache needs to.
pub struct ResourceCache<T> {
    cache: Cache<T>,
    chain: Arc<ProviderChain<T>>,
}

impl<T> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<T> ResourceCache<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(cache: Cache<T>, chain: ProviderChain<T>) -> Self {
        Self {
            cache,
            chain: Arc::new(chain),
        }
    }

    pub async fn get(&self, request: &ResourceRequest) -> Result<CachedResponse<T>> {
        let key = request.cache_key()?;
        let windows = self.windows_for(request.kind());
        debug!("Resolving {} via {}", key, request.kind());

        let fetcher = self.chain.fetcher(request.canonical());
        self.cache.get_or_fetch(&key, &windows, fetcher).await
    }

    pub fn windows_for(&self, kind: ResourceKind) -> FreshnessWindows {
        self.cache.config().windows_for(kind)
    }

    pub fn cache(&self) -> &Cache<T> {
        &self.cache
    }

    pub fn chain(&self) -> &ProviderChain<T> {
        &self.chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::cache::types::Provenance;
    use crate::error::ProviderError;
    use crate::provider::{DataProvider, ProviderId};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[test]
    fn test_cache_key_builder() {
        let key = CacheKeyBuilder::new(ResourceKind::MarketChart)
            .identifier("bitcoin")
            .param("vs", "usd")
            .param("days", "7")
            .build();
        assert_eq!(key.as_str(), "market_chart:bitcoin?days=7&vs=usd");

        let key = CacheKeyBuilder::new(ResourceKind::Trending).build();
        assert_eq!(key.as_str(), "trending");

        let key = CacheKeyBuilder::new(ResourceKind::CoinDetail)
            .identifier("ethereum")
            .build();
        assert_eq!(key.as_str(), "coin_detail:ethereum");
    }

    /// Records every request it is handed
    struct Recorder {
        seen: Mutex<Vec<ResourceRequest>>,
    }

    #[async_trait]
    impl DataProvider<String> for Recorder {
        fn id(&self) -> ProviderId {
            ProviderId::new("recorder")
        }

        async fn fetch(&self, request: &ResourceRequest) -> std::result::Result<String, ProviderError> {
            self.seen.lock().push(request.clone());
            Ok(format!("{:?}", request.kind()))
        }
    }

    #[tokio::test]
    async fn test_resource_cache_fetches_canonical_request() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let chain = ProviderChain::new(vec![recorder.clone() as Arc<dyn DataProvider<String>>]);
        let cache = ResourceCache::new(Cache::new(CacheConfig::default()), chain);

        let forward = cache
            .get(&ResourceRequest::conversion_rate("USD", "BTC"))
            .await
            .unwrap();
        assert_eq!(forward.provenance, Provenance::Miss);
        assert_eq!(forward.source.as_str(), "recorder");

        let backward = cache
            .get(&ResourceRequest::conversion_rate("btc", "usd"))
            .await
            .unwrap();
        assert_eq!(backward.provenance, Provenance::Hit);

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ResourceRequest::conversion_rate("btc", "usd"));
    }

    #[tokio::test]
    async fn test_resource_cache_rejects_invalid_request() {
        let chain: ProviderChain<String> = ProviderChain::new(Vec::new());
        let cache = ResourceCache::new(Cache::new(CacheConfig::default()), chain);

        let err = cache
            .get(&ResourceRequest::coin_detail(""))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(cache.cache().is_empty());
    }
}
