//! Get-or-fetch orchestration
//!
//! [`Cache::get_or_fetch`] decides per request whether to serve cached data,
//! serve it while refreshing in the background, join an outstanding fetch, or
//! block on a new one:
//!
//! | entry state | action                                   | provenance    |
//! |-------------|------------------------------------------|---------------|
//! | absent      | blocking fetch (coalesced)               | `miss`        |
//! | fresh       | serve                                    | `hit`         |
//! | stale       | serve, refresh in background (coalesced) | `stale`       |
//! | expired     | blocking fetch (coalesced)               | `miss`        |
//! | expired     | fetch failed, age under error ceiling    | `error-stale` |
//!
//! Every fetch runs as one shared future per key. On success it writes the
//! store exactly once, so the number of waiters never changes the number of
//! writes. A failed fetch never touches the store.

use crate::cache::config::{CacheConfig, FreshnessWindows};
use crate::cache::entry::CacheEntry;
use crate::cache::freshness::Freshness;
use crate::cache::inflight::{InFlightTracker, SharedFetch};
use crate::cache::invalidation::{InvalidationEvent, InvalidationReason, KeyPattern};
use crate::cache::store::EntryStore;
use crate::cache::types::{CacheKey, CacheMetrics, CacheStats, Provenance};
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::provider::{FailedAttempt, ProviderId, ProviderResult};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type FetchOutcome<T> = std::result::Result<Arc<CacheEntry<T>>, CacheError>;

/// A payload together with how it was produced
#[derive(Debug)]
pub struct CachedResponse<T> {
    pub data: Arc<T>,
    pub provenance: Provenance,
    /// Provider that produced the payload
    pub source: ProviderId,
    /// Age of the payload when it was served
    pub age: Duration,
    /// This caller joined a fetch another caller started
    pub coalesced: bool,
    /// Providers that failed before `source` answered
    pub failed_attempts: Vec<FailedAttempt>,
}

impl<T> Clone for CachedResponse<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            provenance: self.provenance,
            source: self.source.clone(),
            age: self.age,
            coalesced: self.coalesced,
            failed_attempts: self.failed_attempts.clone(),
        }
    }
}

impl<T> CachedResponse<T> {
    fn from_entry(entry: &CacheEntry<T>, provenance: Provenance, age: Duration, coalesced: bool) -> Self {
        Self {
            data: Arc::clone(&entry.data),
            provenance,
            source: entry.source.clone(),
            age,
            coalesced,
            failed_attempts: entry.failed_attempts.clone(),
        }
    }

    /// Whether a provider other than the first produced the payload
    pub fn used_fallback(&self) -> bool {
        !self.failed_attempts.is_empty()
    }

    /// `X-Cache` header value; a miss that joined another caller's fetch reports `PENDING`
    pub fn x_cache(&self) -> &'static str {
        if self.coalesced && self.provenance == Provenance::Miss {
            "PENDING"
        } else {
            self.provenance.header_value()
        }
    }
}

struct CacheInner<T> {
    config: CacheConfig,
    store: Arc<EntryStore<T>>,
    in_flight: InFlightTracker<FetchOutcome<T>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
}

/// Stale-while-revalidate response cache
///
/// Cheap to clone; clones share the same store and in-flight fetches.
pub struct Cache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Cache<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache driven by an explicit time source
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            "Initializing response cache (fetch timeout: {:?}, sweep max age: {:?})",
            config.fetch_timeout, config.sweep_max_age
        );

        Self {
            inner: Arc::new(CacheInner {
                config,
                store: Arc::new(EntryStore::new()),
                in_flight: InFlightTracker::new(),
                clock,
                metrics: Arc::new(CacheMetrics::default()),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Serve `key` under `windows`, fetching through `fetcher` when needed.
    ///
    /// `fetcher` is only invoked when this call starts a new fetch; callers
    /// that join an outstanding fetch drop theirs unused.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &CacheKey,
        windows: &FreshnessWindows,
        fetcher: F,
    ) -> Result<CachedResponse<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProviderResult<T>>> + Send + 'static,
    {
        let metrics = &self.inner.metrics;
        let now = self.inner.clock.now();

        let entry = match self.inner.store.lookup(key) {
            Some(entry) => entry,
            None => {
                debug!("Cache miss: {}", key);
                let (fetched, coalesced) = self.fetch_blocking(key, fetcher).await?;
                metrics.record(&metrics.misses, 1);
                let age = fetched.age(self.inner.clock.now());
                return Ok(CachedResponse::from_entry(&fetched, Provenance::Miss, age, coalesced));
            }
        };

        let age = entry.age(now);
        match entry.freshness(now, windows) {
            Freshness::Fresh => {
                debug!("Cache hit: {} (age {:?})", key, age);
                metrics.record(&metrics.hits, 1);
                Ok(CachedResponse::from_entry(&entry, Provenance::Hit, age, false))
            }
            Freshness::Stale => {
                debug!("Serving stale entry: {} (age {:?})", key, age);
                metrics.record(&metrics.stale_hits, 1);
                self.refresh_in_background(key, fetcher);
                Ok(CachedResponse::from_entry(&entry, Provenance::Stale, age, false))
            }
            Freshness::Expired => {
                debug!("Cache entry expired: {} (age {:?})", key, age);
                match self.fetch_blocking(key, fetcher).await {
                    Ok((fetched, coalesced)) => {
                        metrics.record(&metrics.misses, 1);
                        let age = fetched.age(self.inner.clock.now());
                        Ok(CachedResponse::from_entry(&fetched, Provenance::Miss, age, coalesced))
                    }
                    Err(err) => {
                        let age = entry.age(self.inner.clock.now());
                        if windows.within_error_ceiling(age) {
                            warn!(
                                "Refetch of {} failed, serving expired entry (age {:?}): {}",
                                key, age, err
                            );
                            metrics.record(&metrics.error_stale, 1);
                            Ok(CachedResponse::from_entry(&entry, Provenance::ErrorStale, age, false))
                        } else {
                            warn!("Refetch of {} failed past the error ceiling: {}", key, err);
                            Err(err)
                        }
                    }
                }
            }
        }
    }

    /// Read an entry without triggering any fetch
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<CacheEntry<T>>> {
        self.inner.store.lookup(key)
    }

    /// Seed or overwrite an entry directly, as if `source` had just answered
    pub fn insert(&self, key: CacheKey, data: T, source: ProviderId) -> Arc<CacheEntry<T>> {
        let entry = Arc::new(CacheEntry::new(data, source, self.inner.clock.now()));
        self.inner.store.store(key, Arc::clone(&entry));
        entry
    }

    /// Remove one key; outstanding fetches for it are not cancelled
    pub fn invalidate(&self, key: &CacheKey) -> InvalidationEvent {
        let removed = match self.inner.store.remove(key) {
            Some(_) => vec![key.clone()],
            None => Vec::new(),
        };
        self.record_invalidation(InvalidationReason::Manual, removed)
    }

    /// Remove every key matching a glob pattern
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<InvalidationEvent> {
        let pattern = KeyPattern::parse(pattern)?;
        let removed = self.inner.store.remove_matching(|key| pattern.matches(key));
        Ok(self.record_invalidation(
            InvalidationReason::PatternMatch {
                pattern: pattern.as_str().to_string(),
            },
            removed,
        ))
    }

    pub fn clear(&self) -> InvalidationEvent {
        let removed = self.inner.store.clear();
        self.record_invalidation(InvalidationReason::Cleared, removed)
    }

    /// Drop entries older than the configured maximum age
    pub fn sweep(&self) -> InvalidationEvent {
        let max_age = self.inner.config.sweep_max_age;
        let removed = self.inner.store.sweep(self.inner.clock.now(), max_age);

        let metrics = &self.inner.metrics;
        metrics.record(&metrics.swept, removed.len() as u64);
        if !removed.is_empty() {
            debug!("Swept {} entries older than {:?}", removed.len(), max_age);
        }
        InvalidationEvent::new(InvalidationReason::Swept { max_age }, removed)
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            entry_count: self.inner.store.len(),
            in_flight_count: self.inner.in_flight.len(),
            entry_ages: self.inner.store.ages(self.inner.clock.now()),
            ..Default::default()
        };
        self.inner.metrics.fill(&mut stats);
        stats
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    fn record_invalidation(
        &self,
        reason: InvalidationReason,
        removed: Vec<CacheKey>,
    ) -> InvalidationEvent {
        let metrics = &self.inner.metrics;
        metrics.record(&metrics.invalidations, removed.len() as u64);
        info!("Invalidated {} entries ({})", removed.len(), reason);
        InvalidationEvent::new(reason, removed)
    }

    /// Start (or join) the shared fetch for `key`
    fn start_fetch<F, Fut>(&self, key: &CacheKey, fetcher: F) -> (SharedFetch<FetchOutcome<T>>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProviderResult<T>>> + Send + 'static,
    {
        let store = Arc::clone(&self.inner.store);
        let clock = Arc::clone(&self.inner.clock);
        let fetch_key = key.clone();

        self.inner.in_flight.get_or_create(key, move || {
            let operation = fetcher();
            async move {
                match AssertUnwindSafe(operation).catch_unwind().await {
                    Ok(Ok(provided)) => {
                        let entry = Arc::new(
                            CacheEntry::new(provided.payload, provided.provider_id, clock.now())
                                .with_failed_attempts(provided.failed_attempts),
                        );
                        store.store(fetch_key, Arc::clone(&entry));
                        Ok(entry)
                    }
                    Ok(Err(err)) => Err(err),
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        warn!("Fetch for {} panicked: {}", fetch_key, message);
                        Err(CacheError::FetchPanicked {
                            key: fetch_key.to_string(),
                            message,
                        })
                    }
                }
            }
        })
    }

    /// Wait for the shared fetch, bounded by the configured fetch timeout.
    ///
    /// Returns the new entry and whether this caller joined another's fetch.
    async fn fetch_blocking<F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<(Arc<CacheEntry<T>>, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProviderResult<T>>> + Send + 'static,
    {
        let (fetch, created) = self.start_fetch(key, fetcher);
        let coalesced = !created;
        if coalesced {
            let metrics = &self.inner.metrics;
            metrics.record(&metrics.coalesced, 1);
            debug!("Joined in-flight fetch for {}", key);
        }

        let timeout = self.inner.config.fetch_timeout;
        match tokio::time::timeout(timeout, fetch).await {
            Ok(outcome) => outcome.map(|entry| (entry, coalesced)),
            Err(_) => {
                warn!("Fetch for {} did not settle within {:?}", key, timeout);
                Err(CacheError::FetchTimeout {
                    key: key.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    fn refresh_in_background<F, Fut>(&self, key: &CacheKey, fetcher: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProviderResult<T>>> + Send + 'static,
    {
        let (fetch, created) = self.start_fetch(key, fetcher);
        if !created {
            debug!("Refresh for {} already in flight", key);
            return;
        }

        let metrics = Arc::clone(&self.inner.metrics);
        metrics.record(&metrics.background_refreshes, 1);

        let refresh_key = key.clone();
        tokio::spawn(async move {
            if let Err(err) = fetch.await {
                warn!("Background refresh of {} failed: {}", refresh_key, err);
                metrics.record(&metrics.background_failures, 1);
            }
        });
    }
}

/// Periodically sweep entries older than the configured maximum age.
///
/// Runs until the task is aborted; spawn it with `tokio::spawn`.
pub async fn start_auto_sweep<T>(cache: Cache<T>)
where
    T: Send + Sync + 'static,
{
    let interval = cache.config().sweep_interval;
    info!("Starting automatic cache sweep task (interval: {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;

        let event = cache.sweep();
        if !event.is_empty() {
            debug!("Auto sweep removed {} entries", event.count());
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
