//! Core type definitions for the cache system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Opaque, deterministic identifier of a requested resource and its parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Resource kinds with their own freshness windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    CoinDetail,
    MarketChart,
    GlobalStats,
    Trending,
    QuotePrices,
    ConversionRate,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::CoinDetail,
        ResourceKind::MarketChart,
        ResourceKind::GlobalStats,
        ResourceKind::Trending,
        ResourceKind::QuotePrices,
        ResourceKind::ConversionRate,
    ];

    /// Key prefix and config name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::CoinDetail => "coin_detail",
            ResourceKind::MarketChart => "market_chart",
            ResourceKind::GlobalStats => "global_stats",
            ResourceKind::Trending => "trending",
            ResourceKind::QuotePrices => "quote_prices",
            ResourceKind::ConversionRate => "conversion_rate",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a response was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Fresh cached data, no network activity
    Hit,
    /// Stale cached data, background refresh triggered
    Stale,
    /// Freshly fetched
    Miss,
    /// Expired cached data served because the refetch failed
    ErrorStale,
}

impl Provenance {
    /// Value for the `X-Cache` response header
    pub fn header_value(&self) -> &'static str {
        match self {
            Provenance::Hit => "HIT",
            Provenance::Stale => "STALE",
            Provenance::Miss => "MISS",
            Provenance::ErrorStale => "ERROR-STALE",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Hit => write!(f, "hit"),
            Provenance::Stale => write!(f, "stale"),
            Provenance::Miss => write!(f, "miss"),
            Provenance::ErrorStale => write!(f, "error-stale"),
        }
    }
}

/// Age of one stored entry, for introspection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryAge {
    pub key: CacheKey,
    pub age: Duration,
    pub source: String,
    /// Wall-clock time the payload was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Statistics snapshot for operational introspection
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Number of entries currently stored
    pub entry_count: usize,

    /// Number of fetches currently outstanding
    pub in_flight_count: usize,

    /// Age of every stored entry, oldest first
    pub entry_ages: Vec<EntryAge>,

    /// Fresh hits
    pub hits: u64,

    /// Stale hits (served while refreshing in the background)
    pub stale_hits: u64,

    /// Responses that required a fetch
    pub misses: u64,

    /// Expired data served after a failed refetch
    pub error_stale: u64,

    /// Callers that joined a fetch started by another caller
    pub coalesced: u64,

    /// Background refreshes started
    pub background_refreshes: u64,

    /// Background refreshes that failed
    pub background_failures: u64,

    /// Entries removed by explicit invalidation
    pub invalidations: u64,

    /// Entries removed by the periodic sweep
    pub swept: u64,
}

impl CacheStats {
    /// Share of responses served from cache (fresh or stale) as a percentage
    pub fn hit_rate(&self) -> f64 {
        let served_from_cache = self.hits + self.stale_hits;
        let total = served_from_cache + self.misses + self.error_stale;
        if total == 0 {
            0.0
        } else {
            (served_from_cache as f64 / total as f64) * 100.0
        }
    }

    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ entries: {}, in_flight: {}, hits: {}, stale: {}, misses: {}, error_stale: {}, hit_rate: {:.2}% }}",
            self.entry_count,
            self.in_flight_count,
            self.hits,
            self.stale_hits,
            self.misses,
            self.error_stale,
            self.hit_rate()
        )
    }
}

/// Lock-free counters updated on the request path
#[derive(Debug, Default)]
pub(crate) struct CacheMetrics {
    pub hits: AtomicU64,
    pub stale_hits: AtomicU64,
    pub misses: AtomicU64,
    pub error_stale: AtomicU64,
    pub coalesced: AtomicU64,
    pub background_refreshes: AtomicU64,
    pub background_failures: AtomicU64,
    pub invalidations: AtomicU64,
    pub swept: AtomicU64,
}

impl CacheMetrics {
    pub fn record(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy counters into a stats snapshot
    pub fn fill(&self, stats: &mut CacheStats) {
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.stale_hits = self.stale_hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
        stats.error_stale = self.error_stale.load(Ordering::Relaxed);
        stats.coalesced = self.coalesced.load(Ordering::Relaxed);
        stats.background_refreshes = self.background_refreshes.load(Ordering::Relaxed);
        stats.background_failures = self.background_failures.load(Ordering::Relaxed);
        stats.invalidations = self.invalidations.load(Ordering::Relaxed);
        stats.swept = self.swept.load(Ordering::Relaxed);
    }
}
