//! Configuration for the cache system

use crate::cache::freshness::{classify, Freshness};
use crate::cache::types::ResourceKind;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Freshness windows for one resource kind
///
/// - `fresh`: served with no network activity
/// - `stale`: upper bound of the stale-while-revalidate band; `None` means a
///   single-tier resource that goes straight from fresh to expired
/// - `error_ceiling`: absolute age under which expired data may still be
///   served when a refetch fails; `None` disables that fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessWindows {
    pub fresh: Duration,
    pub stale: Option<Duration>,
    pub error_ceiling: Option<Duration>,
}

impl FreshnessWindows {
    /// Two-tier windows with no emergency fallback
    pub fn new(fresh: Duration, stale: Duration) -> Self {
        Self {
            fresh,
            stale: Some(stale),
            error_ceiling: None,
        }
    }

    /// Fresh-or-expired windows with no stale band
    pub fn single_tier(fresh: Duration) -> Self {
        Self {
            fresh,
            stale: None,
            error_ceiling: None,
        }
    }

    pub fn with_error_ceiling(mut self, ceiling: Duration) -> Self {
        self.error_ceiling = Some(ceiling);
        self
    }

    /// Upper bound of the stale band (equal to `fresh` for single-tier windows)
    pub fn stale_window(&self) -> Duration {
        self.stale.unwrap_or(self.fresh)
    }

    pub fn classify(&self, now: Instant, fetched_at: Instant) -> Freshness {
        classify(now, fetched_at, self.fresh, self.stale_window())
    }

    /// Whether expired data of this age may still back a failed refetch
    pub fn within_error_ceiling(&self, age: Duration) -> bool {
        self.error_ceiling.map_or(false, |ceiling| age < ceiling)
    }

    /// `Cache-Control` header value matching these windows
    pub fn cache_control(&self) -> String {
        match self.stale {
            Some(stale) => format!(
                "public, s-maxage={}, stale-while-revalidate={}",
                self.fresh.as_secs(),
                stale.as_secs()
            ),
            None => format!("public, s-maxage={}", self.fresh.as_secs()),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.fresh.is_zero() {
            return Err("fresh window must be greater than 0".to_string());
        }
        if let Some(stale) = self.stale {
            if stale <= self.fresh {
                return Err(format!(
                    "stale window ({:?}) must be longer than fresh window ({:?})",
                    stale, self.fresh
                ));
            }
        }
        if let Some(ceiling) = self.error_ceiling {
            if ceiling < self.stale_window() {
                return Err(format!(
                    "error ceiling ({:?}) must not be shorter than the stale window ({:?})",
                    ceiling,
                    self.stale_window()
                ));
            }
        }
        Ok(())
    }

    /// Defaults observed for each resource kind
    pub fn defaults_for(kind: ResourceKind) -> Self {
        let secs = Duration::from_secs;
        match kind {
            ResourceKind::CoinDetail | ResourceKind::MarketChart | ResourceKind::GlobalStats => {
                Self::new(secs(60), secs(300)).with_error_ceiling(secs(1800))
            }
            ResourceKind::Trending => Self::new(secs(300), secs(1800)).with_error_ceiling(secs(3600)),
            ResourceKind::QuotePrices => {
                Self::new(secs(180), secs(1800)).with_error_ceiling(secs(3600))
            }
            ResourceKind::ConversionRate => Self::single_tier(secs(30)),
        }
    }
}

/// Configuration for the response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness windows per resource kind
    pub windows: BTreeMap<ResourceKind, FreshnessWindows>,

    /// Caller-side bound on a blocking fetch
    pub fetch_timeout: Duration,

    /// Run the periodic sweep
    pub enable_auto_sweep: bool,

    /// Interval between sweeps
    pub sweep_interval: Duration,

    /// Entries at least this old are dropped by the sweep
    pub sweep_max_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            windows: ResourceKind::ALL
                .iter()
                .map(|kind| (*kind, FreshnessWindows::defaults_for(*kind)))
                .collect(),
            fetch_timeout: Duration::from_secs(10),
            enable_auto_sweep: true,
            // Sweep every 5 minutes
            sweep_interval: Duration::from_secs(300),
            sweep_max_age: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Windows for a kind, falling back to the built-in defaults
    pub fn windows_for(&self, kind: ResourceKind) -> FreshnessWindows {
        self.windows
            .get(&kind)
            .copied()
            .unwrap_or_else(|| FreshnessWindows::defaults_for(kind))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout.is_zero() {
            return Err(CacheError::ConfigError(
                "fetch_timeout must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(CacheError::ConfigError(
                "sweep_interval must be greater than 0".to_string(),
            ));
        }

        for (kind, windows) in &self.windows {
            windows
                .validate()
                .map_err(|e| CacheError::ConfigError(format!("{}: {}", kind, e)))?;

            let longest = windows.error_ceiling.unwrap_or(windows.stale_window());
            if longest > self.sweep_max_age {
                return Err(CacheError::ConfigError(format!(
                    "{}: sweep_max_age ({:?}) would drop entries still usable for {:?}",
                    kind, self.sweep_max_age, longest
                )));
            }
        }

        Ok(())
    }

    /// Load configuration from the environment (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(timeout) = parse_secs(&lookup, "COINWATCH_FETCH_TIMEOUT_SECS")? {
            config.fetch_timeout = timeout;
        }
        if let Some(interval) = parse_secs(&lookup, "COINWATCH_SWEEP_INTERVAL_SECS")? {
            config.sweep_interval = interval;
        }
        if let Some(max_age) = parse_secs(&lookup, "COINWATCH_SWEEP_MAX_AGE_SECS")? {
            config.sweep_max_age = max_age;
        }
        if let Some(raw) = lookup("COINWATCH_AUTO_SWEEP") {
            config.enable_auto_sweep = parse_bool(&raw).ok_or_else(|| {
                CacheError::ConfigError(format!("COINWATCH_AUTO_SWEEP: invalid boolean '{}'", raw))
            })?;
        }

        for kind in ResourceKind::ALL {
            let prefix = format!("COINWATCH_{}", kind.as_str().to_uppercase());
            let mut windows = config.windows_for(kind);

            if let Some(fresh) = parse_secs(&lookup, &format!("{}_FRESH_SECS", prefix))? {
                windows.fresh = fresh;
            }
            if let Some(stale) = parse_secs(&lookup, &format!("{}_STALE_SECS", prefix))? {
                windows.stale = Some(stale);
            }
            if let Some(ceiling) = parse_secs(&lookup, &format!("{}_CEILING_SECS", prefix))? {
                windows.error_ceiling = Some(ceiling);
            }

            config.windows.insert(kind, windows);
        }

        config.validate()?;
        debug!("Loaded cache configuration from environment: {:?}", config);
        Ok(config)
    }
}

fn parse_secs<F>(lookup: &F, name: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| CacheError::ConfigError(format!("{}: '{}' ({})", name, raw, e))),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    windows: BTreeMap<ResourceKind, FreshnessWindows>,
    fetch_timeout: Option<Duration>,
    enable_auto_sweep: Option<bool>,
    sweep_interval: Option<Duration>,
    sweep_max_age: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Override the windows of one resource kind
    pub fn windows(mut self, kind: ResourceKind, windows: FreshnessWindows) -> Self {
        self.windows.insert(kind, windows);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn enable_auto_sweep(mut self, enable: bool) -> Self {
        self.enable_auto_sweep = Some(enable);
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn sweep_max_age(mut self, max_age: Duration) -> Self {
        self.sweep_max_age = Some(max_age);
        self
    }

    pub fn build(self) -> CacheConfig {
        let mut config = CacheConfig::default();
        config.windows.extend(self.windows);
        config.fetch_timeout = self.fetch_timeout.unwrap_or(config.fetch_timeout);
        config.enable_auto_sweep = self.enable_auto_sweep.unwrap_or(config.enable_auto_sweep);
        config.sweep_interval = self.sweep_interval.unwrap_or(config.sweep_interval);
        config.sweep_max_age = self.sweep_max_age.unwrap_or(config.sweep_max_age);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert!(config.enable_auto_sweep);
        assert_eq!(config.windows.len(), ResourceKind::ALL.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_windows_table() {
        let config = CacheConfig::default();

        let detail = config.windows_for(ResourceKind::CoinDetail);
        assert_eq!(detail.fresh, Duration::from_secs(60));
        assert_eq!(detail.stale, Some(Duration::from_secs(300)));

        let trending = config.windows_for(ResourceKind::Trending);
        assert_eq!(trending.fresh, Duration::from_secs(300));
        assert_eq!(trending.stale, Some(Duration::from_secs(1800)));

        let quotes = config.windows_for(ResourceKind::QuotePrices);
        assert_eq!(quotes.fresh, Duration::from_secs(180));

        let fx = config.windows_for(ResourceKind::ConversionRate);
        assert_eq!(fx.fresh, Duration::from_secs(30));
        assert_eq!(fx.stale, None);
        assert_eq!(fx.stale_window(), Duration::from_secs(30));
    }

    #[test]
    fn test_windows_validation() {
        let inverted = FreshnessWindows::new(Duration::from_secs(300), Duration::from_secs(60));
        assert!(inverted.validate().is_err());

        let zero = FreshnessWindows::single_tier(Duration::ZERO);
        assert!(zero.validate().is_err());

        let short_ceiling = FreshnessWindows::new(Duration::from_secs(60), Duration::from_secs(300))
            .with_error_ceiling(Duration::from_secs(120));
        assert!(short_ceiling.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_sweep_shorter_than_ceiling() {
        let config = CacheConfig::builder()
            .sweep_max_age(Duration::from_secs(600))
            .build();
        assert!(matches!(config.validate(), Err(CacheError::ConfigError(_))));
    }

    #[test]
    fn test_config_builder() {
        let windows = FreshnessWindows::new(Duration::from_secs(5), Duration::from_secs(10));
        let config = CacheConfig::builder()
            .windows(ResourceKind::Trending, windows)
            .fetch_timeout(Duration::from_secs(2))
            .enable_auto_sweep(false)
            .build();

        assert_eq!(config.windows_for(ResourceKind::Trending), windows);
        assert_eq!(config.fetch_timeout, Duration::from_secs(2));
        assert!(!config.enable_auto_sweep);
        // Untouched kinds keep their defaults
        assert_eq!(
            config.windows_for(ResourceKind::CoinDetail),
            FreshnessWindows::defaults_for(ResourceKind::CoinDetail)
        );
    }

    #[test]
    fn test_error_ceiling() {
        let windows = FreshnessWindows::defaults_for(ResourceKind::CoinDetail);
        assert!(windows.within_error_ceiling(Duration::from_secs(400)));
        assert!(!windows.within_error_ceiling(Duration::from_secs(1800)));

        let fx = FreshnessWindows::defaults_for(ResourceKind::ConversionRate);
        assert!(!fx.within_error_ceiling(Duration::from_secs(31)));
    }

    #[test]
    fn test_cache_control() {
        let detail = FreshnessWindows::defaults_for(ResourceKind::CoinDetail);
        assert_eq!(
            detail.cache_control(),
            "public, s-maxage=60, stale-while-revalidate=300"
        );

        let fx = FreshnessWindows::defaults_for(ResourceKind::ConversionRate);
        assert_eq!(fx.cache_control(), "public, s-maxage=30");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("COINWATCH_FETCH_TIMEOUT_SECS", "4"),
            ("COINWATCH_AUTO_SWEEP", "false"),
            ("COINWATCH_TRENDING_FRESH_SECS", "120"),
            ("COINWATCH_CONVERSION_RATE_STALE_SECS", "90"),
        ]))
        .unwrap();

        assert_eq!(config.fetch_timeout, Duration::from_secs(4));
        assert!(!config.enable_auto_sweep);
        assert_eq!(
            config.windows_for(ResourceKind::Trending).fresh,
            Duration::from_secs(120)
        );
        assert_eq!(
            config.windows_for(ResourceKind::ConversionRate).stale,
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = CacheConfig::from_lookup(lookup_from(&[("COINWATCH_FETCH_TIMEOUT_SECS", "ten")]));
        assert!(matches!(result, Err(CacheError::ConfigError(_))));

        let result = CacheConfig::from_lookup(lookup_from(&[("COINWATCH_AUTO_SWEEP", "maybe")]));
        assert!(matches!(result, Err(CacheError::ConfigError(_))));

        // Overrides that break the fresh < stale invariant are rejected too
        let result =
            CacheConfig::from_lookup(lookup_from(&[("COINWATCH_COIN_DETAIL_FRESH_SECS", "900")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serializes() {
        let config = CacheConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("coin_detail"));
        let back: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.windows, config.windows);
    }
}
