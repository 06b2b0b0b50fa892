//! Resource descriptors and cache key derivation
//!
//! A [`ResourceRequest`] names one upstream resource plus its parameters. The
//! same descriptor is handed to providers and turned into the [`CacheKey`], so
//! the key always reflects exactly what was fetched. Parameters are normalised
//! (trimmed, lower-cased, list parameters sorted and deduplicated) and a
//! conversion pair is ordered, which makes `(A, B)` and `(B, A)` share a key.

use crate::cache::integration::CacheKeyBuilder;
use crate::cache::types::{CacheKey, ResourceKind};
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};

/// Longest accepted market-chart range
pub const MAX_CHART_DAYS: u32 = 3650;

/// Most ids accepted in one batch quote
pub const MAX_BATCH_IDS: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceRequest {
    CoinDetail {
        id: String,
    },
    MarketChart {
        id: String,
        vs_currency: String,
        days: u32,
    },
    GlobalStats,
    Trending,
    QuotePrices {
        ids: Vec<String>,
        vs_currencies: Vec<String>,
    },
    ConversionRate {
        from: String,
        to: String,
    },
}

impl ResourceRequest {
    pub fn coin_detail(id: impl Into<String>) -> Self {
        ResourceRequest::CoinDetail { id: id.into() }
    }

    pub fn market_chart(id: impl Into<String>, vs_currency: impl Into<String>, days: u32) -> Self {
        ResourceRequest::MarketChart {
            id: id.into(),
            vs_currency: vs_currency.into(),
            days,
        }
    }

    pub fn quote_prices<I, S>(ids: I, vs_currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResourceRequest::QuotePrices {
            ids: ids.into_iter().map(Into::into).collect(),
            vs_currencies: vs_currencies.into_iter().map(Into::into).collect(),
        }
    }

    pub fn conversion_rate(from: impl Into<String>, to: impl Into<String>) -> Self {
        ResourceRequest::ConversionRate {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceRequest::CoinDetail { .. } => ResourceKind::CoinDetail,
            ResourceRequest::MarketChart { .. } => ResourceKind::MarketChart,
            ResourceRequest::GlobalStats => ResourceKind::GlobalStats,
            ResourceRequest::Trending => ResourceKind::Trending,
            ResourceRequest::QuotePrices { .. } => ResourceKind::QuotePrices,
            ResourceRequest::ConversionRate { .. } => ResourceKind::ConversionRate,
        }
    }

    /// Trimmed, lower-cased parameters; list parameters sorted and deduplicated
    pub fn normalized(&self) -> Self {
        match self {
            ResourceRequest::CoinDetail { id } => ResourceRequest::CoinDetail { id: norm(id) },
            ResourceRequest::MarketChart {
                id,
                vs_currency,
                days,
            } => ResourceRequest::MarketChart {
                id: norm(id),
                vs_currency: norm(vs_currency),
                days: *days,
            },
            ResourceRequest::GlobalStats => ResourceRequest::GlobalStats,
            ResourceRequest::Trending => ResourceRequest::Trending,
            ResourceRequest::QuotePrices { ids, vs_currencies } => ResourceRequest::QuotePrices {
                ids: norm_list(ids),
                vs_currencies: norm_list(vs_currencies),
            },
            ResourceRequest::ConversionRate { from, to } => ResourceRequest::ConversionRate {
                from: norm(from),
                to: norm(to),
            },
        }
    }

    /// The descriptor actually fetched and stored.
    ///
    /// Identical to [`normalized`](Self::normalized) except that a conversion
    /// pair is put in lexical order.
    pub fn canonical(&self) -> Self {
        match self.normalized() {
            ResourceRequest::ConversionRate { from, to } if from > to => {
                ResourceRequest::ConversionRate { from: to, to: from }
            }
            other => other,
        }
    }

    /// Whether this conversion request runs against the canonical pair order
    pub fn is_inverted(&self) -> bool {
        match self.normalized() {
            ResourceRequest::ConversionRate { from, to } => from > to,
            _ => false,
        }
    }

    /// Reject malformed descriptors before any cache or provider interaction
    pub fn validate(&self) -> Result<()> {
        match self.normalized() {
            ResourceRequest::CoinDetail { id } => check_ident("id", &id),
            ResourceRequest::MarketChart {
                id,
                vs_currency,
                days,
            } => {
                check_ident("id", &id)?;
                check_ident("vs_currency", &vs_currency)?;
                if days == 0 || days > MAX_CHART_DAYS {
                    return Err(CacheError::InvalidRequest(format!(
                        "days must be between 1 and {}, got {}",
                        MAX_CHART_DAYS, days
                    )));
                }
                Ok(())
            }
            ResourceRequest::GlobalStats | ResourceRequest::Trending => Ok(()),
            ResourceRequest::QuotePrices { ids, vs_currencies } => {
                if ids.is_empty() {
                    return Err(CacheError::InvalidRequest("ids must not be empty".to_string()));
                }
                if ids.len() > MAX_BATCH_IDS {
                    return Err(CacheError::InvalidRequest(format!(
                        "at most {} ids per request, got {}",
                        MAX_BATCH_IDS,
                        ids.len()
                    )));
                }
                if vs_currencies.is_empty() {
                    return Err(CacheError::InvalidRequest(
                        "vs_currencies must not be empty".to_string(),
                    ));
                }
                ids.iter().try_for_each(|id| check_ident("ids", id))?;
                vs_currencies
                    .iter()
                    .try_for_each(|c| check_ident("vs_currencies", c))
            }
            ResourceRequest::ConversionRate { from, to } => {
                check_ident("from", &from)?;
                check_ident("to", &to)?;
                if from == to {
                    return Err(CacheError::InvalidRequest(format!(
                        "cannot convert {} to itself",
                        from
                    )));
                }
                Ok(())
            }
        }
    }

    /// Deterministic, collision-free cache key; validates first
    pub fn cache_key(&self) -> Result<CacheKey> {
        self.validate()?;

        let key = match self.canonical() {
            ResourceRequest::CoinDetail { id } => {
                CacheKeyBuilder::new(ResourceKind::CoinDetail).identifier(id)
            }
            ResourceRequest::MarketChart {
                id,
                vs_currency,
                days,
            } => CacheKeyBuilder::new(ResourceKind::MarketChart)
                .identifier(id)
                .param("vs", vs_currency)
                .param("days", days.to_string()),
            ResourceRequest::GlobalStats => CacheKeyBuilder::new(ResourceKind::GlobalStats),
            ResourceRequest::Trending => CacheKeyBuilder::new(ResourceKind::Trending),
            ResourceRequest::QuotePrices { ids, vs_currencies } => {
                CacheKeyBuilder::new(ResourceKind::QuotePrices)
                    .identifier(ids.join(","))
                    .param("vs", vs_currencies.join(","))
            }
            ResourceRequest::ConversionRate { from, to } => {
                CacheKeyBuilder::new(ResourceKind::ConversionRate).identifier(format!("{}/{}", from, to))
            }
        };

        Ok(key.build())
    }
}

/// Orient a rate stored for the canonical pair to the requested direction.
///
/// Returns `None` when an inversion is required and the rate is zero or not finite.
pub fn orient_rate(canonical_rate: f64, inverted: bool) -> Option<f64> {
    if !canonical_rate.is_finite() {
        return None;
    }
    if !inverted {
        return Some(canonical_rate);
    }
    if canonical_rate == 0.0 {
        None
    } else {
        Some(1.0 / canonical_rate)
    }
}

fn norm(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn norm_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| norm(v))
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn check_ident(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CacheError::InvalidRequest(format!("{} is required", field)));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(CacheError::InvalidRequest(format!(
            "{} contains unsupported characters: '{}'",
            field, value
        )));
    }
    // Dot-only values are path segments upstream, not identifiers
    if value.chars().all(|c| c == '.') {
        return Err(CacheError::InvalidRequest(format!(
            "{} is not a valid identifier: '{}'",
            field, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_detail_key() {
        let key = ResourceRequest::coin_detail(" Bitcoin ").cache_key().unwrap();
        assert_eq!(key.as_str(), "coin_detail:bitcoin");
    }

    #[test]
    fn test_market_chart_key_includes_params() {
        let a = ResourceRequest::market_chart("bitcoin", "usd", 7).cache_key().unwrap();
        let b = ResourceRequest::market_chart("bitcoin", "usd", 30).cache_key().unwrap();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("market_chart:bitcoin?"));
        assert!(a.as_str().contains("days=7"));
        assert!(a.as_str().contains("vs=usd"));
    }

    #[test]
    fn test_parameterless_keys() {
        assert_eq!(ResourceRequest::Trending.cache_key().unwrap().as_str(), "trending");
        assert_eq!(
            ResourceRequest::GlobalStats.cache_key().unwrap().as_str(),
            "global_stats"
        );
    }

    #[test]
    fn test_quote_prices_key_is_order_independent() {
        let a = ResourceRequest::quote_prices(vec!["ethereum", "bitcoin"], vec!["usd", "eur"])
            .cache_key()
            .unwrap();
        let b = ResourceRequest::quote_prices(vec!["BITCOIN", "ethereum", "bitcoin"], vec!["eur", "usd"])
            .cache_key()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "quote_prices:bitcoin,ethereum?vs=eur,usd");
    }

    #[test]
    fn test_conversion_pair_is_symmetric() {
        let forward = ResourceRequest::conversion_rate("BTC", "usd");
        let backward = ResourceRequest::conversion_rate("usd", "btc");

        assert_eq!(forward.cache_key().unwrap(), backward.cache_key().unwrap());
        assert_eq!(forward.canonical(), backward.canonical());
        assert!(!forward.is_inverted());
        assert!(backward.is_inverted());
    }

    #[test]
    fn test_distinct_kinds_do_not_collide() {
        let detail = ResourceRequest::coin_detail("trending").cache_key().unwrap();
        assert_ne!(detail, ResourceRequest::Trending.cache_key().unwrap());
    }

    #[test]
    fn test_validation_rejects_malformed_requests() {
        let invalid = [
            ResourceRequest::coin_detail(""),
            ResourceRequest::coin_detail("bit coin"),
            ResourceRequest::coin_detail("btc?days=1"),
            ResourceRequest::coin_detail("."),
            ResourceRequest::coin_detail(".."),
            ResourceRequest::market_chart("..", "usd", 7),
            ResourceRequest::market_chart("bitcoin", "..", 7),
            ResourceRequest::quote_prices(vec![".."], vec!["usd"]),
            ResourceRequest::market_chart("bitcoin", "usd", 0),
            ResourceRequest::market_chart("bitcoin", "", 7),
            ResourceRequest::quote_prices(Vec::<String>::new(), vec!["usd".to_string()]),
            ResourceRequest::quote_prices(vec!["bitcoin"], vec![]),
            ResourceRequest::conversion_rate("usd", "USD"),
        ];

        for request in invalid {
            assert!(
                matches!(request.cache_key(), Err(CacheError::InvalidRequest(_))),
                "expected {:?} to be rejected",
                request
            );
        }
    }

    #[test]
    fn test_batch_limit() {
        let ids: Vec<String> = (0..=MAX_BATCH_IDS).map(|i| format!("coin{}", i)).collect();
        let request = ResourceRequest::quote_prices(ids, vec!["usd".to_string()]);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_orient_rate() {
        assert_eq!(orient_rate(50_000.0, false), Some(50_000.0));
        assert_eq!(orient_rate(4.0, true), Some(0.25));
        assert_eq!(orient_rate(0.0, true), None);
        assert_eq!(orient_rate(f64::NAN, false), None);
    }

    #[test]
    fn test_request_serialization_is_tagged() {
        let json = serde_json::to_value(ResourceRequest::coin_detail("bitcoin")).unwrap();
        assert_eq!(json["kind"], "coin_detail");
        assert_eq!(json["id"], "bitcoin");
    }
}
