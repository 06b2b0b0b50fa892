//! CoinGecko REST API provider
//!
//! Serves every resource kind. Conversion rates are derived from the
//! `/exchange_rates` table, which quotes fiat and crypto units against BTC.

use super::{conversion_payload, send_json};
use async_trait::async_trait;
use coinwatch_cache::{DataProvider, ProviderError, ProviderId, ResourceRequest};
use reqwest::RequestBuilder;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
pub const PROVIDER_ID: &str = "coingecko";

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

#[derive(Debug, Clone)]
pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoProvider {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn conversion_rate(&self, from: &str, to: &str) -> Result<Value, ProviderError> {
        let table = send_json(PROVIDER_ID, self.get("/exchange_rates")).await?;
        let rate = rate_from_exchange_table(&table, from, to)?;
        Ok(conversion_payload(from, to, rate))
    }
}

#[async_trait]
impl DataProvider<Value> for CoinGeckoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(PROVIDER_ID)
    }

    async fn fetch(&self, request: &ResourceRequest) -> Result<Value, ProviderError> {
        match request {
            ResourceRequest::CoinDetail { id } => {
                let request = self.get(&format!("/coins/{}", id)).query(&[
                    ("localization", "false"),
                    ("tickers", "false"),
                    ("community_data", "false"),
                    ("developer_data", "false"),
                ]);
                send_json(PROVIDER_ID, request).await
            }
            ResourceRequest::MarketChart {
                id,
                vs_currency,
                days,
            } => {
                let request = self
                    .get(&format!("/coins/{}/market_chart", id))
                    .query(&[("vs_currency", vs_currency.clone()), ("days", days.to_string())]);
                send_json(PROVIDER_ID, request).await
            }
            ResourceRequest::GlobalStats => send_json(PROVIDER_ID, self.get("/global")).await,
            ResourceRequest::Trending => send_json(PROVIDER_ID, self.get("/search/trending")).await,
            ResourceRequest::QuotePrices { ids, vs_currencies } => {
                let request = self.get("/simple/price").query(&[
                    ("ids", ids.join(",")),
                    ("vs_currencies", vs_currencies.join(",")),
                ]);
                send_json(PROVIDER_ID, request).await
            }
            ResourceRequest::ConversionRate { from, to } => self.conversion_rate(from, to).await,
        }
    }
}

/// Rate of `from` in units of `to` from an `/exchange_rates` body.
///
/// Every `value` in the table is the price of 1 BTC in that unit.
fn rate_from_exchange_table(table: &Value, from: &str, to: &str) -> Result<f64, ProviderError> {
    let value_of = |unit: &str| -> Result<f64, ProviderError> {
        table["rates"][unit]["value"]
            .as_f64()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| ProviderError::Malformed {
                provider: PROVIDER_ID.to_string(),
                message: format!("no usable exchange rate for '{}'", unit),
            })
    };

    let from_per_btc = value_of(from)?;
    let to_per_btc = value_of(to)?;
    Ok(to_per_btc / from_per_btc)
}
