//! Binance spot ticker provider
//!
//! A fallback for price-like resources only: batch quotes and conversion
//! rates. Coin ids are mapped to Binance base assets and fiat quotes to their
//! USD stablecoin or fiat pair. Everything else is reported as unsupported so
//! the chain moves on.

use super::{conversion_payload, send_json};
use async_trait::async_trait;
use coinwatch_cache::{DataProvider, ProviderError, ProviderId, ResourceRequest};
use serde_json::{Map, Value};

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
pub const PROVIDER_ID: &str = "binance";

/// Coin id to Binance base asset
const ASSETS: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("binancecoin", "BNB"),
    ("solana", "SOL"),
    ("ripple", "XRP"),
    ("cardano", "ADA"),
    ("dogecoin", "DOGE"),
    ("tron", "TRX"),
    ("polkadot", "DOT"),
    ("litecoin", "LTC"),
    ("chainlink", "LINK"),
    ("avalanche-2", "AVAX"),
];

#[derive(Debug, Clone)]
pub struct BinanceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64, ProviderError> {
        let request = self
            .client
            .get(format!("{}/api/v3/ticker/price", self.base_url))
            .query(&[("symbol", symbol)]);
        let body = send_json(PROVIDER_ID, request).await?;
        parse_price(&body)
    }

    async fn quote_prices(&self, ids: &[String], vs_currencies: &[String]) -> Result<Value, ProviderError> {
        let mut symbols = Vec::new();
        for id in ids {
            let base = asset_for_id(id).ok_or_else(|| unsupported(format!("coin '{}'", id)))?;
            for vs in vs_currencies {
                symbols.push((id.as_str(), vs.as_str(), pair_symbol(base, vs)));
            }
        }

        let wanted: Vec<&str> = symbols.iter().map(|(_, _, s)| s.as_str()).collect();
        let request = self
            .client
            .get(format!("{}/api/v3/ticker/price", self.base_url))
            .query(&[("symbols", Value::from(wanted).to_string())]);
        let body = send_json(PROVIDER_ID, request).await?;

        let tickers = body.as_array().ok_or_else(|| malformed("expected a ticker array"))?;
        let mut prices: Map<String, Value> = Map::new();
        for (id, vs, symbol) in &symbols {
            let ticker = tickers
                .iter()
                .find(|t| t["symbol"].as_str() == Some(symbol.as_str()))
                .ok_or_else(|| malformed(&format!("missing ticker {}", symbol)))?;
            let price = parse_price(ticker)?;

            let quotes = prices
                .entry(id.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(quotes) = quotes.as_object_mut() {
                quotes.insert(vs.to_string(), Value::from(price));
            }
        }

        Ok(Value::Object(prices))
    }

    async fn conversion_rate(&self, from: &str, to: &str) -> Result<Value, ProviderError> {
        let direct = pair_symbol(&from.to_ascii_uppercase(), to);
        let rate = match self.ticker_price(&direct).await {
            Ok(price) => price,
            // Binance answers 400 for symbols it does not list; try the reverse pair
            Err(ProviderError::Http { status: 400, .. }) => {
                let reverse = pair_symbol(&to.to_ascii_uppercase(), from);
                let price = self.ticker_price(&reverse).await?;
                if price == 0.0 {
                    return Err(malformed(&format!("zero price for {}", reverse)));
                }
                1.0 / price
            }
            Err(e) => return Err(e),
        };
        Ok(conversion_payload(from, to, rate))
    }
}

#[async_trait]
impl DataProvider<Value> for BinanceProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(PROVIDER_ID)
    }

    async fn fetch(&self, request: &ResourceRequest) -> Result<Value, ProviderError> {
        match request {
            ResourceRequest::QuotePrices { ids, vs_currencies } => {
                self.quote_prices(ids, vs_currencies).await
            }
            ResourceRequest::ConversionRate { from, to } => self.conversion_rate(from, to).await,
            other => Err(unsupported(other.kind().to_string())),
        }
    }
}

fn asset_for_id(id: &str) -> Option<&'static str> {
    ASSETS
        .iter()
        .find(|(coin, _)| *coin == id)
        .map(|(_, asset)| *asset)
}

/// `BTC` + `usd` -> `BTCUSDT`; dollars are quoted in USDT
fn pair_symbol(base: &str, quote: &str) -> String {
    let quote = match quote {
        "usd" => "USDT".to_string(),
        other => other.to_ascii_uppercase(),
    };
    format!("{}{}", base, quote)
}

/// Binance quotes prices as decimal strings
fn parse_price(ticker: &Value) -> Result<f64, ProviderError> {
    ticker["price"]
        .as_str()
        .and_then(|p| p.parse::<f64>().ok())
        .filter(|p| p.is_finite())
        .ok_or_else(|| malformed("ticker without a numeric price"))
}

fn malformed(message: &str) -> ProviderError {
    ProviderError::Malformed {
        provider: PROVIDER_ID.to_string(),
        message: message.to_string(),
    }
}

fn unsupported(resource: String) -> ProviderError {
    ProviderError::Unsupported {
        provider: PROVIDER_ID.to_string(),
        resource,
    }
}
