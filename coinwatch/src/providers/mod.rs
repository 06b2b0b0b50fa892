//! Upstream market-data providers
//!
//! Each provider adapts one HTTP API to [`DataProvider<Value>`]. Payloads are
//! passed through as JSON, except conversion rates, which every provider
//! reports in the same shape:
//!
//! ```json
//! { "from": "btc", "to": "usd", "rate": 67012.5 }
//! ```
//!
//! meaning one unit of `from` is worth `rate` units of `to`.

pub mod binance;
pub mod coingecko;

pub use binance::BinanceProvider;
pub use coingecko::CoinGeckoProvider;

use anyhow::{Context, Result};
use coinwatch_cache::{DataProvider, ProviderError, DEFAULT_PROVIDER_TIMEOUT};
use reqwest::{header::RETRY_AFTER, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest upstream error body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Upstream endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub coingecko_base_url: String,

    /// Optional CoinGecko demo API key
    #[serde(skip_serializing)]
    pub coingecko_api_key: Option<String>,

    pub binance_base_url: String,

    /// Per-provider timeout inside the fallback chain
    pub timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            coingecko_base_url: coingecko::DEFAULT_BASE_URL.to_string(),
            coingecko_api_key: None,
            binance_base_url: binance::DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

impl ProviderSettings {
    /// Read overrides from the environment
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("COINGECKO_BASE_URL") {
            settings.coingecko_base_url = url;
        }
        settings.coingecko_api_key = std::env::var("COINGECKO_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if let Ok(url) = std::env::var("BINANCE_BASE_URL") {
            settings.binance_base_url = url;
        }
        if let Ok(raw) = std::env::var("COINWATCH_PROVIDER_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("COINWATCH_PROVIDER_TIMEOUT_SECS: invalid value '{}'", raw))?;
            settings.timeout = Duration::from_secs(secs);
        }

        Ok(settings)
    }

    /// CoinGecko first, Binance as fallback
    pub fn build_chain(&self) -> Result<Vec<Arc<dyn DataProvider<Value>>>> {
        let client = build_client(self.timeout)?;

        Ok(vec![
            Arc::new(CoinGeckoProvider::new(
                client.clone(),
                &self.coingecko_base_url,
                self.coingecko_api_key.clone(),
            )),
            Arc::new(BinanceProvider::new(client, &self.binance_base_url)),
        ])
    }
}

/// Shared HTTP client for all providers
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("coinwatch/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(4)
        .timeout(timeout)
        .build()
        .context("failed to build upstream HTTP client")
}

/// Send a request and decode a JSON body, mapping failures to [`ProviderError`]
pub(crate) async fn send_json(provider: &str, request: RequestBuilder) -> Result<Value, ProviderError> {
    let response = request.send().await.map_err(|e| ProviderError::Transport {
        provider: provider.to_string(),
        message: e.to_string(),
    })?;

    let status = response.status();
    debug!("{} answered {} for {}", provider, status, response.url());

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(ProviderError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs,
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Http {
            provider: provider.to_string(),
            status: status.as_u16(),
            message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }

    response.json::<Value>().await.map_err(|e| ProviderError::Malformed {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}

/// Conversion payload in the shape every provider reports
pub(crate) fn conversion_payload(from: &str, to: &str, rate: f64) -> Value {
    json!({ "from": from, "to": to, "rate": rate })
}
