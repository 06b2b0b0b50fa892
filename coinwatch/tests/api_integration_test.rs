//! Integration tests for the API server with stubbed upstream providers

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

use coinwatch::api::server::{ApiServer, ApiServerConfig};
use coinwatch::BinanceProvider;
use coinwatch_cache::{CacheConfig, DataProvider, ProviderError, ProviderId, ResourceRequest};

type Responder = Box<dyn Fn(&ResourceRequest) -> Result<Value, ProviderError> + Send + Sync>;

struct StubProvider {
    name: &'static str,
    calls: AtomicUsize,
    respond: Responder,
}

impl StubProvider {
    fn new<F>(name: &'static str, respond: F) -> Arc<Self>
    where
        F: Fn(&ResourceRequest) -> Result<Value, ProviderError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
            respond: Box::new(respond),
        })
    }

    /// Answers every request with an echo of the request
    fn echo(name: &'static str) -> Arc<Self> {
        Self::new(name, move |request| {
            Ok(json!({ "provider": name, "request": request }))
        })
    }

    fn down(name: &'static str) -> Arc<Self> {
        Self::new(name, move |_| {
            Err(ProviderError::Http {
                provider: name.to_string(),
                status: 503,
                message: "service unavailable".to_string(),
            })
        })
    }

    fn rate_limited(name: &'static str) -> Arc<Self> {
        Self::new(name, move |_| {
            Err(ProviderError::RateLimited {
                provider: name.to_string(),
                retry_after_secs: Some(42),
            })
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider<Value> for StubProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(self.name)
    }

    async fn fetch(&self, request: &ResourceRequest) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(request)
    }
}

fn as_dyn(provider: &Arc<StubProvider>) -> Arc<dyn DataProvider<Value>> {
    provider.clone()
}

/// Test helper to start the API server in the background on an ephemeral port
async fn start_test_server(providers: Vec<Arc<dyn DataProvider<Value>>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = ApiServerConfig {
        cache: CacheConfig::builder().enable_auto_sweep(false).build(),
        ..ApiServerConfig::default()
    };
    let server = ApiServer::new(config, providers);
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    format!("http://{}", addr)
}

fn header<'a>(response: &'a reqwest::Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_health_check() {
    let base = start_test_server(vec![as_dyn(&StubProvider::echo("primary"))]).await;

    let response = Client::new()
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_coin_detail_miss_then_hit() {
    let primary = StubProvider::echo("coingecko");
    let base = start_test_server(vec![as_dyn(&primary)]).await;
    let client = Client::new();

    let response = client
        .get(format!("{}/api/coins/Bitcoin", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-cache"), "MISS");
    assert_eq!(header(&response, "x-data-source"), "coingecko");
    assert!(response.headers().get("x-fallback-from").is_none());
    assert_eq!(
        header(&response, "cache-control"),
        "public, s-maxage=60, stale-while-revalidate=300"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["request"]["kind"], "coin_detail");
    assert_eq!(body["request"]["id"], "bitcoin");

    let response = client
        .get(format!("{}/api/coins/bitcoin", base))
        .send()
        .await
        .unwrap();
    assert_eq!(header(&response, "x-cache"), "HIT");
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn test_fallback_provider_in_source_header() {
    let primary = StubProvider::down("coingecko");
    let secondary = StubProvider::echo("binance");
    let base = start_test_server(vec![as_dyn(&primary), as_dyn(&secondary)]).await;

    let response = Client::new()
        .get(format!("{}/api/prices?ids=ethereum,bitcoin&vs_currencies=usd", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-data-source"), "binance");
    assert_eq!(header(&response, "x-fallback-from"), "coingecko");
    assert_eq!(
        header(&response, "cache-control"),
        "public, s-maxage=180, stale-while-revalidate=1800"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["request"]["ids"], json!(["bitcoin", "ethereum"]));
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn test_all_providers_down_is_500() {
    let base = start_test_server(vec![
        as_dyn(&StubProvider::down("coingecko")),
        as_dyn(&StubProvider::down("binance")),
    ])
    .await;

    let response = Client::new()
        .get(format!("{}/api/global", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], 500);
    assert!(body["error"].is_string());
    // Upstream details are not leaked
    assert!(!body["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn test_rate_limited_terminal_provider_is_429() {
    let base = start_test_server(vec![
        as_dyn(&StubProvider::down("coingecko")),
        as_dyn(&StubProvider::rate_limited("binance")),
    ])
    .await;

    let response = Client::new()
        .get(format!("{}/api/trending", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "retry-after"), "42");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], 429);
}

#[tokio::test]
async fn test_rate_limit_survives_binance_fallback_for_coin_detail() {
    // Binance never serves coin detail, so the upstream 429 must still surface
    let binance: Arc<dyn DataProvider<Value>> =
        Arc::new(BinanceProvider::new(Client::new(), "http://127.0.0.1:9"));
    let base = start_test_server(vec![as_dyn(&StubProvider::rate_limited("coingecko")), binance]).await;

    let response = Client::new()
        .get(format!("{}/api/coins/bitcoin", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "retry-after"), "42");
}

#[tokio::test]
async fn test_invalid_requests_are_400() {
    let primary = StubProvider::echo("coingecko");
    let base = start_test_server(vec![as_dyn(&primary)]).await;
    let client = Client::new();

    for path in [
        "/api/coins/bit%20coin",
        "/api/coins/bitcoin/market-chart?days=abc",
        "/api/coins/bitcoin/market-chart?days=0",
        "/api/prices?vs_currencies=usd",
        "/api/convert?from=usd",
        "/api/convert?from=usd&to=USD",
    ] {
        let response = client.get(format!("{}{}", base, path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", path);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], 400);
    }

    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn test_conversion_directions_share_one_fetch() {
    let fx = StubProvider::new("coingecko", |request| match request {
        ResourceRequest::ConversionRate { from, to } => {
            // Only the canonical order is ever requested
            assert_eq!((from.as_str(), to.as_str()), ("btc", "usd"));
            Ok(json!({ "from": from, "to": to, "rate": 50000.0 }))
        }
        _ => Ok(Value::Null),
    });
    let base = start_test_server(vec![as_dyn(&fx)]).await;
    let client = Client::new();

    let response = client
        .get(format!("{}/api/convert?from=USD&to=btc", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-cache"), "MISS");
    assert_eq!(header(&response, "cache-control"), "public, s-maxage=30");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["from"], "usd");
    assert_eq!(body["to"], "btc");
    assert!((body["rate"].as_f64().unwrap() - 1.0 / 50000.0).abs() < 1e-12);

    let response = client
        .get(format!("{}/api/convert?from=btc&to=usd", base))
        .send()
        .await
        .unwrap();
    assert_eq!(header(&response, "x-cache"), "HIT");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["rate"], 50000.0);

    assert_eq!(fx.calls(), 1);
}

#[tokio::test]
async fn test_cache_stats_and_invalidation() {
    let primary = StubProvider::echo("coingecko");
    let base = start_test_server(vec![as_dyn(&primary)]).await;
    let client = Client::new();

    for path in ["/api/coins/bitcoin", "/api/coins/ethereum", "/api/trending"] {
        let response = client.get(format!("{}{}", base, path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let stats: Value = client
        .get(format!("{}/api/cache/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["entry_count"], 3);
    assert_eq!(stats["misses"], 3);
    assert_eq!(stats["entries"].as_array().unwrap().len(), 3);
    assert!(stats["entries"][0]["fetched_at"]
        .as_str()
        .is_some_and(|t| t.contains('T')));

    let response = client
        .delete(format!("{}/api/cache?pattern=coin_detail:*", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["removed"], 2);
    assert_eq!(body["keys"], json!(["coin_detail:bitcoin", "coin_detail:ethereum"]));

    let response = client
        .get(format!("{}/api/coins/bitcoin", base))
        .send()
        .await
        .unwrap();
    assert_eq!(header(&response, "x-cache"), "MISS");

    let response = client
        .delete(format!("{}/api/cache?pattern=coin_detail:[", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = client
        .delete(format!("{}/api/cache", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["removed"], 2);
    assert_eq!(body["reason"], "cache cleared");
}

#[tokio::test]
async fn test_market_chart_defaults() {
    let primary = StubProvider::echo("coingecko");
    let base = start_test_server(vec![as_dyn(&primary)]).await;

    let response = Client::new()
        .get(format!("{}/api/coins/ethereum/market-chart", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["request"]["vs_currency"], "usd");
    assert_eq!(body["request"]["days"], 7);
}
