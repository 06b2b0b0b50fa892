//! API server for Coinwatch

use anyhow::{Context, Result};
use axum::{
    routing::{delete, get},
    Router,
};
use coinwatch_cache::{start_auto_sweep, Cache, CacheConfig, DataProvider, ProviderChain, ResourceCache};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::providers::ProviderSettings;

use super::routes::{
    cache_stats, coin_detail, convert, global_stats, health_check, invalidate_cache, market_chart,
    prices, trending, AppState,
};

/// Configuration for the API server
#[derive(Debug, Clone, Serialize)]
pub struct ApiServerConfig {
    pub host: String,
    pub port: u16,
    pub cache: CacheConfig,
    pub providers: ProviderSettings,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cache: CacheConfig::default(),
            providers: ProviderSettings::default(),
        }
    }
}

impl ApiServerConfig {
    /// Load configuration from the environment (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self {
            cache: CacheConfig::from_env()?,
            providers: ProviderSettings::from_env()?,
            ..Self::default()
        };

        if let Ok(host) = std::env::var("COINWATCH_HOST") {
            config.host = host;
        }
        if let Ok(raw) = std::env::var("COINWATCH_PORT") {
            config.port = raw
                .trim()
                .parse()
                .with_context(|| format!("COINWATCH_PORT: invalid port '{}'", raw))?;
        }

        Ok(config)
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a server fronting `providers`, tried in order
    pub fn new(config: ApiServerConfig, providers: Vec<Arc<dyn DataProvider<Value>>>) -> Self {
        let chain = ProviderChain::new(providers).with_timeout(config.providers.timeout);
        let cache = ResourceCache::new(Cache::new(config.cache.clone()), chain);

        Self {
            config,
            state: Arc::new(AppState { cache }),
        }
    }

    /// Create a server with the upstream providers named in the configuration
    pub fn from_config(config: ApiServerConfig) -> Result<Self> {
        let providers = config.providers.build_chain()?;
        Ok(Self::new(config, providers))
    }

    pub fn cache(&self) -> &ResourceCache<Value> {
        &self.state.cache
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            // Market data
            .route("/api/coins/:id", get(coin_detail))
            .route("/api/coins/:id/market-chart", get(market_chart))
            .route("/api/global", get(global_stats))
            .route("/api/trending", get(trending))
            .route("/api/prices", get(prices))
            .route("/api/convert", get(convert))
            // Cache administration
            .route("/api/cache/stats", get(cache_stats))
            .route("/api/cache", delete(invalidate_cache))
            .with_state(Arc::clone(&self.state))
            // Add CORS layer
            .layer(CorsLayer::permissive())
    }

    /// Start the API server on the configured address
    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let app = self.router();

        let sweeper = if self.config.cache.enable_auto_sweep {
            Some(tokio::spawn(start_auto_sweep(self.state.cache.cache().clone())))
        } else {
            None
        };

        info!(
            "Starting API server on {} (providers: {:?})",
            listener.local_addr()?,
            self.state
                .cache
                .chain()
                .provider_ids()
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
        );

        let served = axum::serve(listener, app).await;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        served?;

        Ok(())
    }
}
