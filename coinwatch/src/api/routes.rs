//! API routes for the Coinwatch server

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use coinwatch_cache::provider::request::orient_rate;
use coinwatch_cache::{CacheError, CachedResponse, ResourceCache, ResourceRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Provenance of the payload (`HIT`, `STALE`, `MISS`, `PENDING`, `ERROR-STALE`)
pub const X_CACHE: &str = "x-cache";

/// Provider that produced the payload
pub const X_DATA_SOURCE: &str = "x-data-source";

/// Providers that failed before the data source answered, in order
pub const X_FALLBACK_FROM: &str = "x-fallback-from";

const DEFAULT_VS_CURRENCY: &str = "usd";
const DEFAULT_CHART_DAYS: u32 = 7;

/// Application state
pub struct AppState {
    pub cache: ResourceCache<Value>,
}

/// Errors surfaced at the HTTP boundary
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Upstream answered, but not with what the route needs
    #[error("unexpected upstream payload: {0}")]
    Payload(String),
}

/// Error response body
#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Cache(e) => StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Payload(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Upstream details stay in the logs
        let message = match status {
            StatusCode::BAD_REQUEST => {
                debug!("Rejected request: {}", self);
                self.to_string()
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Upstream rate limited: {}", self);
                "upstream rate limit reached, retry later".to_string()
            }
            _ => {
                error!("Request failed: {}", self);
                "market data is temporarily unavailable".to_string()
            }
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: message,
                status: status.as_u16(),
            }),
        )
            .into_response();

        if let ApiError::Cache(CacheError::AllProvidersFailed { last, .. }) = &self {
            if let coinwatch_cache::ProviderError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } = last
            {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(*secs));
            }
        }

        response
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Market chart query parameters
#[derive(Deserialize)]
pub struct ChartQuery {
    pub vs_currency: Option<String>,
    pub days: Option<String>,
}

/// Batch price query parameters
#[derive(Deserialize)]
pub struct PricesQuery {
    /// Comma-separated coin ids
    pub ids: Option<String>,
    /// Comma-separated quote currencies
    pub vs_currencies: Option<String>,
}

/// Conversion query parameters
#[derive(Deserialize)]
pub struct ConvertQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Serialize)]
pub struct ConversionResponse {
    pub from: String,
    pub to: String,
    pub rate: f64,
}

/// Invalidation query parameters
#[derive(Deserialize)]
pub struct InvalidateQuery {
    /// Glob over cache keys; omitted clears the whole cache
    pub pattern: Option<String>,
}

#[derive(Serialize)]
pub struct InvalidateResponse {
    pub reason: String,
    pub removed: usize,
    pub keys: Vec<String>,
}

#[derive(Serialize)]
pub struct EntryAgeItem {
    pub key: String,
    pub age_secs: u64,
    pub source: String,
    /// RFC 3339 fetch time
    pub fetched_at: String,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub entry_count: usize,
    pub in_flight_count: usize,
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub error_stale: u64,
    pub coalesced: u64,
    pub background_refreshes: u64,
    pub background_failures: u64,
    pub invalidations: u64,
    pub swept: u64,
    pub hit_rate: f64,
    pub entries: Vec<EntryAgeItem>,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Coin detail
pub async fn coin_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    serve(&state, ResourceRequest::coin_detail(id)).await
}

/// Historical market chart
pub async fn market_chart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ChartQuery>,
) -> Result<Response, ApiError> {
    let days = match params.days.as_deref() {
        None => DEFAULT_CHART_DAYS,
        Some(raw) => raw.trim().parse().map_err(|_| {
            CacheError::InvalidRequest(format!("days must be a positive integer, got '{}'", raw))
        })?,
    };
    let vs_currency = params
        .vs_currency
        .unwrap_or_else(|| DEFAULT_VS_CURRENCY.to_string());

    serve(&state, ResourceRequest::market_chart(id, vs_currency, days)).await
}

/// Global market statistics
pub async fn global_stats(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    serve(&state, ResourceRequest::GlobalStats).await
}

/// Trending coins
pub async fn trending(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    serve(&state, ResourceRequest::Trending).await
}

/// Batch quote prices
pub async fn prices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PricesQuery>,
) -> Result<Response, ApiError> {
    let ids = split_list(params.ids.as_deref().unwrap_or_default());
    let vs_currencies = split_list(params.vs_currencies.as_deref().unwrap_or(DEFAULT_VS_CURRENCY));

    serve(&state, ResourceRequest::quote_prices(ids, vs_currencies)).await
}

/// Conversion rate between two units
///
/// Both directions of a pair share one cache entry; the rate is inverted
/// here when the request runs against the stored order.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConvertQuery>,
) -> Result<Response, ApiError> {
    let from = params.from.unwrap_or_default().trim().to_ascii_lowercase();
    let to = params.to.unwrap_or_default().trim().to_ascii_lowercase();
    let request = ResourceRequest::conversion_rate(from.clone(), to.clone());
    let response = state.cache.get(&request).await?;

    let stored = response.data["rate"]
        .as_f64()
        .ok_or_else(|| ApiError::Payload("conversion payload without a rate".to_string()))?;
    let rate = orient_rate(stored, request.is_inverted())
        .ok_or_else(|| ApiError::Payload(format!("rate {} cannot be inverted", stored)))?;

    let body = Json(ConversionResponse { from, to, rate }).into_response();
    Ok(with_cache_headers(body, &state, &request, &response))
}

/// Cache statistics
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.cache.cache().stats();
    let hit_rate = stats.hit_rate();

    Json(StatsResponse {
        entry_count: stats.entry_count,
        in_flight_count: stats.in_flight_count,
        hits: stats.hits,
        stale_hits: stats.stale_hits,
        misses: stats.misses,
        error_stale: stats.error_stale,
        coalesced: stats.coalesced,
        background_refreshes: stats.background_refreshes,
        background_failures: stats.background_failures,
        invalidations: stats.invalidations,
        swept: stats.swept,
        hit_rate,
        entries: stats
            .entry_ages
            .into_iter()
            .map(|e| EntryAgeItem {
                key: e.key.to_string(),
                age_secs: e.age.as_secs(),
                source: e.source,
                fetched_at: e.fetched_at.to_rfc3339(),
            })
            .collect(),
    })
}

/// Invalidate by key pattern, or clear everything
pub async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InvalidateQuery>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let cache = state.cache.cache();
    let event = match params.pattern.as_deref() {
        Some(pattern) => cache.invalidate_pattern(pattern)?,
        None => cache.clear(),
    };

    Ok(Json(InvalidateResponse {
        reason: event.reason.to_string(),
        removed: event.count(),
        keys: event.keys.iter().map(|k| k.to_string()).collect(),
    }))
}

async fn serve(state: &AppState, request: ResourceRequest) -> Result<Response, ApiError> {
    let response = state.cache.get(&request).await?;
    let body = Json(response.data.as_ref()).into_response();
    Ok(with_cache_headers(body, state, &request, &response))
}

fn with_cache_headers(
    mut body: Response,
    state: &AppState,
    request: &ResourceRequest,
    response: &CachedResponse<Value>,
) -> Response {
    let windows = state.cache.windows_for(request.kind());
    let headers = body.headers_mut();

    headers.insert(X_CACHE, HeaderValue::from_static(response.x_cache()));
    if let Ok(source) = HeaderValue::from_str(response.source.as_str()) {
        headers.insert(X_DATA_SOURCE, source);
    }
    if let Ok(cache_control) = HeaderValue::from_str(&windows.cache_control()) {
        headers.insert(header::CACHE_CONTROL, cache_control);
    }
    headers.insert(header::AGE, HeaderValue::from(response.age.as_secs()));
    if response.used_fallback() {
        let failed: Vec<&str> = response
            .failed_attempts
            .iter()
            .map(|attempt| attempt.provider.as_str())
            .collect();
        if let Ok(failed) = HeaderValue::from_str(&failed.join(",")) {
            headers.insert(X_FALLBACK_FROM, failed);
        }
    }

    body
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
