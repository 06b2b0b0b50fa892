//! Error types for cache and provider operations
//!
//! Two layers of failure exist: a single upstream call failing
//! ([`ProviderError`]) and a cache-level failure surfaced to callers
//! ([`CacheError`]). Both are `Clone` because one shared fetch outcome is
//! handed to every coalesced waiter.

use thiserror::Error;

/// A single upstream call failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider did not answer within the chain's timeout
    #[error("{provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    /// Non-2xx response other than rate limiting
    #[error("{provider} returned HTTP {status}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// The provider signalled rate limiting (HTTP 429 or equivalent)
    #[error("{provider} rate limited the request (retry after {retry_after_secs:?}s)")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Response body could not be decoded into the expected payload
    #[error("{provider} returned a malformed payload: {message}")]
    Malformed { provider: String, message: String },

    /// Connection-level failure (DNS, TLS, reset)
    #[error("{provider} transport error: {message}")]
    Transport { provider: String, message: String },

    /// The provider cannot serve this kind of resource
    #[error("{provider} does not support {resource}")]
    Unsupported { provider: String, resource: String },
}

impl ProviderError {
    /// Name of the provider that produced this error
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Timeout { provider, .. }
            | ProviderError::Http { provider, .. }
            | ProviderError::RateLimited { provider, .. }
            | ProviderError::Malformed { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::Unsupported { provider, .. } => provider,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Main error type for cache operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Every provider in the chain failed
    #[error("All {attempts} provider attempt(s) failed; last error: {last}")]
    AllProvidersFailed { attempts: usize, last: ProviderError },

    /// Malformed key or missing parameters, rejected before any lookup
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A blocking fetch exceeded the caller-side bound
    #[error("Fetch for {key} timed out after {timeout_ms}ms")]
    FetchTimeout { key: String, timeout_ms: u64 },

    /// The fetch function panicked; the panic was contained at the fetch boundary
    #[error("Fetch for {key} panicked: {message}")]
    FetchPanicked { key: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// HTTP status the boundary layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            CacheError::InvalidRequest(_) => 400,
            CacheError::AllProvidersFailed { last, .. } if last.is_rate_limited() => 429,
            _ => 500,
        }
    }

    /// Whether the terminal provider signalled rate limiting
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CacheError::AllProvidersFailed { last, .. } if last.is_rate_limited())
    }
}
