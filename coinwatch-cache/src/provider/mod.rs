//! Upstream data providers and the fallback chain that fronts them
//!
//! A provider adapts one upstream market-data API to [`DataProvider`]. The
//! [`ProviderChain`] tries an ordered list of providers and reports which one
//! answered; its result becomes the cache entry's `source`.

pub mod chain;
pub mod request;

pub use chain::{ProviderChain, DEFAULT_PROVIDER_TIMEOUT};
pub use request::ResourceRequest;

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of an upstream provider ("coingecko", "binance", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One upstream market-data source.
///
/// Implementations must be safe to call concurrently and must not retry
/// internally; retries and fallback are the chain's job.
#[async_trait]
pub trait DataProvider<T>: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn fetch(&self, request: &ResourceRequest) -> Result<T, ProviderError>;
}

/// A provider call that failed before the chain moved on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub provider: ProviderId,
    pub error: ProviderError,
    pub elapsed: Duration,
}

/// Successful chain result; ownership of `payload` moves to the caller
#[derive(Debug, Clone)]
pub struct ProviderResult<T> {
    pub payload: T,
    pub provider_id: ProviderId,
    /// Providers that failed before `provider_id` answered
    pub failed_attempts: Vec<FailedAttempt>,
}

impl<T> ProviderResult<T> {
    pub fn new(payload: T, provider_id: ProviderId) -> Self {
        Self {
            payload,
            provider_id,
            failed_attempts: Vec::new(),
        }
    }

    /// Whether a provider other than the first answered
    pub fn used_fallback(&self) -> bool {
        !self.failed_attempts.is_empty()
    }
}
