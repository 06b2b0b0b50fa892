//! Ordered provider fallback
//!
//! Providers are tried in order, each under the chain's timeout. The first
//! success wins and is annotated with the provider that produced it. Timeouts,
//! HTTP errors, rate limiting and malformed payloads all move on to the next
//! provider. A provider that does not serve the resource kind is skipped and
//! does not count as an attempt. When every provider fails the caller gets
//! [`CacheError::AllProvidersFailed`] carrying the last upstream error and the
//! number of attempts.

use crate::error::{CacheError, ProviderError, Result};
use crate::provider::request::ResourceRequest;
use crate::provider::{DataProvider, FailedAttempt, ProviderId, ProviderResult};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-provider timeout used when none is configured
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(8);

pub struct ProviderChain<T> {
    providers: Vec<Arc<dyn DataProvider<T>>>,
    timeout: Duration,
}

impl<T> ProviderChain<T>
where
    T: Send + 'static,
{
    pub fn new(providers: Vec<Arc<dyn DataProvider<T>>>) -> Self {
        Self {
            providers,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Bound every provider call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Append a provider at the lowest priority
    pub fn push(mut self, provider: Arc<dyn DataProvider<T>>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Try each provider in order and return the first success
    pub async fn fetch(&self, request: &ResourceRequest) -> Result<ProviderResult<T>> {
        let mut failed: Vec<FailedAttempt> = Vec::new();
        let mut skipped: Option<ProviderError> = None;

        for (index, provider) in self.providers.iter().enumerate() {
            let provider_id = provider.id();
            let started = Instant::now();
            debug!(
                "Fetching {} from {} (attempt {}/{})",
                request.kind(),
                provider_id,
                index + 1,
                self.providers.len()
            );

            let outcome = match tokio::time::timeout(self.timeout, provider.fetch(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout {
                    provider: provider_id.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(payload) => {
                    if failed.is_empty() {
                        debug!("{} served by {}", request.kind(), provider_id);
                    } else {
                        info!(
                            "{} served by fallback provider {} after {} failed attempt(s)",
                            request.kind(),
                            provider_id,
                            failed.len()
                        );
                    }
                    return Ok(ProviderResult {
                        payload,
                        provider_id,
                        failed_attempts: failed,
                    });
                }
                Err(error @ ProviderError::Unsupported { .. }) => {
                    debug!("Skipping {}: {}", provider_id, error);
                    skipped = Some(error);
                }
                Err(error) => {
                    warn!("Provider {} failed for {}: {}", provider_id, request.kind(), error);
                    failed.push(FailedAttempt {
                        provider: provider_id,
                        error,
                        elapsed: started.elapsed(),
                    });
                }
            }
        }

        let attempts = failed.len();
        match (failed.pop(), skipped) {
            (Some(last), _) => Err(CacheError::AllProvidersFailed {
                attempts,
                last: last.error,
            }),
            // No provider serves this kind
            (None, Some(unsupported)) => Err(CacheError::AllProvidersFailed {
                attempts: 0,
                last: unsupported,
            }),
            (None, None) => Err(CacheError::ConfigError(
                "provider chain has no providers".to_string(),
            )),
        }
    }

    /// Bind the chain to one request, producing a fetcher for the orchestrator
    pub fn fetcher(
        self: &Arc<Self>,
        request: ResourceRequest,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<ProviderResult<T>>> + Send + 'static {
        let chain = Arc::clone(self);
        move || async move { chain.fetch(&request).await }.boxed()
    }
}
