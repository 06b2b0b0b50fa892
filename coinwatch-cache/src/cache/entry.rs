//! Cached payloads and their fetch metadata

use crate::cache::config::FreshnessWindows;
use crate::cache::freshness::Freshness;
use crate::provider::{FailedAttempt, ProviderId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Last successfully fetched payload for a key
///
/// Entries are immutable once built; a refresh replaces the whole entry.
#[derive(Debug)]
pub struct CacheEntry<T> {
    /// The payload, shared with every response that serves it
    pub data: Arc<T>,

    /// Monotonic time of fetch completion
    pub fetched_at: Instant,

    /// Wall-clock time of fetch completion, for display
    pub fetched_at_utc: DateTime<Utc>,

    /// Provider that produced the payload
    pub source: ProviderId,

    /// Providers that failed before `source` answered
    pub failed_attempts: Vec<FailedAttempt>,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, source: ProviderId, fetched_at: Instant) -> Self {
        Self {
            data: Arc::new(data),
            fetched_at,
            fetched_at_utc: Utc::now(),
            source,
            failed_attempts: Vec::new(),
        }
    }

    pub fn with_failed_attempts(mut self, failed_attempts: Vec<FailedAttempt>) -> Self {
        self.failed_attempts = failed_attempts;
        self
    }

    /// Whether the payload came from a fallback provider
    pub fn used_fallback(&self) -> bool {
        !self.failed_attempts.is_empty()
    }

    /// Age of the entry at `now`
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    pub fn freshness(&self, now: Instant, windows: &FreshnessWindows) -> Freshness {
        windows.classify(now, self.fetched_at)
    }
}
