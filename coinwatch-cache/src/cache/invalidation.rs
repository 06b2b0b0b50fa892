//! Explicit invalidation and sweep bookkeeping
//!
//! Entries are never removed by the request path. They leave the store only
//! through manual invalidation (single key, key pattern, clear) or the
//! periodic sweep of entries older than the maximum staleness window.

use crate::cache::types::CacheKey;
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reason entries were removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Manual invalidation of one key
    Manual,

    /// Manual invalidation of every key matching a pattern
    PatternMatch { pattern: String },

    /// The whole cache was cleared
    Cleared,

    /// Periodic sweep of entries older than `max_age`
    Swept { max_age: Duration },
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Manual => write!(f, "manual invalidation"),
            InvalidationReason::PatternMatch { pattern } => write!(f, "pattern match: {}", pattern),
            InvalidationReason::Cleared => write!(f, "cache cleared"),
            InvalidationReason::Swept { max_age } => {
                write!(f, "swept (older than {}s)", max_age.as_secs())
            }
        }
    }
}

/// Record of one invalidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub reason: InvalidationReason,

    /// When the invalidation occurred
    pub timestamp: DateTime<Utc>,

    /// Keys that were removed
    pub keys: Vec<CacheKey>,
}

impl InvalidationEvent {
    pub fn new(reason: InvalidationReason, mut keys: Vec<CacheKey>) -> Self {
        keys.sort();
        Self {
            reason,
            timestamp: Utc::now(),
            keys,
        }
    }

    pub fn count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Glob-style key pattern (`coin_detail:*`, `quote_prices:*usd*`)
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    pattern: glob::Pattern,
}

impl KeyPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty() {
            return Err(CacheError::InvalidRequest(
                "invalidation pattern must not be empty".to_string(),
            ));
        }
        let compiled = glob::Pattern::new(pattern).map_err(|e| {
            CacheError::InvalidRequest(format!("invalid key pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            pattern: compiled,
        })
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        self.pattern.matches(key.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}
