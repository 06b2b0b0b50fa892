//! Freshness classification of cached entries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Freshness tier of an entry at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// `age < fresh`
    Fresh,
    /// `fresh <= age < stale`
    Stale,
    /// `age >= stale`
    Expired,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "fresh"),
            Freshness::Stale => write!(f, "stale"),
            Freshness::Expired => write!(f, "expired"),
        }
    }
}

/// Classify an entry fetched at `fetched_at`.
///
/// Pure and deterministic. A `stale` window equal to `fresh` yields a
/// single-tier policy with no stale band.
pub fn classify(now: Instant, fetched_at: Instant, fresh: Duration, stale: Duration) -> Freshness {
    classify_age(now.saturating_duration_since(fetched_at), fresh, stale)
}

/// Same as [`classify`] for an already computed age
pub fn classify_age(age: Duration, fresh: Duration, stale: Duration) -> Freshness {
    if age < fresh {
        Freshness::Fresh
    } else if age < stale {
        Freshness::Stale
    } else {
        Freshness::Expired
    }
}
