//! Single-flight tracking of outstanding fetches
//!
//! At most one fetch per key is outstanding. Every caller asking for a key
//! that is already being fetched receives a clone of the same shared future
//! and therefore the same outcome, success or failure. A fetch removes its
//! own entry when it settles, so the next caller starts a new one.

use crate::cache::types::CacheKey;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Handle to an outstanding fetch; every clone resolves to the same output
pub type SharedFetch<O> = Shared<BoxFuture<'static, O>>;

/// Key -> outstanding fetch
pub struct InFlightTracker<O>
where
    O: Clone,
{
    pending: Arc<Mutex<HashMap<CacheKey, SharedFetch<O>>>>,
}

impl<O> Default for InFlightTracker<O>
where
    O: Clone,
{
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<O> InFlightTracker<O>
where
    O: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the outstanding fetch for `key`, or start one with `factory`.
    ///
    /// Returns the shared handle and whether this call created it. A newly
    /// created fetch is driven by its own task so that it settles even if
    /// every caller stops waiting. Must be called from within a Tokio runtime.
    pub fn get_or_create<F, Fut>(&self, key: &CacheKey, factory: F) -> (SharedFetch<O>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = O> + Send + 'static,
    {
        if let Some(existing) = self.pending.lock().get(key) {
            debug!("Joining in-flight fetch: {}", key);
            return (existing.clone(), false);
        }

        // Built outside the lock; an unpolled operation is simply dropped
        // if another caller registers first.
        let operation = factory();

        let mut pending = self.pending.lock();
        if let Some(existing) = pending.get(key) {
            debug!("Joining in-flight fetch: {}", key);
            return (existing.clone(), false);
        }

        let registry = Arc::clone(&self.pending);
        let settled_key = key.clone();
        let shared = async move {
            let output = operation.await;
            registry.lock().remove(&settled_key);
            output
        }
        .boxed()
        .shared();

        pending.insert(key.clone(), shared.clone());
        drop(pending);

        debug!("Started fetch: {}", key);
        tokio::spawn(shared.clone().map(|_| ()));

        (shared, true)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.pending.lock().contains_key(key)
    }

    /// Number of outstanding fetches
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
