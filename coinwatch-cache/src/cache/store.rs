//! In-memory entry store
//!
//! A map from [`CacheKey`] to the last successful fetch for that key. Entries
//! are shared as `Arc<CacheEntry<T>>` and replaced wholesale, so a reader
//! always sees either the old or the new entry. The lock is never held across
//! an await point.

use crate::cache::entry::CacheEntry;
use crate::cache::types::{CacheKey, EntryAge};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct EntryStore<T> {
    entries: RwLock<HashMap<CacheKey, Arc<CacheEntry<T>>>>,
}

impl<T> Default for EntryStore<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> EntryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<Arc<CacheEntry<T>>> {
        self.entries.read().get(key).cloned()
    }

    /// Replace any prior entry unconditionally
    pub fn store(&self, key: CacheKey, entry: Arc<CacheEntry<T>>) {
        debug!("Storing cache entry: {} (source: {})", key, entry.source);
        self.entries.write().insert(key, entry);
    }

    pub fn remove(&self, key: &CacheKey) -> Option<Arc<CacheEntry<T>>> {
        self.entries.write().remove(key)
    }

    /// Remove every entry whose key satisfies `predicate`, returning the removed keys
    pub fn remove_matching<P>(&self, predicate: P) -> Vec<CacheKey>
    where
        P: Fn(&CacheKey) -> bool,
    {
        let mut entries = self.entries.write();
        let keys: Vec<CacheKey> = entries.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &keys {
            entries.remove(key);
        }
        keys
    }

    /// Remove every entry with `age >= max_age`
    pub fn sweep(&self, now: Instant, max_age: Duration) -> Vec<CacheKey> {
        let mut entries = self.entries.write();
        let keys: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.age(now) >= max_age)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            entries.remove(key);
        }
        keys
    }

    /// Remove everything, returning the removed keys
    pub fn clear(&self) -> Vec<CacheKey> {
        let mut entries = self.entries.write();
        entries.drain().map(|(key, _)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Age of every entry, oldest first
    pub fn ages(&self, now: Instant) -> Vec<EntryAge> {
        let mut ages: Vec<EntryAge> = self
            .entries
            .read()
            .iter()
            .map(|(key, entry)| EntryAge {
                key: key.clone(),
                age: entry.age(now),
                source: entry.source.to_string(),
                fetched_at: entry.fetched_at_utc,
            })
            .collect();
        ages.sort_by(|a, b| b.age.cmp(&a.age).then_with(|| a.key.cmp(&b.key)));
        ages
    }
}
