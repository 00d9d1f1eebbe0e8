//! Response caching with expiry and stale-while-revalidate.
//!
//! # Responsibilities
//! - Keyed store of previously fetched responses
//! - Freshness checks against a caller-supplied max age
//! - Serve an expired value at most once while a refresh runs
//! - Wildcard invalidation (single `*`, prefix/suffix match)

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

use crate::observability::metrics;

/// Result of a policy-aware cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Fresh(Value),
    /// Expired value served under stale-while-revalidate; the caller
    /// is expected to refresh in the background.
    Stale(Value),
    Miss,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Value,
    inserted_at: Instant,
    stale: bool,
    /// Set once a stale value has been handed out; blocks a second serve.
    stale_served: bool,
}

impl CacheEntry {
    fn new(data: Value, stale: bool) -> Self {
        Self {
            data,
            inserted_at: Instant::now(),
            stale,
            stale_served: false,
        }
    }

    fn is_fresh(&self, max_age: Duration) -> bool {
        !self.stale && self.inserted_at.elapsed() < max_age
    }
}

/// Process-wide response cache shared by all executor instances.
#[derive(Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Fresh data only; expired or explicitly stale entries miss.
    pub fn get(&self, key: &str, max_age: Duration) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if entry.is_fresh(max_age) {
            metrics::record_cache_event("hit");
            Some(entry.data.clone())
        } else {
            metrics::record_cache_event("miss");
            None
        }
    }

    /// Policy-aware read. A stale entry is served at most once when the
    /// caller opts into stale-while-revalidate.
    pub fn lookup(&self, key: &str, max_age: Duration, stale_while_revalidate: bool) -> CacheLookup {
        let Some(mut entry) = self.entries.get_mut(key) else {
            metrics::record_cache_event("miss");
            return CacheLookup::Miss;
        };
        if entry.is_fresh(max_age) {
            metrics::record_cache_event("hit");
            return CacheLookup::Fresh(entry.data.clone());
        }
        if stale_while_revalidate && !entry.stale_served {
            entry.stale_served = true;
            metrics::record_cache_event("stale_hit");
            return CacheLookup::Stale(entry.data.clone());
        }
        metrics::record_cache_event("miss");
        CacheLookup::Miss
    }

    /// Latest data regardless of age, for last-resort fallbacks.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.data.clone())
    }

    /// Store a response, resetting freshness and the stale-served mark.
    pub fn set(&self, key: &str, data: Value, stale: bool) {
        self.entries.insert(key.to_string(), CacheEntry::new(data, stale));
    }

    /// Flag an entry so the next policy-aware read treats it as expired.
    pub fn mark_stale(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.stale = true;
        }
    }

    /// Drop one key. Returns true if an entry existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every key matching a pattern with at most one `*` wildcard,
    /// compared by prefix and suffix. Returns the number removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let before = self.entries.len();
        match pattern.split_once('*') {
            Some((prefix, suffix)) => {
                self.entries.retain(|key, _| {
                    !(key.len() >= prefix.len() + suffix.len()
                        && key.starts_with(prefix)
                        && key.ends_with(suffix))
                });
            }
            None => {
                self.entries.remove(pattern);
            }
        }
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
