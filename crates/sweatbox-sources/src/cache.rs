//! Process-wide TTL caches for remote lookups.
//!
//! Entries past the TTL but within twice the TTL are kept as stale
//! fallbacks for when the remote side fails.

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    fetched_at: Instant,
    value: V,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Fresh(V),
    Stale(V),
    Miss,
}

#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self { entries: DashMap::new() }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn get(&self, key: &str, ttl: Duration) -> Lookup<V> {
        let Some(entry) = self.entries.get(key) else {
            return Lookup::Miss;
        };
        let age = entry.fetched_at.elapsed();
        if age <= ttl {
            Lookup::Fresh(entry.value.clone())
        } else if age <= ttl.saturating_mul(2) {
            Lookup::Stale(entry.value.clone())
        } else {
            drop(entry);
            self.entries.remove(key);
            Lookup::Miss
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                fetched_at: Instant::now(),
                value,
            },
        );
    }
}
