// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded expiring key-value store.
//!
//! The engine's shared cache: pending approvals (and any other short-lived
//! records) live here with a per-key TTL. The store is the arbiter for
//! concurrent approval resolution — all mutation goes through [`TtlCache::update`],
//! which runs the closure under the store lock so updates are atomic per key.

use crate::clock::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Entry<V> {
    value: V,
    expires_at_ms: u64,
}

struct CacheState<V> {
    entries: HashMap<String, Entry<V>>,
}

/// Bounded map with per-key expiry and prefix scan.
///
/// Expired entries are dropped lazily on access and by [`TtlCache::purge_expired`].
/// When an insert would exceed capacity, the entry closest to expiry is
/// evicted first.
pub struct TtlCache<V, C: Clock> {
    state: Arc<Mutex<CacheState<V>>>,
    capacity: usize,
    clock: C,
}

impl<V, C: Clock> Clone for TtlCache<V, C> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state), capacity: self.capacity, clock: self.clock.clone() }
    }
}

impl<V: Clone, C: Clock> TtlCache<V, C> {
    pub fn new(capacity: usize, clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState { entries: HashMap::new() })),
            capacity,
            clock,
        }
    }

    /// Insert `value` under `key` with the given TTL, replacing any
    /// existing entry.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let now_ms = self.clock.epoch_ms();
        let mut state = self.state.lock();
        state.entries.retain(|_, e| e.expires_at_ms > now_ms);
        let key = key.into();
        if state.entries.len() >= self.capacity && !state.entries.contains_key(&key) {
            // Evict the entry closest to expiry to stay within bounds
            if let Some(victim) =
                state.entries.iter().min_by_key(|(_, e)| e.expires_at_ms).map(|(k, _)| k.clone())
            {
                state.entries.remove(&victim);
            }
        }
        state
            .entries
            .insert(key, Entry { value, expires_at_ms: now_ms + ttl.as_millis() as u64 });
    }

    /// Fetch a live entry. Expired entries are removed and read as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let now_ms = self.clock.epoch_ms();
        let mut state = self.state.lock();
        match state.entries.get(key) {
            Some(entry) if entry.expires_at_ms > now_ms => Some(entry.value.clone()),
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Whether a live entry exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Atomically update a live entry under the store lock. Returns the
    /// closure's result, or `None` if the key is absent or expired.
    pub fn update<T>(&self, key: &str, f: impl FnOnce(&mut V) -> T) -> Option<T> {
        let now_ms = self.clock.epoch_ms();
        let mut state = self.state.lock();
        match state.entries.get_mut(key) {
            Some(entry) if entry.expires_at_ms > now_ms => Some(f(&mut entry.value)),
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remove and return the entry under `key` (even if expired).
    pub fn remove(&self, key: &str) -> Option<V> {
        self.state.lock().entries.remove(key).map(|e| e.value)
    }

    /// Snapshot all live entries whose key starts with `prefix`.
    pub fn scan_prefix(&self, prefix: &str) -> Vec<(String, V)> {
        let now_ms = self.clock.epoch_ms();
        let state = self.state.lock();
        state
            .entries
            .iter()
            .filter(|(k, e)| e.expires_at_ms > now_ms && k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Drop all expired entries, returning them for post-expiry handling.
    pub fn purge_expired(&self) -> Vec<(String, V)> {
        let now_ms = self.clock.epoch_ms();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at_ms <= now_ms)
            .map(|(k, _)| k.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|k| state.entries.remove(&k).map(|e| (k, e.value)))
            .collect()
    }

    /// Number of entries currently held, counting not-yet-purged expired ones.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
