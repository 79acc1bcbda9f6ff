//! Cache store contract and the in-process implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::keys::glob_match;
use crate::error::CacheError;

/// String-keyed store with TTL. All mutations are idempotent.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` for a missing or expired key.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Overwrite `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Live keys matching a `*` glob, sorted. Admin tooling only.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// DashMap-backed store. Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, StoredValue>,
}

impl InMemoryCacheStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().is_live(now)).count()
    }

    /// Whether no live entry remains.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.is_live(now));
        before - self.entries.len()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        if let Some(stored) = self.entries.get(key) {
            if stored.is_live(now) {
                return Ok(Some(stored.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, stored| !stored.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_live(now) && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, stored)| stored.is_live(now)))
    }
}
