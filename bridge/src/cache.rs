//! TTL cache for normalized bridge responses.
//!
//! Entries expire lazily: an expired entry is removed the next time its key
//! is read. An expired entry that is never read again stays in storage until
//! `flush`, so `len` reports physically present entries, not live ones.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// How long a cached record stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(120);

/// Cache key namespace, one per gateway entry point. A hit under one
/// namespace is independent of the same alias under another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Pull,
    Alias,
    Id,
    Bundle,
}

impl Namespace {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Namespace::Pull => "pull",
            Namespace::Alias => "alias",
            Namespace::Id => "id",
            Namespace::Bundle => "bundle",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the namespaced cache key for an alias or id.
pub fn cache_key(namespace: Namespace, key: &str) -> String {
    format!("{namespace}:{key}")
}

struct Entry<V> {
    stored_at: Instant,
    value: V,
}

pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a copy of the value for `key` if it is present and fresh.
    /// An expired entry is removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired. Re-check under the write lock in case a concurrent insert
        // refreshed the entry between the two locks.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key)
            && entry.stored_at.elapsed() > self.ttl
        {
            entries.remove(key);
        }
        None
    }

    /// Stores `value` under `key`, refreshing the timestamp. Last write wins
    /// on races to the same key.
    pub fn insert(&self, key: &str, value: V) {
        self.entries.write().insert(
            key.to_string(),
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    /// Removes every entry and returns how many were physically present,
    /// including expired entries that were never read again.
    pub fn flush(&self) -> usize {
        let mut entries = self.entries.write();
        let flushed = entries.len();
        entries.clear();
        flushed
    }

    /// Number of physically present entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
