//! TTL response cache with sticky error entries.
//!
//! Entries expire lazily: an expired payload is dropped by the lookup that
//! finds it. Error entries never expire; they stay until `clear_error` or
//! `clear`. There is no size cap.

use super::clock::Clock;
use super::lock;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    errors: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(Value),
    Error(String),
    Miss,
}

#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

/// Serializes a JSON value with object keys sorted at every depth,
/// whatever order the underlying map keeps.
struct Sorted<'a>(&'a Value);

impl Serialize for Sorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let sorted: BTreeMap<&str, Sorted<'_>> =
                    map.iter().map(|(k, v)| (k.as_str(), Sorted(v))).collect();
                sorted.serialize(serializer)
            }
            Value::Array(items) => serializer.collect_seq(items.iter().map(Sorted)),
            other => other.serialize(serializer),
        }
    }
}

/// Stable key for a query and its variables; variable order does not matter.
pub fn cache_key(query: &str, variables: &Value) -> String {
    let keyed = serde_json::json!({ "q": query, "v": variables });
    serde_json::to_string(&Sorted(&keyed)).unwrap_or_else(|_| keyed.to_string())
}

impl ResponseCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn get(&self, query: &str, variables: &Value) -> CacheLookup {
        let key = cache_key(query, variables);
        let mut state = lock(&self.state);
        if let Some(reason) = state.errors.get(&key) {
            return CacheLookup::Error(reason.clone());
        }
        let now = self.clock.now();
        let fresh = state
            .entries
            .get(&key)
            .map(|e| (now < e.expires_at).then(|| e.value.clone()));
        match fresh {
            Some(Some(value)) => CacheLookup::Hit(value),
            Some(None) => {
                state.entries.remove(&key);
                CacheLookup::Miss
            }
            None => CacheLookup::Miss,
        }
    }

    pub fn set(&self, query: &str, variables: &Value, value: Value, ttl: Option<Duration>) {
        let expires_at = self.clock.now() + ttl.unwrap_or(self.ttl);
        lock(&self.state)
            .entries
            .insert(cache_key(query, variables), CacheEntry { value, expires_at });
    }

    pub fn set_error(&self, query: &str, variables: &Value, reason: impl Into<String>) {
        lock(&self.state)
            .errors
            .insert(cache_key(query, variables), reason.into());
    }

    /// Returns true if an error entry was removed.
    pub fn clear_error(&self, query: &str, variables: &Value) -> bool {
        lock(&self.state)
            .errors
            .remove(&cache_key(query, variables))
            .is_some()
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.errors.clear();
    }

    /// Number of stored payloads, expired ones included until next lookup.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
